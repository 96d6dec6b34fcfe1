use std::{borrow::Cow, path::Path};

use vello_cpu::{
    kurbo::{Affine, Rect},
    peniko::{Blob, Color, FontData},
    RenderContext,
};

use crate::{analysis::Rgb, NowPlayingError, Result};

/// Shadow passes drawn before every foreground pass: x offset, y offset, alpha.
pub const SHADOW_PASSES: [(f64, f64, u8); 3] =
    [(4.0, 4.0, 40), (3.0, 3.0, 60), (2.0, 2.0, 80)];

/// RGBA8 brush carried through Parley layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl From<Rgb> for TextBrush {
    fn from(c: Rgb) -> Self {
        Self {
            r: c.r,
            g: c.g,
            b: c.b,
            a: 255,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Regular,
    Bold,
}

/// Font, size and foreground colour for one line of card text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub weight: FontWeight,
    pub size_px: f32,
    pub color: Rgb,
}

struct LoadedFont {
    family: String,
    data: FontData,
}

/// Font collection plus Parley contexts used to shape card text.
pub struct TextEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
    regular: LoadedFont,
    bold: LoadedFont,
}

impl TextEngine {
    /// Reads both font files and registers them. A missing or unparsable
    /// font is a render error.
    pub fn load(regular: impl AsRef<Path>, bold: impl AsRef<Path>) -> Result<Self> {
        let regular = read_font(regular.as_ref())?;
        let bold = read_font(bold.as_ref())?;
        Self::from_bytes(regular, bold)
    }

    pub fn from_bytes(regular: Vec<u8>, bold: Vec<u8>) -> Result<Self> {
        let mut font_ctx = parley::FontContext::default();
        let regular = register(&mut font_ctx, regular)?;
        let bold = register(&mut font_ctx, bold)?;
        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            regular,
            bold,
        })
    }

    /// Shapes a single unwrapped line of text.
    pub fn layout_line(
        &mut self,
        text: &str,
        weight: FontWeight,
        size_px: f32,
        brush: TextBrush,
    ) -> Result<parley::Layout<TextBrush>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(NowPlayingError::render("text size must be finite and > 0"));
        }
        let family = self.font(weight).family.clone();

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(Cow::Owned(family)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }

    /// Draws `text` at `(x, y)` with the layered drop shadow, then the
    /// foreground pass.
    pub fn draw_shadowed(
        &mut self,
        ctx: &mut RenderContext,
        text: &str,
        style: TextStyle,
        x: f64,
        y: f64,
    ) -> Result<()> {
        let layout = self.layout_line(text, style.weight, style.size_px, style.color.into())?;
        let font = self.font(style.weight).data.clone();

        for (dx, dy, alpha) in SHADOW_PASSES {
            let shadow = Color::from_rgba8(0, 0, 0, alpha);
            fill_layout(ctx, &layout, &font, x + dx, y + dy, Some(shadow));
        }
        fill_layout(ctx, &layout, &font, x, y, None);
        Ok(())
    }

    fn font(&self, weight: FontWeight) -> &LoadedFont {
        match weight {
            FontWeight::Regular => &self.regular,
            FontWeight::Bold => &self.bold,
        }
    }
}

/// Paints every glyph run of `layout` translated to `(x, y)`. `paint`
/// overrides the per-run brush when set.
fn fill_layout(
    ctx: &mut RenderContext,
    layout: &parley::Layout<TextBrush>,
    font: &FontData,
    x: f64,
    y: f64,
    paint: Option<Color>,
) {
    ctx.set_transform(Affine::translate((x, y)));
    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };

            let color = paint.unwrap_or_else(|| {
                let brush = run.style().brush;
                Color::from_rgba8(brush.r, brush.g, brush.b, brush.a)
            });
            ctx.set_paint(color);

            let glyphs = run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            ctx.glyph_run(font)
                .font_size(run.run().font_size())
                .fill_glyphs(glyphs);
        }
    }
    ctx.set_transform(Affine::IDENTITY);
}

/// Separator under the artist line: one-pixel rows of `color`, each 40 alpha
/// steps fainter than the one above.
pub fn draw_separator(
    ctx: &mut RenderContext,
    color: Rgb,
    x: f64,
    y: f64,
    length: f64,
    rows: u8,
) {
    ctx.set_transform(Affine::IDENTITY);
    for i in 0..rows {
        let alpha = 255u8.saturating_sub(i.saturating_mul(40));
        let top = y + f64::from(i);
        ctx.set_paint(Color::from_rgba8(color.r, color.g, color.b, alpha));
        ctx.fill_rect(&Rect::new(x, top, x + length, top + 1.0));
    }
}

/// Greedy word wrap on character count. Words longer than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > width {
            if current_len > 0 {
                // Fill the remainder of the current line with the word's head.
                let room = width.saturating_sub(current_len + 1);
                if room == 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                    continue;
                }
                current.push(' ');
                current.extend(chars.drain(..room));
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            } else {
                lines.push(chars.drain(..width).collect());
            }
        }

        let word_len = chars.len();
        if word_len == 0 {
            continue;
        }
        if current_len == 0 {
            current.extend(chars);
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current.push(' ');
            current.extend(chars);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::replace(&mut current, chars.into_iter().collect()));
            current_len = word_len;
        }
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

fn read_font(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|err| {
        NowPlayingError::render(format!("cannot load font `{}`: {err}", path.display()))
    })
}

fn register(font_ctx: &mut parley::FontContext, bytes: Vec<u8>) -> Result<LoadedFont> {
    let families = font_ctx
        .collection
        .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
    let family_id = families
        .first()
        .map(|(id, _)| *id)
        .ok_or_else(|| NowPlayingError::render("no font families registered from font bytes"))?;
    let family = font_ctx
        .collection
        .family_name(family_id)
        .ok_or_else(|| NowPlayingError::render("registered font family has no name"))?
        .to_string();

    Ok(LoadedFont {
        family,
        data: FontData::new(Blob::from(bytes), 0),
    })
}
