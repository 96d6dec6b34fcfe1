//! Now-playing card renderer.
//!
//! The pipeline runs in a fixed order: palette extraction, diagonal gradient,
//! decorative overlay, album art with glow and border, shadowed text, depth
//! ramp, PNG encoding. Any failure aborts the whole card; callers receive
//! [`RenderOutcome::RenderFailed`] and never a partial image.

pub mod composite;
pub mod gradient;
pub mod overlay;
pub mod text;

use image::{imageops::FilterType, DynamicImage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{extract_palette, Palette, Rgb},
    config::CardConfig,
    playback::PlaybackSnapshot,
    NowPlayingError, Result,
};

use self::{
    composite::Canvas,
    text::{FontWeight, TextEngine, TextStyle},
};

pub const ART_SIZE: u32 = 400;
pub const ART_X: i32 = 150;
pub const ART_BORDER: f64 = 8.0;
pub const GLOW_SIZE: f64 = 420.0;
pub const TEXT_X: f64 = 650.0;
pub const TITLE_WRAP_CHARS: usize = 20;
pub const SEPARATOR_LENGTH: f64 = 400.0;
pub const SEPARATOR_ROWS: u8 = 4;

const TITLE_TOP: f64 = 100.0;
const TITLE_LINE_STEP: f64 = 90.0;
const ARTIST_GAP: f64 = 20.0;
const SEPARATOR_GAP: f64 = 80.0;
const ALBUM_GAP: f64 = 60.0;
const DURATION_GAP: f64 = 70.0;

const TITLE_STYLE: TextStyle = TextStyle {
    weight: FontWeight::Bold,
    size_px: 80.0,
    color: Rgb::WHITE,
};
const ARTIST_STYLE: TextStyle = TextStyle {
    weight: FontWeight::Regular,
    size_px: 60.0,
    color: Rgb::new(255, 235, 235),
};
const DETAILS_STYLE: TextStyle = TextStyle {
    weight: FontWeight::Regular,
    size_px: 45.0,
    color: Rgb::WHITE,
};

/// Formats milliseconds as `m:ss`, truncating partial seconds.
pub fn format_duration(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Fully resolved card input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSpec {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_display: String,
    pub palette: Palette,
}

impl CardSpec {
    pub fn new(snapshot: &PlaybackSnapshot, palette: Palette) -> Self {
        Self {
            title: snapshot.title.clone(),
            artist: snapshot.artist.clone(),
            album: snapshot.album.clone(),
            duration_display: format_duration(snapshot.duration_ms.unwrap_or(0)),
            palette,
        }
    }
}

/// Encoded PNG card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCard(Vec<u8>);

impl RenderedCard {
    pub fn new(png: Vec<u8>) -> Self {
        Self(png)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Result of one render attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered(RenderedCard),
    RenderFailed(String),
}

impl From<Result<RenderedCard>> for RenderOutcome {
    fn from(result: Result<RenderedCard>) -> Self {
        match result {
            Ok(card) => Self::Rendered(card),
            Err(err) => Self::RenderFailed(err.to_string()),
        }
    }
}

/// Turns a snapshot plus album art into a card. Implementations are
/// CPU-bound and called from a blocking thread.
pub trait RenderCard: Send + Sync {
    fn render_card(&self, snapshot: &PlaybackSnapshot, art: &[u8]) -> RenderOutcome;
}

/// Stateless card renderer configured once at startup.
#[derive(Debug, Clone)]
pub struct CardRenderer {
    config: CardConfig,
}

impl CardRenderer {
    pub fn new(config: CardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    /// Renders a card for `snapshot` from raw album art bytes.
    ///
    /// Overlay placement uses the configured seed when present and OS
    /// entropy otherwise.
    pub fn render(&self, snapshot: &PlaybackSnapshot, art: &[u8]) -> RenderOutcome {
        let outcome: RenderOutcome = match self.config.overlay_seed {
            Some(seed) => self.render_with_rng(snapshot, art, &mut StdRng::seed_from_u64(seed)),
            None => self.render_with_rng(snapshot, art, &mut StdRng::from_os_rng()),
        }
        .into();

        match &outcome {
            RenderOutcome::Rendered(card) => tracing::debug!(
                track = %snapshot.track_id,
                bytes = card.bytes().len(),
                "rendered card"
            ),
            RenderOutcome::RenderFailed(reason) => tracing::warn!(
                track = %snapshot.track_id,
                %reason,
                "card rendering failed"
            ),
        }
        outcome
    }

    pub fn render_with_rng<R: Rng + ?Sized>(
        &self,
        snapshot: &PlaybackSnapshot,
        art: &[u8],
        rng: &mut R,
    ) -> Result<RenderedCard> {
        let art = image::load_from_memory(art)
            .map_err(|err| NowPlayingError::render(format!("cannot decode album art: {err}")))?;
        let palette = extract_palette(&art, self.config.palette_size)?;
        let spec = CardSpec::new(snapshot, palette);
        self.compose(&spec, &art, rng)
    }

    /// Draws `spec` with `art` onto a fresh canvas and encodes it.
    pub fn compose<R: Rng + ?Sized>(
        &self,
        spec: &CardSpec,
        art: &DynamicImage,
        rng: &mut R,
    ) -> Result<RenderedCard> {
        let mut fonts = TextEngine::load(&self.config.regular_font, &self.config.bold_font)?;
        let mut canvas = Canvas::new(self.config.width, self.config.height)?;
        let (width, height) = (canvas.width(), canvas.height());
        let primary = spec.palette.primary();

        gradient::fill_diagonal(&mut canvas, &spec.palette.gradient_stops());

        let art_y = (height as i32 - ART_SIZE as i32) / 2;
        let (art_xf, art_yf) = (f64::from(ART_X), f64::from(art_y));

        let mut layer = canvas.layer();
        let shapes = overlay::plan_overlay(rng, width, height, overlay::OVERLAY_SHAPES);
        overlay::draw_overlay(&mut layer, &shapes);
        overlay::draw_glow(&mut layer, primary, art_xf - 10.0, art_yf - 10.0, GLOW_SIZE);
        draw_border(&mut layer, art_xf, art_yf);
        canvas.composite(layer)?;

        let art = art
            .resize_exact(ART_SIZE, ART_SIZE, FilterType::Lanczos3)
            .to_rgb8();
        canvas.paste(&art, ART_X, art_y);

        let mut layer = canvas.layer();
        draw_text_block(&mut layer, &mut fonts, spec)?;
        overlay::draw_depth_ramp(&mut layer, width, height);
        canvas.composite(layer)?;

        canvas.encode_png().map(RenderedCard)
    }
}

impl RenderCard for CardRenderer {
    fn render_card(&self, snapshot: &PlaybackSnapshot, art: &[u8]) -> RenderOutcome {
        self.render(snapshot, art)
    }
}

fn draw_border(ctx: &mut vello_cpu::RenderContext, art_x: f64, art_y: f64) {
    let size = f64::from(ART_SIZE);
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        art_x - ART_BORDER,
        art_y - ART_BORDER,
        art_x + size + ART_BORDER,
        art_y + size + ART_BORDER,
    ));
}

fn draw_text_block(
    ctx: &mut vello_cpu::RenderContext,
    fonts: &mut TextEngine,
    spec: &CardSpec,
) -> Result<()> {
    let mut y = TITLE_TOP;
    for line in text::wrap_text(&spec.title, TITLE_WRAP_CHARS) {
        fonts.draw_shadowed(ctx, &line, TITLE_STYLE, TEXT_X, y)?;
        y += TITLE_LINE_STEP;
    }

    y += ARTIST_GAP;
    fonts.draw_shadowed(ctx, &format!("by {}", spec.artist), ARTIST_STYLE, TEXT_X, y)?;

    y += SEPARATOR_GAP;
    text::draw_separator(
        ctx,
        spec.palette.accent(),
        TEXT_X,
        y,
        SEPARATOR_LENGTH,
        SEPARATOR_ROWS,
    );

    y += ALBUM_GAP;
    fonts.draw_shadowed(ctx, &spec.album, DETAILS_STYLE, TEXT_X, y)?;
    y += DURATION_GAP;
    fonts.draw_shadowed(ctx, &spec.duration_display, DETAILS_STYLE, TEXT_X, y)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, RgbImage};

    use super::*;

    const SYSTEM_FONT_DIRS: [&str; 2] = [
        "/usr/share/fonts/truetype/dejavu",
        "/usr/share/fonts/dejavu",
    ];

    fn snapshot() -> PlaybackSnapshot {
        PlaybackSnapshot {
            track_id: "track-1".to_string(),
            title: "A Fairly Long Song Title That Wraps".to_string(),
            artist: "Some Artist".to_string(),
            album: "Some Album".to_string(),
            duration_ms: Some(125_000),
            progress_ms: Some(0),
            art_url: None,
        }
    }

    fn art_png() -> Vec<u8> {
        let img = RgbImage::from_fn(64, 64, |x, y| {
            if x < 32 {
                image::Rgb([200, 30, 60])
            } else {
                image::Rgb([(y * 3) as u8, 90, 90])
            }
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn config_with_fonts(regular: String, bold: String) -> CardConfig {
        CardConfig {
            regular_font: regular,
            bold_font: bold,
            overlay_seed: Some(5),
            ..CardConfig::default()
        }
    }

    /// Looks for DejaVu fonts; rendering tests that need glyphs skip without them.
    fn system_fonts() -> Option<(String, String)> {
        SYSTEM_FONT_DIRS.iter().find_map(|dir| {
            let regular = format!("{dir}/DejaVuSans.ttf");
            let bold = format!("{dir}/DejaVuSans-Bold.ttf");
            (std::path::Path::new(&regular).exists() && std::path::Path::new(&bold).exists())
                .then_some((regular, bold))
        })
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(125_000), "2:05");
        assert_eq!(format_duration(59_999), "0:59");
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(3_600_000), "60:00");
    }

    #[test]
    fn card_spec_uses_snapshot_metadata() {
        let palette = Palette::new(vec![Rgb::new(1, 2, 3)]).unwrap();
        let spec = CardSpec::new(&snapshot(), palette);
        assert_eq!(spec.duration_display, "2:05");
        assert_eq!(spec.artist, "Some Artist");
    }

    #[test]
    fn undecodable_art_fails_without_image() {
        let renderer = CardRenderer::new(CardConfig::default());
        let outcome = renderer.render(&snapshot(), b"definitely not an image");
        match outcome {
            RenderOutcome::RenderFailed(reason) => assert!(reason.contains("decode")),
            RenderOutcome::Rendered(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn missing_fonts_fail_the_whole_card() {
        let renderer = CardRenderer::new(config_with_fonts(
            "/missing/regular.ttf".to_string(),
            "/missing/bold.ttf".to_string(),
        ));
        let outcome = renderer.render(&snapshot(), &art_png());
        assert!(matches!(outcome, RenderOutcome::RenderFailed(reason) if reason.contains("font")));
    }

    #[test]
    fn renders_png_card_with_configured_size() {
        let Some((regular, bold)) = system_fonts() else {
            eprintln!("skipping: no DejaVu fonts installed");
            return;
        };
        let renderer = CardRenderer::new(config_with_fonts(regular, bold));
        let RenderOutcome::Rendered(card) = renderer.render(&snapshot(), &art_png()) else {
            panic!("rendering should succeed with system fonts");
        };

        let decoded = image::load_from_memory(card.bytes()).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (1200, 630));
        // Art is pasted at (150, 115); its left half is the red block, slightly
        // darkened by the depth ramp.
        let [r, g, b] = decoded.get_pixel(160, 300).0;
        assert!(r > 170 && g < 50 && b < 80, "unexpected art pixel {r},{g},{b}");
        // White border surrounds the art.
        let [r, g, b] = decoded.get_pixel(146, 300).0;
        assert!(r > 230 && r == g && g == b, "unexpected border pixel {r},{g},{b}");
    }

    #[test]
    fn seeded_renders_are_reproducible() {
        let Some((regular, bold)) = system_fonts() else {
            eprintln!("skipping: no DejaVu fonts installed");
            return;
        };
        let renderer = CardRenderer::new(config_with_fonts(regular, bold));
        let a = renderer.render(&snapshot(), &art_png());
        let b = renderer.render(&snapshot(), &art_png());
        assert!(matches!(a, RenderOutcome::Rendered(_)));
        assert_eq!(a, b);
    }
}
