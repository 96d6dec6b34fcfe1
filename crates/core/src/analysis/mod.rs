use std::{cmp::Ordering, collections::HashMap};

use image::DynamicImage;
use palette::{FromColor, Hsv, Srgb};
use serde::{Deserialize, Serialize};

use crate::{NowPlayingError, Result};

/// Largest edge of the thumbnail used for colour tallies.
pub const THUMBNAIL_EDGE: u32 = 150;
/// Number of most frequent colours considered before ranking by saturation.
pub const CANDIDATE_COLORS: usize = 10;
/// Palette length requested by the card renderer.
pub const DEFAULT_PALETTE_SIZE: usize = 4;

/// 8-bit sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Multiplies every channel by `factor`, truncating towards zero.
    pub fn scaled(self, factor: f32) -> Self {
        let scale = |c: u8| (f32::from(c) * factor).clamp(0.0, 255.0) as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }

    /// HSV saturation in `[0, 1]`.
    pub fn saturation(self) -> f32 {
        self.to_hsv().1
    }

    /// Converts to hue/saturation/value, each in `[0, 1]`.
    pub fn to_hsv(self) -> (f32, f32, f32) {
        let rgb: Srgb<f32> = Srgb::new(self.r, self.g, self.b).into_format();
        let hsv: Hsv = Hsv::from_color(rgb);
        let hue = hsv.hue.into_positive_degrees() / 360.0;
        (hue, hsv.saturation, hsv.value)
    }
}

/// Ordered colours extracted from album art, most saturated first.
///
/// A palette is never empty. Indexing past the end repeats the last colour so
/// callers can ask for an accent even when the art only has one colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPalette")]
pub struct Palette {
    colors: Vec<Rgb>,
}

#[derive(Deserialize)]
struct RawPalette {
    colors: Vec<Rgb>,
}

impl TryFrom<RawPalette> for Palette {
    type Error = NowPlayingError;

    fn try_from(raw: RawPalette) -> Result<Self> {
        Palette::new(raw.colors)
    }
}

impl Palette {
    pub fn new(colors: Vec<Rgb>) -> Result<Self> {
        if colors.is_empty() {
            return Err(NowPlayingError::render("palette requires at least one colour"));
        }
        Ok(Self { colors })
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn color(&self, index: usize) -> Rgb {
        let last = self.colors.len() - 1;
        self.colors[index.min(last)]
    }

    pub fn primary(&self) -> Rgb {
        self.color(0)
    }

    pub fn accent(&self) -> Rgb {
        self.color(1)
    }

    /// Gradient stops: primary, accent, then the primary darkened to 60%.
    pub fn gradient_stops(&self) -> [Rgb; 3] {
        [self.primary(), self.accent(), self.primary().scaled(0.6)]
    }
}

/// Extracts up to `count` representative colours from `image`.
///
/// The ten most frequent colours of a bounded thumbnail are ranked by
/// saturation rather than frequency, so a vivid accent beats a dull but
/// common background.
pub fn extract_palette(image: &DynamicImage, count: usize) -> Result<Palette> {
    if image.width() == 0 || image.height() == 0 {
        return Err(NowPlayingError::render("album art has no pixels"));
    }
    if count == 0 {
        return Err(NowPlayingError::render("palette size must be at least 1"));
    }

    let thumbnail = if image.width() > THUMBNAIL_EDGE || image.height() > THUMBNAIL_EDGE {
        image.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE)
    } else {
        image.clone()
    };
    let pixels = thumbnail.to_rgb8();

    let mut tally: HashMap<Rgb, u32> = HashMap::new();
    for pixel in pixels.pixels() {
        let [r, g, b] = pixel.0;
        *tally.entry(Rgb::new(r, g, b)).or_insert(0) += 1;
    }

    let mut frequent: Vec<(Rgb, u32)> = tally.into_iter().collect();
    // Ties on count are broken by channel value so the output is deterministic.
    frequent.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| (a.0.r, a.0.g, a.0.b).cmp(&(b.0.r, b.0.g, b.0.b)))
    });
    frequent.truncate(CANDIDATE_COLORS);

    let mut ranked: Vec<Rgb> = frequent.into_iter().map(|(color, _)| color).collect();
    ranked.sort_by(|a, b| {
        b.saturation()
            .partial_cmp(&a.saturation())
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(count);

    tracing::debug!(colors = ranked.len(), "extracted palette");
    Palette::new(ranked)
}
