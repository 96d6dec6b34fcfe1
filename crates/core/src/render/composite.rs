use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbImage};

use crate::{NowPlayingError, Result};

pub type PremulRgba8 = [u8; 4];

/// Premultiplied RGBA8 canvas backed by a `vello_cpu` pixmap.
///
/// Vector work is recorded into a [`vello_cpu::RenderContext`] layer obtained
/// from [`Canvas::layer`] and blended back with [`Canvas::composite`]; raster
/// work (gradient, album art) writes straight into the pixel buffer.
pub struct Canvas {
    width: u16,
    height: u16,
    pixmap: vello_cpu::Pixmap,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let w: u16 = width
            .try_into()
            .map_err(|_| NowPlayingError::render("canvas width exceeds u16"))?;
        let h: u16 = height
            .try_into()
            .map_err(|_| NowPlayingError::render("canvas height exceeds u16"))?;
        if w == 0 || h == 0 {
            return Err(NowPlayingError::render("canvas must not be empty"));
        }
        Ok(Self {
            width: w,
            height: h,
            pixmap: vello_cpu::Pixmap::new(w, h),
        })
    }

    pub fn width(&self) -> u32 {
        u32::from(self.width)
    }

    pub fn height(&self) -> u32 {
        u32::from(self.height)
    }

    pub fn data(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.pixmap.data_as_u8_slice_mut()
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let d = self.data();
        [d[i], d[i + 1], d[i + 2], d[i + 3]]
    }

    /// Returns an empty drawing layer covering the whole canvas.
    pub fn layer(&self) -> vello_cpu::RenderContext {
        vello_cpu::RenderContext::new(self.width, self.height)
    }

    /// Rasterises `layer` and blends it source-over onto the canvas.
    pub fn composite(&mut self, mut layer: vello_cpu::RenderContext) -> Result<()> {
        let mut rendered = vello_cpu::Pixmap::new(self.width, self.height);
        layer.flush();
        layer.render_to_pixmap(&mut rendered);
        over_in_place(self.data_mut(), rendered.data_as_u8_slice())
    }

    /// Copies an opaque image onto the canvas with its top-left corner at `(x, y)`.
    /// Pixels falling outside the canvas are dropped.
    pub fn paste(&mut self, image: &RgbImage, x: i32, y: i32) {
        let (cw, ch) = (i64::from(self.width), i64::from(self.height));
        let stride = self.width as usize;
        let data = self.data_mut();
        for (px, py, pixel) in image.enumerate_pixels() {
            let tx = i64::from(x) + i64::from(px);
            let ty = i64::from(y) + i64::from(py);
            if tx < 0 || ty < 0 || tx >= cw || ty >= ch {
                continue;
            }
            let i = (ty as usize * stride + tx as usize) * 4;
            let [r, g, b] = pixel.0;
            data[i..i + 4].copy_from_slice(&[r, g, b, 255]);
        }
    }

    /// Drops alpha and encodes the canvas as PNG.
    ///
    /// Premultiplied channels are exactly the colour flattened over black, so
    /// no un-premultiply step is needed.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let rgb: Vec<u8> = self
            .data()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        let image = RgbImage::from_raw(self.width(), self.height(), rgb)
            .ok_or_else(|| NowPlayingError::render("canvas buffer size mismatch"))?;

        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|err| NowPlayingError::render(format!("png encoding failed: {err}")))?;
        Ok(out.into_inner())
    }
}

/// Source-over blend of one premultiplied pixel onto another.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    match src[3] {
        0 => dst,
        255 => src,
        alpha => {
            let keep = 255 - u16::from(alpha);
            std::array::from_fn(|i| src[i].saturating_add(scale(dst[i], keep)))
        }
    }
}

/// Blends a whole rendered layer onto `dst`; both buffers are RGBA8.
pub fn over_in_place(dst: &mut [u8], src: &[u8]) -> Result<()> {
    if dst.len() != src.len() || dst.len() % 4 != 0 {
        return Err(NowPlayingError::render("layer size does not match canvas"));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// `channel * factor / 255`, rounded.
fn scale(channel: u8, factor: u16) -> u8 {
    ((u32::from(channel) * u32::from(factor) + 127) / 255) as u8
}
