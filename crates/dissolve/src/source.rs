use std::path::Path;

use anyhow::{Context, Result};
use effectconfig::Color;
use image::{Rgba, RgbaImage};

/// Captured content handed to the renderer: straight-alpha RGBA8, row-major,
/// top row first.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pixels: RgbaImage,
}

impl SourceImage {
    /// Wraps a raw RGBA8 buffer; fails when `data` does not hold `width * height` pixels.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        let pixels = RgbaImage::from_raw(width, height, data).with_context(|| {
            format!("RGBA buffer for {width}x{height} image must be {expected} bytes, got {actual}")
        })?;
        Ok(Self { pixels })
    }

    /// A `width` x `height` image filled with a single colour.
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, Rgba(color.to_array())),
        }
    }

    /// Decodes an image file (PNG, JPEG, BMP or GIF) into RGBA8.
    pub fn open(path: &Path) -> Result<Self> {
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode image at {}", path.display()))?;
        Ok(Self {
            pixels: decoded.to_rgba8(),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        Some(self.pixels.get_pixel(x, y).0)
    }

    pub fn has_transparency(&self) -> bool {
        self.pixels.pixels().any(|pixel| pixel.0[3] < u8::MAX)
    }

    /// Composites the image over a solid `background`, the way captured
    /// content without a backing fill is flattened before upload.
    pub fn composite_over(&self, background: Color) -> Self {
        let fill = Rgba(background.to_array());
        let mut pixels = RgbaImage::from_pixel(self.width(), self.height(), fill);
        for (dst, src) in pixels.pixels_mut().zip(self.pixels.pixels()) {
            *dst = Rgba(blend_over(src.0, dst.0));
        }
        Self { pixels }
    }
}

impl From<RgbaImage> for SourceImage {
    fn from(pixels: RgbaImage) -> Self {
        Self { pixels }
    }
}

/// Porter-Duff source-over for straight-alpha pixels.
fn blend_over(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let src_a = f32::from(src[3]) / 255.0;
    let dst_a = f32::from(dst[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= f32::EPSILON {
        return [0, 0, 0, 0];
    }
    let channel = |index: usize| {
        let s = f32::from(src[index]) / 255.0;
        let d = f32::from(dst[index]) / 255.0;
        let value = (s * src_a + d * dst_a * (1.0 - src_a)) / out_a;
        (value * 255.0).round().clamp(0.0, 255.0) as u8
    };
    [
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}
