//! Owned image buffer passed between pipeline stages
//!
//! Every stage consumes an [`ImageBuffer`] by value and hands back a new one,
//! so intermediate states can be snapshotted independently.

use image::{ColorType, DynamicImage, GenericImageView, GrayImage, ImageFormat, ImageResult};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// Color layout of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    /// Single-channel grayscale
    Gray,
    /// Grayscale with alpha
    GrayAlpha,
    /// Three-channel color
    Rgb,
    /// Three-channel color with alpha
    Rgba,
    /// Any layout the decoder produced that has no dedicated variant
    Other,
}

impl ColorMode {
    /// Map a decoder color type to a color mode
    pub fn from_color_type(color_type: ColorType) -> Self {
        match color_type {
            ColorType::L8 | ColorType::L16 => ColorMode::Gray,
            ColorType::La8 | ColorType::La16 => ColorMode::GrayAlpha,
            ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => ColorMode::Rgb,
            ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => ColorMode::Rgba,
            _ => ColorMode::Other,
        }
    }

    /// Whether the buffer carries exactly one channel
    pub fn is_single_channel(self) -> bool {
        matches!(self, ColorMode::Gray)
    }

    /// Short mode label (L, LA, RGB, RGBA)
    pub fn label(self) -> &'static str {
        match self {
            ColorMode::Gray => "L",
            ColorMode::GrayAlpha => "LA",
            ColorMode::Rgb => "RGB",
            ColorMode::Rgba => "RGBA",
            ColorMode::Other => "other",
        }
    }
}

impl std::fmt::Display for ColorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Decoded pixels plus their layout
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    image: DynamicImage,
}

impl ImageBuffer {
    /// Wrap a decoded image
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn color_mode(&self) -> ColorMode {
        ColorMode::from_color_type(self.image.color())
    }

    pub fn is_single_channel(&self) -> bool {
        self.color_mode().is_single_channel()
    }

    /// Borrow the underlying decoded image
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// Give up ownership of the underlying decoded image
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    /// 8-bit grayscale projection (copy)
    pub fn to_luma8(&self) -> GrayImage {
        self.image.to_luma8()
    }

    /// Save to disk; format follows the path extension
    pub fn save(&self, path: &Path) -> ImageResult<()> {
        self.image.save(path)
    }

    /// Encode as PNG in memory (external tools read this from stdin)
    pub fn encode_png(&self) -> ImageResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.image.write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }
}

impl From<DynamicImage> for ImageBuffer {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}
