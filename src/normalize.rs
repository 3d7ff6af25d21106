//! Grayscale normalization module
//!
//! Converts the oriented image to single-channel 8-bit grayscale for OCR.
//!
//! # Features
//!
//! - No-op for input that is already 8-bit grayscale
//! - Transparent regions composited over white before conversion
//! - Optional intensity inversion for light-on-dark documents
//!
//! # Example
//!
//! ```rust
//! use ocr_orient::buffer::{ColorMode, ImageBuffer};
//! use ocr_orient::normalize::{NormalizeOptions, Normalizer};
//! use image::{DynamicImage, RgbImage};
//!
//! let color = ImageBuffer::new(DynamicImage::ImageRgb8(RgbImage::new(4, 4)));
//! let result = Normalizer::normalize(color, &NormalizeOptions::default());
//! assert_eq!(result.buffer.color_mode(), ColorMode::Gray);
//! ```

use crate::buffer::{ColorMode, ImageBuffer};
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================
// Options
// ============================================================

/// Normalization options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Invert intensities after conversion
    pub invert: bool,
}

impl NormalizeOptions {
    pub fn builder() -> NormalizeOptionsBuilder {
        NormalizeOptionsBuilder::default()
    }

    /// Preset for white-on-dark documents
    pub fn inverted() -> Self {
        Self { invert: true }
    }
}

/// Builder for NormalizeOptions
#[derive(Debug, Default)]
pub struct NormalizeOptionsBuilder {
    options: NormalizeOptions,
}

impl NormalizeOptionsBuilder {
    #[must_use]
    pub fn invert(mut self, invert: bool) -> Self {
        self.options.invert = invert;
        self
    }

    #[must_use]
    pub fn build(self) -> NormalizeOptions {
        self.options
    }
}

// ============================================================
// Result
// ============================================================

/// What the conversion step did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizeOutcome {
    /// Input was already 8-bit grayscale
    AlreadyGrayscale,
    /// Converted from another color mode
    Converted { from: ColorMode },
}

impl NormalizeOutcome {
    pub fn describe(&self) -> String {
        match self {
            Self::AlreadyGrayscale => "already grayscale (no-op)".to_string(),
            Self::Converted { from } => format!("converted {} -> L", from),
        }
    }
}

/// Normalized buffer and what was done to it
#[derive(Debug, Clone)]
pub struct Normalized {
    pub buffer: ImageBuffer,
    pub outcome: NormalizeOutcome,
    pub inverted: bool,
}

// ============================================================
// Normalizer
// ============================================================

/// Grayscale normalizer
pub struct Normalizer;

impl Normalizer {
    /// Convert to single-channel 8-bit grayscale
    pub fn normalize(buffer: ImageBuffer, options: &NormalizeOptions) -> Normalized {
        let from = buffer.color_mode();
        let (gray, outcome) = match buffer.into_dynamic() {
            DynamicImage::ImageLuma8(gray) => (gray, NormalizeOutcome::AlreadyGrayscale),
            other if other.color().has_alpha() => (
                Self::flatten_alpha(&other),
                NormalizeOutcome::Converted { from },
            ),
            other => (other.to_luma8(), NormalizeOutcome::Converted { from }),
        };

        let gray = if options.invert {
            Self::invert(gray)
        } else {
            gray
        };

        debug!(outcome = %outcome.describe(), inverted = options.invert, "normalized");

        Normalized {
            buffer: ImageBuffer::new(DynamicImage::ImageLuma8(gray)),
            outcome,
            inverted: options.invert,
        }
    }

    /// Grayscale with transparent pixels composited over white
    fn flatten_alpha(image: &DynamicImage) -> GrayImage {
        let la = image.to_luma_alpha8();
        let (w, h) = la.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            let [l, a] = la.get_pixel(x, y).0;
            let alpha = a as f64 / 255.0;
            let v = l as f64 * alpha + 255.0 * (1.0 - alpha);
            Luma([v.round() as u8])
        })
    }

    fn invert(mut gray: GrayImage) -> GrayImage {
        image::imageops::invert(&mut gray);
        gray
    }
}
