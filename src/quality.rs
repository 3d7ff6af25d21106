//! Image quality analysis module
//!
//! Computes brightness statistics from an 8-bit grayscale projection and
//! classifies exposure. The metrics are advisory: they end up in the report
//! and never influence the rotation decision.
//!
//! # Example
//!
//! ```rust
//! use ocr_orient::buffer::ImageBuffer;
//! use ocr_orient::quality::{Exposure, QualityAnalyzer, QualityOptions};
//! use image::{DynamicImage, GrayImage, Luma};
//!
//! let buffer = ImageBuffer::new(DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([128]))));
//! let metrics = QualityAnalyzer::analyze(&buffer, &QualityOptions::default());
//! assert_eq!(metrics.exposure, Exposure::Normal);
//! ```

use crate::buffer::ImageBuffer;
use image::GrayImage;
use serde::{Deserialize, Serialize};

// ============================================================
// Constants
// ============================================================

/// Pixels at or above this level count as bright
const DEFAULT_BRIGHT_THRESHOLD: u8 = 240;

/// Pixels at or below this level count as dark
const DEFAULT_DARK_THRESHOLD: u8 = 15;

/// Bright fraction above which the image is overexposed
const DEFAULT_OVEREXPOSED_RATIO: f64 = 0.5;

/// Dark fraction above which the image is underexposed
const DEFAULT_UNDEREXPOSED_RATIO: f64 = 0.5;

// ============================================================
// Options
// ============================================================

/// Thresholds used for exposure classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityOptions {
    pub bright_threshold: u8,
    pub dark_threshold: u8,
    pub overexposed_ratio: f64,
    pub underexposed_ratio: f64,
}

impl Default for QualityOptions {
    fn default() -> Self {
        Self {
            bright_threshold: DEFAULT_BRIGHT_THRESHOLD,
            dark_threshold: DEFAULT_DARK_THRESHOLD,
            overexposed_ratio: DEFAULT_OVEREXPOSED_RATIO,
            underexposed_ratio: DEFAULT_UNDEREXPOSED_RATIO,
        }
    }
}

impl QualityOptions {
    pub fn builder() -> QualityOptionsBuilder {
        QualityOptionsBuilder::default()
    }
}

/// Builder for [`QualityOptions`]
#[derive(Debug, Default)]
pub struct QualityOptionsBuilder {
    options: QualityOptions,
}

impl QualityOptionsBuilder {
    #[must_use]
    pub fn bright_threshold(mut self, level: u8) -> Self {
        self.options.bright_threshold = level;
        self
    }

    #[must_use]
    pub fn dark_threshold(mut self, level: u8) -> Self {
        self.options.dark_threshold = level;
        self
    }

    #[must_use]
    pub fn overexposed_ratio(mut self, ratio: f64) -> Self {
        self.options.overexposed_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn underexposed_ratio(mut self, ratio: f64) -> Self {
        self.options.underexposed_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn build(self) -> QualityOptions {
        self.options
    }
}

// ============================================================
// Metrics
// ============================================================

/// Exposure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Exposure {
    Overexposed,
    Underexposed,
    #[default]
    Normal,
}

impl Exposure {
    pub fn label(&self) -> &'static str {
        match self {
            Exposure::Overexposed => "overexposed",
            Exposure::Underexposed => "underexposed",
            Exposure::Normal => "normal",
        }
    }
}

/// Brightness statistics of one image
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Mean intensity (0-255)
    pub mean_brightness: f64,
    /// Population standard deviation of intensity
    pub std_dev: f64,
    pub min: u8,
    pub max: u8,
    /// Fraction of pixels >= bright threshold
    pub bright_fraction: f64,
    /// Fraction of pixels <= dark threshold
    pub dark_fraction: f64,
    pub exposure: Exposure,
}

impl QualityMetrics {
    /// max - min
    pub fn dynamic_range(&self) -> u8 {
        self.max.saturating_sub(self.min)
    }
}

// ============================================================
// Analyzer
// ============================================================

/// Quality analyzer
pub struct QualityAnalyzer;

impl QualityAnalyzer {
    /// Analyze a buffer of any color mode
    pub fn analyze(buffer: &ImageBuffer, options: &QualityOptions) -> QualityMetrics {
        Self::analyze_gray(&buffer.to_luma8(), options)
    }

    /// Analyze an 8-bit grayscale image
    pub fn analyze_gray(gray: &GrayImage, options: &QualityOptions) -> QualityMetrics {
        let mut histogram = [0u64; 256];
        for pixel in gray.pixels() {
            histogram[pixel.0[0] as usize] += 1;
        }

        let total: u64 = histogram.iter().sum();
        if total == 0 {
            return QualityMetrics::default();
        }

        let mut sum = 0f64;
        for (level, &count) in histogram.iter().enumerate() {
            sum += level as f64 * count as f64;
        }
        let mean = sum / total as f64;

        let mut variance = 0f64;
        for (level, &count) in histogram.iter().enumerate() {
            let d = level as f64 - mean;
            variance += d * d * count as f64;
        }
        let std_dev = (variance / total as f64).sqrt();

        let min = histogram.iter().position(|&c| c > 0).unwrap_or(0) as u8;
        let max = histogram.iter().rposition(|&c| c > 0).unwrap_or(0) as u8;

        let bright: u64 = histogram[options.bright_threshold as usize..].iter().sum();
        let dark: u64 = histogram[..=options.dark_threshold as usize].iter().sum();
        let bright_fraction = bright as f64 / total as f64;
        let dark_fraction = dark as f64 / total as f64;

        let exposure = if bright_fraction > options.overexposed_ratio {
            Exposure::Overexposed
        } else if dark_fraction > options.underexposed_ratio {
            Exposure::Underexposed
        } else {
            Exposure::Normal
        };

        QualityMetrics {
            mean_brightness: mean,
            std_dev,
            min,
            max,
            bright_fraction,
            dark_fraction,
            exposure,
        }
    }
}
