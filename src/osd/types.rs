//! Orientation detection core types

use crate::buffer::ImageBuffer;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Clockwise corrections an orientation detector may report
pub const VALID_ROTATIONS: [u32; 4] = [0, 90, 180, 270];

// ============================================================
// Error Types
// ============================================================

/// Orientation detection error types
///
/// Both variants are recoverable: the caller treats them as "rotation angle unknown".
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Orientation unavailable: {0}")]
    Unavailable(String),

    #[error("Orientation detection timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, DetectionError>;

// ============================================================
// Estimate
// ============================================================

/// Detector output for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationEstimate {
    pub page_number: u32,
    /// Detected orientation of the text
    pub orientation_degrees: u32,
    /// Clockwise correction that would make the text upright (0/90/180/270)
    pub rotate_degrees: u32,
    /// Detector confidence; unbounded, `None` when not reported
    pub orientation_confidence: Option<f64>,
    pub script: Option<String>,
    pub script_confidence: Option<f64>,
}

impl OrientationEstimate {
    /// Estimate with only the fields the decision engine reads
    pub fn new(rotate_degrees: u32, orientation_confidence: Option<f64>) -> Self {
        Self {
            page_number: 0,
            orientation_degrees: (360 - rotate_degrees % 360) % 360,
            rotate_degrees,
            orientation_confidence,
            script: None,
            script_confidence: None,
        }
    }

    /// Whether `rotate_degrees` is one of the four quarter turns
    pub fn has_valid_rotation(&self) -> bool {
        VALID_ROTATIONS.contains(&self.rotate_degrees)
    }
}

// ============================================================
// Detector Trait
// ============================================================

/// Script/orientation detector
///
/// Receives the metadata-corrected color image, never the grayscale one.
pub trait OrientationDetector: Send + Sync {
    /// Short name for logs and reports
    fn name(&self) -> &str;

    fn detect(&self, buffer: &ImageBuffer) -> Result<OrientationEstimate>;
}
