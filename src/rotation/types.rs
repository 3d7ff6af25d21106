//! Rotation module core types
//!
//! Contains options, the decision record and the verification warning.

use crate::buffer::ImageBuffer;
use serde::{Deserialize, Serialize};

// ============================================================
// Constants
// ============================================================

/// Default minimum detector confidence required to rotate
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.3;

/// Default background color (white) for canvas areas exposed by rotation
pub const DEFAULT_BACKGROUND_COLOR: [u8; 3] = [255, 255, 255];

/// Fully opaque alpha value
pub const ALPHA_OPAQUE: u8 = 255;

// ============================================================
// Options and Enums
// ============================================================

/// Resampling used for angles that are not quarter turns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    /// Nearest neighbor
    Nearest,
    /// Bilinear
    #[default]
    Bilinear,
}

/// Rotation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationOptions {
    /// Fill color for exposed canvas
    pub background_color: [u8; 3],
    /// Resampling for non-quarter-turn angles
    pub interpolation: Interpolation,
}

impl Default for RotationOptions {
    fn default() -> Self {
        Self {
            background_color: DEFAULT_BACKGROUND_COLOR,
            interpolation: Interpolation::Bilinear,
        }
    }
}

impl RotationOptions {
    /// Create a new options builder
    pub fn builder() -> RotationOptionsBuilder {
        RotationOptionsBuilder::default()
    }
}

/// Builder for RotationOptions
#[derive(Debug, Default)]
pub struct RotationOptionsBuilder {
    options: RotationOptions,
}

impl RotationOptionsBuilder {
    /// Set background color
    #[must_use]
    pub fn background_color(mut self, color: [u8; 3]) -> Self {
        self.options.background_color = color;
        self
    }

    /// Set interpolation
    #[must_use]
    pub fn interpolation(mut self, interpolation: Interpolation) -> Self {
        self.options.interpolation = interpolation;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> RotationOptions {
        self.options
    }
}

// ============================================================
// Decision
// ============================================================

/// Why the engine decided the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionReason {
    /// Detector produced nothing (failure or timeout)
    NoEstimate,
    /// Detector reported a zero correction
    AlreadyUpright,
    /// Nonzero correction with confidence strictly above threshold
    ConfidenceAboveThreshold,
    /// Nonzero correction with no confidence reported
    ConfidenceUnknown,
    /// Nonzero correction with confidence at or below threshold
    ConfidenceAtOrBelowThreshold,
}

impl DecisionReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::NoEstimate => "no orientation estimate; rotation angle unknown",
            Self::AlreadyUpright => "detector reports the document is upright",
            Self::ConfidenceAboveThreshold => "confidence above threshold",
            Self::ConfidenceUnknown => "nonzero rotation reported without confidence",
            Self::ConfidenceAtOrBelowThreshold => "confidence at or below threshold",
        }
    }
}

/// Outcome of the rotation decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationDecision {
    pub should_rotate: bool,
    /// Angle for the counter-clockwise rotation primitive (degrees)
    pub applied_angle: i32,
    /// Clockwise correction reported by the detector
    pub rotate_degrees: Option<u32>,
    pub confidence: Option<f64>,
    pub threshold: f64,
    pub reason: DecisionReason,
}

impl RotationDecision {
    /// Decision that leaves the image alone
    pub fn no_rotation(reason: DecisionReason, threshold: f64) -> Self {
        Self {
            should_rotate: false,
            applied_angle: 0,
            rotate_degrees: None,
            confidence: None,
            threshold,
            reason,
        }
    }
}

// ============================================================
// Application
// ============================================================

/// Dimensions after rotation did not match expectations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationVerificationWarning {
    pub applied_angle: i32,
    pub before: (u32, u32),
    pub after: (u32, u32),
    pub expected: (u32, u32),
}

impl std::fmt::Display for RotationVerificationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rotation by {} degrees produced {}x{} from {}x{}, expected {}x{}",
            self.applied_angle,
            self.after.0,
            self.after.1,
            self.before.0,
            self.before.1,
            self.expected.0,
            self.expected.1
        )
    }
}

/// Result of applying a decision
#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub buffer: ImageBuffer,
    pub rotated: bool,
    pub verification: Option<RotationVerificationWarning>,
}
