//! Rotation module
//!
//! Decides whether an orientation estimate is trustworthy enough to act on,
//! then applies the correction and verifies the result.
//!
//! # Features
//!
//! - Strict confidence threshold; unbounded detector confidences compared as-is
//! - Explicit clockwise-to-primitive angle translation
//! - Exact quarter turns, expanded-canvas resampling for anything else
//! - Width/height swap verification
//!
//! # Example
//!
//! ```rust
//! use ocr_orient::buffer::ImageBuffer;
//! use ocr_orient::osd::OrientationEstimate;
//! use ocr_orient::rotation::{RotationApplicator, RotationDecisionEngine, RotationOptions};
//! use image::{DynamicImage, RgbImage};
//!
//! let buffer = ImageBuffer::new(DynamicImage::ImageRgb8(RgbImage::new(1052, 1604)));
//! let estimate = OrientationEstimate::new(270, Some(0.47));
//!
//! let decision = RotationDecisionEngine::decide(Some(&estimate), 0.3);
//! assert_eq!(decision.applied_angle, -270);
//!
//! let outcome = RotationApplicator::apply(buffer, &decision, &RotationOptions::default());
//! assert_eq!(outcome.buffer.dimensions(), (1604, 1052));
//! ```

// Submodules
mod apply;
mod decision;
mod types;

// Re-export public API
pub use apply::{rotate_ccw, verify_dimensions, RotationApplicator};
pub use decision::{
    clockwise_to_primitive_angle, primitive_angle_non_negative, RotationDecisionEngine,
};
pub use types::{
    DecisionReason, Interpolation, RotationDecision, RotationOptions, RotationOptionsBuilder,
    RotationOutcome, RotationVerificationWarning, ALPHA_OPAQUE, DEFAULT_BACKGROUND_COLOR,
    DEFAULT_CONFIDENCE_THRESHOLD,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ImageBuffer;
    use crate::osd::OrientationEstimate;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn test_default_options() {
        let opts = RotationOptions::default();
        assert_eq!(opts.background_color, [255, 255, 255]);
        assert_eq!(opts.interpolation, Interpolation::Bilinear);
    }

    #[test]
    fn test_builder_pattern() {
        let opts = RotationOptions::builder()
            .background_color([0, 0, 0])
            .interpolation(Interpolation::Nearest)
            .build();
        assert_eq!(opts.background_color, [0, 0, 0]);
        assert_eq!(opts.interpolation, Interpolation::Nearest);
    }

    #[test]
    fn test_decide_then_apply_portrait_licence() {
        let buffer = ImageBuffer::new(DynamicImage::ImageRgb8(RgbImage::new(1052, 1604)));
        let estimate = OrientationEstimate::new(270, Some(0.47));

        let decision = RotationDecisionEngine::decide(Some(&estimate), 0.3);
        assert!(decision.should_rotate);
        assert_eq!(decision.applied_angle, -270);

        let outcome = RotationApplicator::apply(buffer, &decision, &RotationOptions::default());
        assert!(outcome.rotated);
        assert_eq!(outcome.buffer.dimensions(), (1604, 1052));
        assert!(outcome.verification.is_none());
    }

    #[test]
    fn test_decide_then_apply_upright() {
        let buffer = ImageBuffer::new(DynamicImage::ImageRgb8(RgbImage::new(1052, 1604)));
        let estimate = OrientationEstimate::new(0, Some(4.88));

        let decision = RotationDecisionEngine::decide(Some(&estimate), 0.3);
        let outcome =
            RotationApplicator::apply(buffer.clone(), &decision, &RotationOptions::default());
        assert!(!outcome.rotated);
        assert_eq!(outcome.buffer, buffer);
    }

    #[test]
    fn test_reason_descriptions_distinct() {
        let reasons = [
            DecisionReason::NoEstimate,
            DecisionReason::AlreadyUpright,
            DecisionReason::ConfidenceAboveThreshold,
            DecisionReason::ConfidenceUnknown,
            DecisionReason::ConfidenceAtOrBelowThreshold,
        ];
        let mut seen = std::collections::HashSet::new();
        for r in reasons {
            assert!(seen.insert(r.describe()));
        }
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RotationOptions>();
        assert_send_sync::<RotationDecision>();
        assert_send_sync::<RotationOutcome>();
    }
}
