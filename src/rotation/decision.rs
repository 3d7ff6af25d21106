//! Rotation decision engine
//!
//! Turns an orientation estimate into a yes/no decision plus the angle the
//! rotation primitive expects. Detectors report the clockwise correction;
//! the primitive rotates counter-clockwise for positive angles, so the two
//! conventions differ by a sign.

use super::types::{DecisionReason, RotationDecision};
use crate::osd::OrientationEstimate;
use tracing::{debug, info};

/// Convert a clockwise correction into the counter-clockwise primitive angle
///
/// A 270 degree clockwise correction is a -270 degree primitive rotation,
/// which is the same turn as +90.
pub fn clockwise_to_primitive_angle(clockwise: u32) -> i32 {
    -((clockwise % 360) as i32)
}

/// Same turn as [`clockwise_to_primitive_angle`], expressed in `0..360`
pub fn primitive_angle_non_negative(clockwise: u32) -> u32 {
    (360 - clockwise % 360) % 360
}

/// Rotation decision engine
pub struct RotationDecisionEngine;

impl RotationDecisionEngine {
    /// Decide whether to rotate
    ///
    /// Rotates when the estimate asks for a nonzero correction and its
    /// confidence is strictly above `threshold`, or no confidence was given.
    /// Confidence is compared as-is, never clamped.
    pub fn decide(estimate: Option<&OrientationEstimate>, threshold: f64) -> RotationDecision {
        let Some(estimate) = estimate else {
            debug!("no orientation estimate, not rotating");
            return RotationDecision::no_rotation(DecisionReason::NoEstimate, threshold);
        };

        let rotate = estimate.rotate_degrees;
        let confidence = estimate.orientation_confidence;

        let (should_rotate, reason) = if rotate % 360 == 0 {
            (false, DecisionReason::AlreadyUpright)
        } else {
            match confidence {
                None => (true, DecisionReason::ConfidenceUnknown),
                Some(c) if c > threshold => (true, DecisionReason::ConfidenceAboveThreshold),
                Some(_) => (false, DecisionReason::ConfidenceAtOrBelowThreshold),
            }
        };

        let applied_angle = if should_rotate {
            clockwise_to_primitive_angle(rotate)
        } else {
            0
        };

        info!(
            rotate,
            ?confidence,
            threshold,
            should_rotate,
            applied_angle,
            reason = reason.describe(),
            "rotation decision"
        );

        RotationDecision {
            should_rotate,
            applied_angle,
            rotate_degrees: Some(rotate),
            confidence,
            threshold,
            reason,
        }
    }
}
