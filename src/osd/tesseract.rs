//! Tesseract OSD adapter
//!
//! Runs `tesseract stdin stdout --psm 0` and parses the report it prints:
//!
//! ```text
//! Page number: 0
//! Orientation in degrees: 90
//! Rotate: 270
//! Orientation confidence: 0.47
//! Script: Latin
//! Script confidence: 2.38
//! ```

use super::types::{DetectionError, OrientationDetector, OrientationEstimate, Result};
use crate::buffer::ImageBuffer;
use crate::tool_bridge::{BridgeError, ToolBridge, ToolBridgeConfig};
use std::time::Duration;
use tracing::{debug, warn};

/// Orientation detector backed by the Tesseract CLI
#[derive(Debug, Clone)]
pub struct TesseractOsd {
    bridge: ToolBridge,
}

impl Default for TesseractOsd {
    fn default() -> Self {
        Self::new(ToolBridgeConfig::default())
    }
}

impl TesseractOsd {
    pub fn new(config: ToolBridgeConfig) -> Self {
        Self {
            bridge: ToolBridge::new(config),
        }
    }

    /// Default Tesseract binary with a custom per-call timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(ToolBridgeConfig::builder().timeout(timeout).build())
    }

    pub fn bridge(&self) -> &ToolBridge {
        &self.bridge
    }
}

impl OrientationDetector for TesseractOsd {
    fn name(&self) -> &str {
        "tesseract-osd"
    }

    fn detect(&self, buffer: &ImageBuffer) -> Result<OrientationEstimate> {
        let png = buffer
            .encode_png()
            .map_err(|e| DetectionError::Unavailable(format!("encode failed: {}", e)))?;

        let args = ["stdin", "stdout", "--psm", "0"].map(String::from);
        let output = self.bridge.run(&args, Some(&png)).map_err(|e| match e {
            BridgeError::Timeout(d) => DetectionError::Timeout(d),
            other => {
                warn!(error = %other, "orientation detector failed");
                DetectionError::Unavailable(other.to_string())
            }
        })?;

        debug!(duration = ?output.duration, "OSD finished");
        // Some builds print the report on stderr
        parse_osd_report(&output.stdout).or_else(|_| parse_osd_report(&output.stderr))
    }
}

/// Parse Tesseract's OSD report
///
/// `Rotate` is required and must be a quarter turn. A missing orientation
/// confidence yields `None`.
pub fn parse_osd_report(report: &str) -> Result<OrientationEstimate> {
    let mut page_number = None;
    let mut orientation_degrees = None;
    let mut rotate = None;
    let mut orientation_confidence = None;
    let mut script = None;
    let mut script_confidence = None;

    for line in report.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Page number" => page_number = value.parse::<u32>().ok(),
            "Orientation in degrees" => orientation_degrees = value.parse::<u32>().ok(),
            "Rotate" => rotate = Some(value),
            "Orientation confidence" => orientation_confidence = value.parse::<f64>().ok(),
            "Script" if !value.is_empty() => script = Some(value.to_string()),
            "Script confidence" => script_confidence = value.parse::<f64>().ok(),
            _ => {}
        }
    }

    let Some(raw_rotate) = rotate else {
        return Err(DetectionError::Unavailable(
            "no rotation field in OSD output".to_string(),
        ));
    };
    let rotate_degrees: u32 = raw_rotate.parse().map_err(|_| {
        DetectionError::Unavailable(format!("unparseable rotation value: {}", raw_rotate))
    })?;

    let estimate = OrientationEstimate {
        page_number: page_number.unwrap_or(0),
        orientation_degrees: orientation_degrees.unwrap_or((360 - rotate_degrees % 360) % 360),
        rotate_degrees,
        // Tesseract never reports a signed confidence; treat one as not reported
        orientation_confidence: orientation_confidence
            .filter(|c: &f64| c.is_finite() && c.is_sign_positive()),
        script,
        script_confidence,
    };

    if !estimate.has_valid_rotation() {
        return Err(DetectionError::Unavailable(format!(
            "rotation {} is not a quarter turn",
            rotate_degrees
        )));
    }

    Ok(estimate)
}
