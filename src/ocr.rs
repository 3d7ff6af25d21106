//! OCR adapter module
//!
//! Text extraction is an external boundary: a normalized grayscale image goes
//! in, plain text comes out. [`TesseractOcr`] drives the Tesseract CLI through
//! the tool bridge.

use crate::buffer::ImageBuffer;
use crate::tool_bridge::{BridgeError, ToolBridge, ToolBridgeConfig};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default OCR language
pub const DEFAULT_LANGUAGE: &str = "eng";

/// OCR error types
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    EngineNotAvailable(String),

    #[error("OCR failed: {0}")]
    ExtractionFailed(String),

    #[error("OCR timed out after {0:?}")]
    Timeout(Duration),

    #[error("Image encoding failed: {0}")]
    EncodeError(String),
}

pub type Result<T> = std::result::Result<T, OcrError>;

impl From<BridgeError> for OcrError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::ToolNotFound(tool) => OcrError::EngineNotAvailable(tool),
            BridgeError::Timeout(d) => OcrError::Timeout(d),
            other => OcrError::ExtractionFailed(other.to_string()),
        }
    }
}

/// Text extraction engine
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Extract text from a normalized image
    fn extract_text(&self, buffer: &ImageBuffer, language: &str) -> Result<String>;
}

/// Tesseract CLI engine
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    bridge: ToolBridge,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(120))
    }
}

impl TesseractOcr {
    pub fn new(config: ToolBridgeConfig) -> Self {
        Self {
            bridge: ToolBridge::new(config),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(ToolBridgeConfig::builder().timeout(timeout).build())
    }

    pub fn bridge(&self) -> &ToolBridge {
        &self.bridge
    }

    fn args(language: &str) -> Vec<String> {
        let lang = if language.trim().is_empty() {
            DEFAULT_LANGUAGE
        } else {
            language.trim()
        };
        ["stdin", "stdout", "-l", lang]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn extract_text(&self, buffer: &ImageBuffer, language: &str) -> Result<String> {
        let png = buffer
            .encode_png()
            .map_err(|e| OcrError::EncodeError(e.to_string()))?;
        let output = self.bridge.run(&Self::args(language), Some(&png))?;
        debug!(
            chars = output.stdout.chars().count(),
            duration = ?output.duration,
            "OCR finished"
        );
        Ok(output.stdout)
    }
}
