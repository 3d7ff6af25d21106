//! Configuration file support for ocr-orient
//!
//! Settings are layered, later layers winning:
//! 1. Default values
//! 2. TOML file: `--config <path>`, else `./ocr-orient.toml`, else
//!    `~/.config/ocr-orient/config.toml`
//! 3. Environment variables (`OCR_ENABLED`, `GROQ_API_KEY`, ...)
//! 4. CLI flags
//!
//! # Example Configuration
//!
//! ```toml
//! [ocr]
//! enabled = true
//! language = "eng"
//!
//! [enhancement]
//! enabled = false
//! temperature = 0.1
//!
//! [rotation]
//! confidence_threshold = 0.3
//!
//! [output]
//! save_snapshots = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::quality::QualityOptions;
use crate::PipelineConfig;

/// Default config file name in the working directory
pub const CONFIG_FILE_NAME: &str = "ocr-orient.toml";

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// OCR configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OcrConfig {
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Tesseract language code(s)
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Minimum trimmed characters before the unrotated retry (0 = off)
    #[serde(default)]
    pub fallback_min_chars: Option<usize>,
}

/// Text enhancement configuration
///
/// The API key is read from `GROQ_API_KEY` only, never from the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnhancementConfig {
    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Orientation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RotationConfig {
    /// Minimum detector confidence (exclusive)
    #[serde(default)]
    pub confidence_threshold: Option<f64>,

    #[serde(default)]
    pub osd_timeout_secs: Option<u64>,
}

/// Exposure analysis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityConfig {
    #[serde(default)]
    pub bright_threshold: Option<u8>,

    #[serde(default)]
    pub dark_threshold: Option<u8>,

    #[serde(default)]
    pub overexposed_ratio: Option<f64>,

    #[serde(default)]
    pub underexposed_ratio: Option<f64>,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default)]
    pub save_snapshots: Option<bool>,

    #[serde(default)]
    pub write_report: Option<bool>,

    #[serde(default)]
    pub compare_original: Option<bool>,

    /// Invert grayscale output
    #[serde(default)]
    pub invert: Option<bool>,
}

/// External tools and resources
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default)]
    pub tesseract_path: Option<PathBuf>,

    #[serde(default)]
    pub threads: Option<usize>,

    #[serde(default)]
    pub max_memory_mb: Option<usize>,

    /// Extra attempts after a failed Tesseract run
    #[serde(default)]
    pub retries: Option<u32>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub enhancement: EnhancementConfig,

    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default search path
    ///
    /// Returns defaults when no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        for path in Self::search_paths() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Get config file search paths
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("ocr-orient").join("config.toml"));
        }

        paths
    }

    /// Convert to PipelineConfig
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();

        // OCR
        if let Some(enabled) = self.ocr.enabled {
            config = config.with_ocr(enabled);
        }
        if let Some(language) = &self.ocr.language {
            config = config.with_language(language.clone());
        }
        if let Some(secs) = self.ocr.timeout_secs {
            config.ocr_timeout_secs = secs;
        }
        if let Some(chars) = self.ocr.fallback_min_chars {
            config = config.with_fallback_min_chars(chars);
        }

        // Enhancement
        if let Some(enabled) = self.enhancement.enabled {
            config = config.with_enhancement(enabled);
        }
        if let Some(temperature) = self.enhancement.temperature {
            config = config.with_temperature(temperature);
        }
        if let Some(model) = &self.enhancement.model {
            config.enhancement_model = model.clone();
        }
        if let Some(url) = &self.enhancement.base_url {
            config.enhancement_base_url = url.clone();
        }
        if let Some(secs) = self.enhancement.timeout_secs {
            config.enhancement_timeout_secs = secs;
        }

        // Rotation
        if let Some(threshold) = self.rotation.confidence_threshold {
            config = config.with_threshold(threshold);
        }
        if let Some(secs) = self.rotation.osd_timeout_secs {
            config.osd_timeout_secs = secs;
        }

        // Quality
        let mut quality = QualityOptions::builder();
        if let Some(level) = self.quality.bright_threshold {
            quality = quality.bright_threshold(level);
        }
        if let Some(level) = self.quality.dark_threshold {
            quality = quality.dark_threshold(level);
        }
        if let Some(ratio) = self.quality.overexposed_ratio {
            quality = quality.overexposed_ratio(ratio);
        }
        if let Some(ratio) = self.quality.underexposed_ratio {
            quality = quality.underexposed_ratio(ratio);
        }
        config.quality = quality.build();

        // Output
        if let Some(save) = self.output.save_snapshots {
            config = config.with_snapshots(save);
        }
        if let Some(report) = self.output.write_report {
            config = config.with_report(report);
        }
        if let Some(compare) = self.output.compare_original {
            config = config.with_compare_original(compare);
        }
        if let Some(invert) = self.output.invert {
            config = config.with_invert(invert);
        }

        // Tools
        if let Some(path) = &self.tools.tesseract_path {
            config.tesseract_path = path.clone();
        }
        if let Some(threads) = self.tools.threads {
            config.threads = Some(threads);
        }
        if let Some(mb) = self.tools.max_memory_mb {
            config.max_memory_mb = mb;
        }
        if let Some(retries) = self.tools.retries {
            config.tool_retries = retries;
        }

        config
    }

    /// Merge file, process environment and CLI (CLI takes precedence)
    pub fn merge_with_cli(&self, cli: &CliOverrides) -> PipelineConfig {
        let mut config = self.to_pipeline_config();
        apply_env(&mut config, |key| std::env::var(key).ok());
        cli.apply(&mut config);
        config
    }
}

// ============================================================
// Environment
// ============================================================

/// Environment variables read by [`apply_env`]
pub const ENV_KEYS: &[&str] = &[
    "OCR_ENABLED",
    "OCR_LANGUAGE",
    "TEXT_ENHANCEMENT_ENABLED",
    "TEXT_ENHANCEMENT_TEMPERATURE",
    "ROTATION_CONFIDENCE_THRESHOLD",
    "GROQ_API_KEY",
    "GROQ_MODEL_NAME",
    "OSD_TIMEOUT_SECS",
];

/// Apply environment overrides through `lookup`
///
/// Malformed values are logged and ignored.
pub fn apply_env<F>(config: &mut PipelineConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(v) = get("OCR_ENABLED") {
        if let Some(b) = parse_env_bool("OCR_ENABLED", &v) {
            config.ocr_enabled = b;
        }
    }
    if let Some(v) = get("OCR_LANGUAGE") {
        config.ocr_language = v;
    }
    if let Some(v) = get("TEXT_ENHANCEMENT_ENABLED") {
        if let Some(b) = parse_env_bool("TEXT_ENHANCEMENT_ENABLED", &v) {
            config.enhancement_enabled = b;
        }
    }
    if let Some(v) = get("TEXT_ENHANCEMENT_TEMPERATURE") {
        if let Some(t) = parse_env_value("TEXT_ENHANCEMENT_TEMPERATURE", &v) {
            config.enhancement_temperature = t;
        }
    }
    if let Some(v) = get("ROTATION_CONFIDENCE_THRESHOLD") {
        if let Some(t) = parse_env_value("ROTATION_CONFIDENCE_THRESHOLD", &v) {
            config.confidence_threshold = t;
        }
    }
    if let Some(v) = get("GROQ_API_KEY") {
        config.enhancement_api_key = Some(v);
    }
    if let Some(v) = get("GROQ_MODEL_NAME") {
        config.enhancement_model = v;
    }
    if let Some(v) = get("OSD_TIMEOUT_SECS") {
        if let Some(secs) = parse_env_value("OSD_TIMEOUT_SECS", &v) {
            config.osd_timeout_secs = secs;
        }
    }
}

fn parse_env_bool(key: &str, value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value, "ignoring malformed boolean");
            None
        }
    }
}

fn parse_env_value<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value, "ignoring malformed number");
            None
        }
    }
}

// ============================================================
// CLI overrides
// ============================================================

/// CLI override values for merging with config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub ocr: Option<bool>,
    pub language: Option<String>,
    pub enhance: Option<bool>,
    pub threshold: Option<f64>,
    pub invert: Option<bool>,
    pub save_snapshots: Option<bool>,
    pub write_report: Option<bool>,
    pub compare_original: Option<bool>,
    pub threads: Option<usize>,
    pub max_memory_mb: Option<usize>,
}

impl CliOverrides {
    /// Create new empty overrides
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ocr(mut self, ocr: bool) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_enhance(mut self, enhance: bool) -> Self {
        self.enhance = Some(enhance);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = Some(invert);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Apply overrides onto a config
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(ocr) = self.ocr {
            config.ocr_enabled = ocr;
        }
        if let Some(language) = &self.language {
            config.ocr_language = language.clone();
        }
        if let Some(enhance) = self.enhance {
            config.enhancement_enabled = enhance;
        }
        if let Some(threshold) = self.threshold {
            config.confidence_threshold = threshold;
        }
        if let Some(invert) = self.invert {
            config.invert = invert;
        }
        if let Some(save) = self.save_snapshots {
            config.save_snapshots = save;
        }
        if let Some(report) = self.write_report {
            config.write_report = report;
        }
        if let Some(compare) = self.compare_original {
            config.compare_original = compare;
        }
        if let Some(threads) = self.threads {
            config.threads = Some(threads);
        }
        if let Some(mb) = self.max_memory_mb {
            config.max_memory_mb = mb;
        }
    }
}
