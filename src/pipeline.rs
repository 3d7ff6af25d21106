//! Pipeline processing module
//!
//! Provides a clean API for the document orientation pipeline, separating
//! business logic from CLI handling.
//!
//! ## Processing Steps
//!
//! 1. Load image and orientation metadata
//! 2. Quality analysis (advisory)
//! 3. Metadata orientation correction
//! 4. Orientation detection (OSD)
//! 5. Rotation decision
//! 6. Rotation with dimension verification
//! 7. Grayscale normalization
//! 8. OCR (optional, with low-text fallback)
//! 9. Text enhancement (optional)
//! 10. Comparison and report

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::buffer::ImageBuffer;
use crate::compare::{TextComparison, TextStatistics};
use crate::enhance::{
    ChatCompletionEnhancer, EnhanceContext, EnhancerOptions, TextEnhancer, DEFAULT_BASE_URL,
    DEFAULT_MODEL, DEFAULT_TEMPERATURE,
};
use crate::exif_orientation::{MetadataCorrector, MetadataOutcome};
use crate::loader::{ImageDescriptor, ImageLoader, LoadError, LoadedImage};
use crate::normalize::{NormalizeOptions, NormalizeOutcome, Normalizer};
use crate::ocr::{OcrEngine, OcrError, TesseractOcr, DEFAULT_LANGUAGE};
use crate::osd::{DetectionError, OrientationDetector, OrientationEstimate, TesseractOsd};
use crate::quality::{QualityAnalyzer, QualityMetrics, QualityOptions};
use crate::report;
use crate::rotation::{
    RotationApplicator, RotationDecision, RotationDecisionEngine, RotationOptions,
    RotationVerificationWarning, DEFAULT_CONFIDENCE_THRESHOLD,
};
use crate::tool_bridge::ToolBridgeConfig;

// ============================================================
// Memory Management Utilities
// ============================================================

/// Estimated peak memory per document (decoded color + grayscale copies)
const ESTIMATED_IMAGE_MEMORY_MB: usize = 150;

/// Minimum chunk size for parallel processing
const MIN_CHUNK_SIZE: usize = 2;

/// Default memory limit if not specified (4GB)
const DEFAULT_MEMORY_LIMIT_MB: usize = 4096;

/// Calculate optimal chunk size based on memory constraints
///
/// # Arguments
/// * `total_items` - Total number of items to process
/// * `max_memory_mb` - Maximum memory to use (0 = use available memory)
/// * `threads` - Number of parallel threads
pub fn calculate_optimal_chunk_size(
    total_items: usize,
    max_memory_mb: usize,
    threads: usize,
) -> usize {
    let memory_limit = if max_memory_mb == 0 {
        get_available_memory_mb().unwrap_or(DEFAULT_MEMORY_LIMIT_MB)
    } else {
        max_memory_mb
    };

    // Leave half for the OS and the external OCR processes
    let usable_memory = memory_limit / 2;

    let max_concurrent = threads.max(1);
    let capacity = (usable_memory / ESTIMATED_IMAGE_MEMORY_MB).min(max_concurrent);

    capacity.max(MIN_CHUNK_SIZE).min(total_items).max(1)
}

/// Get available system memory in MB
#[cfg(target_os = "linux")]
fn get_available_memory_mb() -> Option<usize> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    meminfo
        .lines()
        .find(|line| line.starts_with("MemAvailable:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<usize>().ok())
        .map(|kb| kb / 1024)
}

#[cfg(not(target_os = "linux"))]
fn get_available_memory_mb() -> Option<usize> {
    Some(DEFAULT_MEMORY_LIMIT_MB)
}

/// Process items in chunks for memory-controlled parallel execution
///
/// Each chunk runs in parallel on rayon; chunks run one after another to cap
/// peak memory. Results come back in input order.
pub fn process_in_chunks<T, R, F, P>(
    items: &[T],
    chunk_size: usize,
    processor: F,
    progress: Option<&P>,
) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
    P: Fn(usize, usize) + Sync,
{
    let total = items.len();
    if total == 0 {
        return vec![];
    }

    let effective_chunk_size = if chunk_size == 0 { total } else { chunk_size };
    let completed = AtomicUsize::new(0);
    let mut results = Vec::with_capacity(total);

    for chunk in items.chunks(effective_chunk_size) {
        let chunk_results: Vec<R> = chunk
            .par_iter()
            .map(|item| {
                let result = processor(item);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(cb) = progress {
                    cb(done, total);
                }
                result
            })
            .collect();
        results.extend(chunk_results);
    }

    results
}

// ============================================================
// Progress
// ============================================================

/// Progress callback for pipeline steps
pub trait ProgressCallback: Send + Sync {
    /// Called when a new step starts
    fn on_step_start(&self, step: &str);
    /// Called to report progress within a step
    fn on_step_progress(&self, current: usize, total: usize);
    /// Called when a step completes
    fn on_step_complete(&self, step: &str, message: &str);
    /// Called for debug/verbose messages
    fn on_debug(&self, message: &str);
}

/// No-op progress callback (silent mode)
pub struct SilentProgress;

impl ProgressCallback for SilentProgress {
    fn on_step_start(&self, _step: &str) {}
    fn on_step_progress(&self, _current: usize, _total: usize) {}
    fn on_step_complete(&self, _step: &str, _message: &str) {}
    fn on_debug(&self, _message: &str) {}
}

// ============================================================
// Errors
// ============================================================

/// Pipeline processing error
///
/// Only unreadable input and OCR failures abort a document; detection gaps,
/// verification mismatches and enhancement failures are recorded instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================
// Configuration
// ============================================================

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run OCR on the normalized image
    pub ocr_enabled: bool,
    /// Tesseract language code(s), e.g. `eng` or `eng+deu`
    pub ocr_language: String,
    /// Run LLM text enhancement after OCR
    pub enhancement_enabled: bool,
    /// Sampling temperature for enhancement
    pub enhancement_temperature: f32,
    /// Chat completions model
    pub enhancement_model: String,
    /// Chat completions endpoint base URL
    pub enhancement_base_url: String,
    /// Never serialized
    #[serde(skip)]
    pub enhancement_api_key: Option<String>,
    /// Minimum detector confidence (exclusive) required to rotate
    pub confidence_threshold: f64,
    /// Invert intensities after grayscale conversion
    pub invert: bool,
    /// Save `_preprocessed` and `_final` snapshots
    pub save_snapshots: bool,
    /// Write the markdown report
    pub write_report: bool,
    /// Also OCR the unrotated image and compare with the final text
    pub compare_original: bool,
    /// Retry OCR on the unrotated image when the rotated result is shorter (0 = off)
    pub fallback_min_chars: usize,
    /// Orientation detector timeout (seconds)
    pub osd_timeout_secs: u64,
    /// OCR timeout (seconds)
    pub ocr_timeout_secs: u64,
    /// Enhancement HTTP timeout (seconds)
    pub enhancement_timeout_secs: u64,
    /// Tesseract executable
    pub tesseract_path: PathBuf,
    /// Extra attempts after a failed Tesseract run (timeouts are not retried)
    #[serde(default)]
    pub tool_retries: u32,
    /// Exposure thresholds
    pub quality: QualityOptions,
    /// Thread count (None = auto)
    pub threads: Option<usize>,
    /// Maximum memory usage in MB (0 = auto)
    #[serde(default)]
    pub max_memory_mb: usize,
    /// Chunk size for batch processing (0 = auto based on memory)
    #[serde(default)]
    pub chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_enabled: true,
            ocr_language: DEFAULT_LANGUAGE.to_string(),
            enhancement_enabled: false,
            enhancement_temperature: DEFAULT_TEMPERATURE,
            enhancement_model: DEFAULT_MODEL.to_string(),
            enhancement_base_url: DEFAULT_BASE_URL.to_string(),
            enhancement_api_key: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            invert: false,
            save_snapshots: true,
            write_report: true,
            compare_original: false,
            fallback_min_chars: 5,
            osd_timeout_secs: 30,
            ocr_timeout_secs: 120,
            enhancement_timeout_secs: 60,
            tesseract_path: PathBuf::from("tesseract"),
            tool_retries: 0,
            quality: QualityOptions::default(),
            threads: None,
            max_memory_mb: 0,
            chunk_size: 0,
        }
    }
}

impl PipelineConfig {
    /// Convert to JSON string (API key excluded)
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Builder pattern: set OCR
    pub fn with_ocr(mut self, enabled: bool) -> Self {
        self.ocr_enabled = enabled;
        self
    }

    /// Builder pattern: set OCR language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.ocr_language = language.into();
        self
    }

    /// Builder pattern: set enhancement
    pub fn with_enhancement(mut self, enabled: bool) -> Self {
        self.enhancement_enabled = enabled;
        self
    }

    /// Builder pattern: set enhancement temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.enhancement_temperature = temperature;
        self
    }

    /// Builder pattern: set confidence threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Builder pattern: set inversion
    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// Builder pattern: set snapshot saving
    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        self.save_snapshots = enabled;
        self
    }

    /// Builder pattern: set report writing
    pub fn with_report(mut self, enabled: bool) -> Self {
        self.write_report = enabled;
        self
    }

    /// Builder pattern: set original/final comparison
    pub fn with_compare_original(mut self, enabled: bool) -> Self {
        self.compare_original = enabled;
        self
    }

    /// Builder pattern: set low-text fallback minimum
    pub fn with_fallback_min_chars(mut self, chars: usize) -> Self {
        self.fallback_min_chars = chars;
        self
    }

    /// Builder pattern: set thread count
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions::builder().invert(self.invert).build()
    }

    pub fn enhancer_options(&self) -> EnhancerOptions {
        let mut builder = EnhancerOptions::builder()
            .base_url(self.enhancement_base_url.clone())
            .model(self.enhancement_model.clone())
            .temperature(self.enhancement_temperature)
            .timeout(Duration::from_secs(self.enhancement_timeout_secs));
        if let Some(key) = &self.enhancement_api_key {
            builder = builder.api_key(key.clone());
        }
        builder.build()
    }

    fn tool_config(&self, timeout_secs: u64) -> ToolBridgeConfig {
        ToolBridgeConfig::builder()
            .program(self.tesseract_path.clone())
            .timeout(Duration::from_secs(timeout_secs))
            .max_retries(self.tool_retries)
            .build()
    }
}

// ============================================================
// Results
// ============================================================

/// What the orientation detector produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetectionOutcome {
    Detected(OrientationEstimate),
    /// Detector ran but could not tell (too little text, failure, bad output)
    Unavailable(String),
    TimedOut(Duration),
}

impl DetectionOutcome {
    pub fn estimate(&self) -> Option<&OrientationEstimate> {
        match self {
            DetectionOutcome::Detected(estimate) => Some(estimate),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DetectionOutcome::Detected(e) => format!(
                "rotate {} (orientation {}, confidence {})",
                e.rotate_degrees,
                e.orientation_degrees,
                e.orientation_confidence
                    .map(|c| format!("{:.2}", c))
                    .unwrap_or_else(|| "n/a".to_string())
            ),
            DetectionOutcome::Unavailable(reason) => format!("unavailable: {}", reason),
            DetectionOutcome::TimedOut(d) => format!("timed out after {:?}", d),
        }
    }
}

impl From<std::result::Result<OrientationEstimate, DetectionError>> for DetectionOutcome {
    fn from(result: std::result::Result<OrientationEstimate, DetectionError>) -> Self {
        match result {
            Ok(estimate) => DetectionOutcome::Detected(estimate),
            Err(DetectionError::Unavailable(reason)) => DetectionOutcome::Unavailable(reason),
            Err(DetectionError::Timeout(d)) => DetectionOutcome::TimedOut(d),
        }
    }
}

/// Low-text fallback result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackOutcome {
    /// Unrotated OCR was not longer; rotated text kept
    KeptRotated {
        rotated_chars: usize,
        unrotated_chars: usize,
    },
    /// Unrotated OCR was longer and replaced the rotated text
    UsedUnrotated {
        rotated_chars: usize,
        unrotated_chars: usize,
    },
    /// Unrotated OCR failed; rotated text kept
    Failed(String),
}

/// Enhancement step result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnhancementOutcome {
    Disabled,
    /// Enabled but not run (no text, no enhancer)
    Skipped(String),
    Enhanced,
    /// Raw text kept
    Failed(String),
}

/// Files written for one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub preprocessed: Option<PathBuf>,
    pub final_image: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// Everything recorded about one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub source_name: String,
    pub descriptor: ImageDescriptor,
    pub quality: QualityMetrics,
    pub metadata: MetadataOutcome,
    pub detector: String,
    pub detection: DetectionOutcome,
    pub decision: RotationDecision,
    pub rotated: bool,
    pub verification: Option<RotationVerificationWarning>,
    pub final_dimensions: (u32, u32),
    pub normalize: NormalizeOutcome,
    pub inverted: bool,
    pub fallback: Option<FallbackOutcome>,
    pub enhancement: EnhancementOutcome,
    pub artifacts: Artifacts,
    pub elapsed: Duration,
}

/// Text comparisons of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetrics {
    /// OCR of the unrotated image vs. the final text
    pub original_vs_final: Option<TextComparison>,
    /// Raw OCR vs. enhanced text
    pub raw_vs_enhanced: Option<TextComparison>,
}

/// Result of pipeline processing
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Normalized image handed to OCR
    pub final_image: ImageBuffer,
    /// OCR output (`None` when OCR is off)
    pub raw_text: Option<String>,
    pub enhanced_text: Option<String>,
    pub comparison: ComparisonMetrics,
    pub statistics: Option<TextStatistics>,
    pub diagnostics: RunDiagnostics,
}

impl PipelineResult {
    /// Enhanced text when available, otherwise raw OCR text
    pub fn final_text(&self) -> Option<&str> {
        self.enhanced_text
            .as_deref()
            .or(self.raw_text.as_deref())
    }
}

// ============================================================
// Pipeline
// ============================================================

/// Document orientation pipeline
pub struct DocumentPipeline {
    config: PipelineConfig,
    detector: Box<dyn OrientationDetector>,
    ocr: Option<Box<dyn OcrEngine>>,
    enhancer: Option<Box<dyn TextEnhancer>>,
}

impl DocumentPipeline {
    /// Create a pipeline with an explicit detector and no OCR or enhancer
    pub fn new(config: PipelineConfig, detector: Box<dyn OrientationDetector>) -> Self {
        Self {
            config,
            detector,
            ocr: None,
            enhancer: None,
        }
    }

    /// Create a pipeline with the bundled Tesseract and chat completions collaborators
    pub fn from_config(config: PipelineConfig) -> Self {
        let detector = Box::new(TesseractOsd::new(config.tool_config(config.osd_timeout_secs)));
        let ocr: Option<Box<dyn OcrEngine>> = config.ocr_enabled.then(|| {
            Box::new(TesseractOcr::new(config.tool_config(config.ocr_timeout_secs)))
                as Box<dyn OcrEngine>
        });
        let enhancer: Option<Box<dyn TextEnhancer>> = if config.enhancement_enabled {
            match ChatCompletionEnhancer::new(config.enhancer_options()) {
                Ok(e) => Some(Box::new(e)),
                Err(e) => {
                    warn!(error = %e, "text enhancement disabled");
                    None
                }
            }
        } else {
            None
        };

        Self {
            config,
            detector,
            ocr,
            enhancer,
        }
    }

    /// Replace the OCR engine
    pub fn with_ocr(mut self, engine: Box<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    /// Replace the text enhancer
    pub fn with_enhancer(mut self, enhancer: Box<dyn TextEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// Get the pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Artifact path for a document stem
    pub fn artifact_path(output_dir: &Path, stem: &str, suffix: &str) -> PathBuf {
        output_dir.join(format!("{}_{}", stem, suffix))
    }

    /// Process a single image file (silent mode)
    pub fn process(&self, input: &Path, output_dir: &Path) -> Result<PipelineResult, PipelineError> {
        self.process_with_progress(input, output_dir, &SilentProgress)
    }

    /// Process a single image file with progress callback
    pub fn process_with_progress<P: ProgressCallback>(
        &self,
        input: &Path,
        output_dir: &Path,
        progress: &P,
    ) -> Result<PipelineResult, PipelineError> {
        self.process_named(input, &document_stem(input), output_dir, progress)
    }

    fn process_named<P: ProgressCallback>(
        &self,
        input: &Path,
        stem: &str,
        output_dir: &Path,
        progress: &P,
    ) -> Result<PipelineResult, PipelineError> {
        progress.on_step_start("Loading image...");
        let loaded = ImageLoader::load(input)?;
        progress.on_step_complete(
            "Loading image",
            &format!(
                "{}x{} {}",
                loaded.descriptor.width, loaded.descriptor.height, loaded.descriptor.color_mode
            ),
        );

        if self.config.save_snapshots || self.config.write_report {
            std::fs::create_dir_all(output_dir)?;
        }

        self.process_loaded(loaded, stem, Some(output_dir), progress)
    }

    /// Process an in-memory image; artifacts are written only when `output_dir` is given
    pub fn process_bytes(
        &self,
        bytes: &[u8],
        name: &str,
        output_dir: Option<&Path>,
    ) -> Result<PipelineResult, PipelineError> {
        let loaded = ImageLoader::load_bytes(bytes)?;
        if let Some(dir) = output_dir {
            std::fs::create_dir_all(dir)?;
        }
        self.process_loaded(loaded, name, output_dir, &SilentProgress)
    }

    /// Process many files in memory-bounded parallel chunks
    ///
    /// Per-file failures are returned in place and never abort the batch.
    /// Artifact names come from [`batch_stems`].
    pub fn process_batch<F>(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        on_progress: Option<&F>,
    ) -> Vec<Result<RunDiagnostics, PipelineError>>
    where
        F: Fn(usize, usize) + Sync,
    {
        let chunk_size = if self.config.chunk_size > 0 {
            self.config.chunk_size
        } else {
            calculate_optimal_chunk_size(
                inputs.len(),
                self.config.max_memory_mb,
                self.config.threads.unwrap_or_else(rayon::current_num_threads),
            )
        };
        debug!(files = inputs.len(), chunk_size, "batch start");

        let jobs: Vec<(&PathBuf, String)> = inputs.iter().zip(batch_stems(inputs)).collect();
        process_in_chunks(
            &jobs,
            chunk_size,
            |(input, stem)| {
                self.process_named(input, stem, output_dir, &SilentProgress)
                    .map(|r| r.diagnostics)
                    .inspect_err(|e| {
                        warn!(input = %input.display(), error = %e, "document failed");
                    })
            },
            on_progress,
        )
    }

    /// Run every stage after loading
    pub fn process_loaded<P: ProgressCallback>(
        &self,
        loaded: LoadedImage,
        source_name: &str,
        output_dir: Option<&Path>,
        progress: &P,
    ) -> Result<PipelineResult, PipelineError> {
        let start_time = Instant::now();
        let LoadedImage {
            buffer,
            orientation,
            descriptor,
        } = loaded;
        let mut artifacts = Artifacts::default();
        let snapshot_dir = output_dir.filter(|_| self.config.save_snapshots);

        // Quality (advisory)
        let quality = QualityAnalyzer::analyze(&buffer, &self.config.quality);
        progress.on_debug(&format!(
            "quality: mean {:.1}, std {:.1}, {}",
            quality.mean_brightness,
            quality.std_dev,
            quality.exposure.label()
        ));

        // Metadata orientation
        progress.on_step_start("Applying orientation metadata...");
        let correction = MetadataCorrector::correct(buffer, orientation);
        progress.on_step_complete("Orientation metadata", &correction.outcome.describe());
        if let Some(dir) = snapshot_dir {
            artifacts.preprocessed = save_snapshot(
                &correction.buffer,
                &Self::artifact_path(dir, source_name, "preprocessed.png"),
            );
        }

        // Orientation detection on the color image
        progress.on_step_start("Detecting orientation...");
        let detection = DetectionOutcome::from(self.detector.detect(&correction.buffer));
        if !matches!(detection, DetectionOutcome::Detected(_)) {
            warn!(source = source_name, detection = %detection.describe(), "orientation unknown");
        }
        progress.on_step_complete("Orientation detection", &detection.describe());

        // Decision
        let decision =
            RotationDecisionEngine::decide(detection.estimate(), self.config.confidence_threshold);
        progress.on_debug(&format!("decision: {}", decision.reason.describe()));

        let ocr = self.ocr.as_deref().filter(|_| self.config.ocr_enabled);
        let keep_unrotated = decision.should_rotate
            && ocr.is_some()
            && (self.config.fallback_min_chars > 0 || self.config.compare_original);
        let unrotated = keep_unrotated.then(|| correction.buffer.clone());

        // Rotation
        progress.on_step_start("Applying rotation...");
        let rotation = RotationApplicator::apply(
            correction.buffer,
            &decision,
            &RotationOptions::default(),
        );
        progress.on_step_complete(
            "Rotation",
            &if rotation.rotated {
                format!("rotated by {} degrees", decision.applied_angle)
            } else {
                "not rotated".to_string()
            },
        );

        // Normalization
        let normalize_options = self.config.normalize_options();
        let normalized = Normalizer::normalize(rotation.buffer, &normalize_options);
        let final_dimensions = normalized.buffer.dimensions();
        if let Some(dir) = snapshot_dir {
            artifacts.final_image = save_snapshot(
                &normalized.buffer,
                &Self::artifact_path(dir, source_name, "final.png"),
            );
        }

        // OCR
        let mut fallback = None;
        let mut comparison = ComparisonMetrics::default();
        let raw_text = match ocr {
            Some(engine) => {
                progress.on_step_start("Running OCR...");
                let language = &self.config.ocr_language;
                let rotated_text = engine.extract_text(&normalized.buffer, language)?;

                let unrotated_text = unrotated.map(|buffer| {
                    let gray = Normalizer::normalize(buffer, &normalize_options).buffer;
                    engine.extract_text(&gray, language)
                });

                let rotated_chars = trimmed_chars(&rotated_text);
                let mut text = rotated_text;
                if let Some(other) = &unrotated_text {
                    if self.config.fallback_min_chars > 0
                        && rotated_chars < self.config.fallback_min_chars
                    {
                        let outcome = match other {
                            Ok(alt) if trimmed_chars(alt) > rotated_chars => {
                                let unrotated_chars = trimmed_chars(alt);
                                info!(rotated_chars, unrotated_chars, "using unrotated OCR text");
                                text = alt.clone();
                                FallbackOutcome::UsedUnrotated {
                                    rotated_chars,
                                    unrotated_chars,
                                }
                            }
                            Ok(alt) => FallbackOutcome::KeptRotated {
                                rotated_chars,
                                unrotated_chars: trimmed_chars(alt),
                            },
                            Err(e) => FallbackOutcome::Failed(e.to_string()),
                        };
                        fallback = Some(outcome);
                    }
                }

                if self.config.compare_original {
                    let original = match &unrotated_text {
                        Some(Ok(original)) => Some(original.as_str()),
                        Some(Err(_)) => None,
                        // Not rotated: the original image is the final image
                        None => Some(text.as_str()),
                    };
                    comparison.original_vs_final =
                        original.map(|o| TextComparison::between(o, &text));
                }

                progress.on_step_complete(
                    "OCR",
                    &format!("{} characters", text.chars().count()),
                );
                Some(text)
            }
            None => None,
        };

        // Enhancement
        let (enhanced_text, enhancement) = self.enhance(raw_text.as_deref(), source_name, progress);
        comparison.raw_vs_enhanced = match (&raw_text, &enhanced_text) {
            (Some(raw), Some(enhanced)) => Some(TextComparison::between(raw, enhanced)),
            _ => None,
        };

        let statistics = enhanced_text
            .as_deref()
            .or(raw_text.as_deref())
            .map(TextStatistics::from_text);

        let report_path = output_dir
            .filter(|_| self.config.write_report)
            .map(|dir| Self::artifact_path(dir, source_name, "report.md"));

        let mut result = PipelineResult {
            final_image: normalized.buffer,
            raw_text,
            enhanced_text,
            comparison,
            statistics,
            diagnostics: RunDiagnostics {
                source_name: source_name.to_string(),
                descriptor,
                quality,
                metadata: correction.outcome,
                detector: self.detector.name().to_string(),
                detection,
                decision,
                rotated: rotation.rotated,
                verification: rotation.verification,
                final_dimensions,
                normalize: normalized.outcome,
                inverted: normalized.inverted,
                fallback,
                enhancement,
                artifacts,
                elapsed: start_time.elapsed(),
            },
        };

        if let Some(path) = report_path {
            result.diagnostics.artifacts.report = Some(path.clone());
            let markdown = report::render(&result, &self.config);
            if let Err(e) = std::fs::write(&path, markdown) {
                warn!(path = %path.display(), error = %e, "failed to write report");
                result.diagnostics.artifacts.report = None;
            }
        }

        info!(
            source = source_name,
            rotated = result.diagnostics.rotated,
            width = final_dimensions.0,
            height = final_dimensions.1,
            elapsed_ms = result.diagnostics.elapsed.as_millis() as u64,
            "document processed"
        );

        Ok(result)
    }

    fn enhance<P: ProgressCallback>(
        &self,
        raw_text: Option<&str>,
        source_name: &str,
        progress: &P,
    ) -> (Option<String>, EnhancementOutcome) {
        if !self.config.enhancement_enabled {
            return (None, EnhancementOutcome::Disabled);
        }
        let Some(raw) = raw_text.filter(|t| !t.trim().is_empty()) else {
            return (None, EnhancementOutcome::Skipped("no OCR text".to_string()));
        };
        let Some(enhancer) = self.enhancer.as_deref() else {
            return (
                None,
                EnhancementOutcome::Skipped("no enhancer configured".to_string()),
            );
        };

        progress.on_step_start("Enhancing text...");
        match enhancer.enhance(raw, &EnhanceContext::for_image(source_name)) {
            Ok(text) => {
                progress.on_step_complete("Enhancement", &format!("{} characters", text.chars().count()));
                (Some(text), EnhancementOutcome::Enhanced)
            }
            Err(e) => {
                warn!(error = %e, "enhancement failed, keeping raw text");
                progress.on_step_complete("Enhancement", "failed, raw text kept");
                (None, EnhancementOutcome::Failed(e.to_string()))
            }
        }
    }
}

/// Artifact stem for a single input file
fn document_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Artifact stems for a batch, one per input
///
/// Inputs whose file stem is shared with another input get the extension
/// appended (`card.png` and `card.jpg` become `card_png` and `card_jpg`) so
/// their artifacts never overwrite each other. A numeric suffix resolves any
/// collision that remains.
pub fn batch_stems(inputs: &[PathBuf]) -> Vec<String> {
    let mut stem_counts: HashMap<String, usize> = HashMap::new();
    for input in inputs {
        *stem_counts.entry(document_stem(input)).or_default() += 1;
    }

    let mut taken: HashSet<String> = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let stem = document_stem(input);
            let base = if stem_counts.get(&stem).copied().unwrap_or(0) > 1 {
                match input.extension() {
                    Some(ext) => format!("{}_{}", stem, ext.to_string_lossy()),
                    None => stem,
                }
            } else {
                stem
            };

            let mut candidate = base.clone();
            let mut n = 2;
            while !taken.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

fn trimmed_chars(text: &str) -> usize {
    text.trim().chars().count()
}

/// Write a snapshot; failures are logged and yield `None`
fn save_snapshot(buffer: &ImageBuffer, path: &Path) -> Option<PathBuf> {
    match buffer.save(path) {
        Ok(()) => Some(path.to_path_buf()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to save snapshot");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhance::EnhanceError;
    use crate::exif_orientation::OrientationMetadata;
    use crate::osd::Result as DetectResult;
    use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
    use std::sync::{Arc, Mutex};

    struct FixedDetector(OrientationEstimate);

    impl OrientationDetector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }
        fn detect(&self, _buffer: &ImageBuffer) -> DetectResult<OrientationEstimate> {
            Ok(self.0.clone())
        }
    }

    struct TimeoutDetector;

    impl OrientationDetector for TimeoutDetector {
        fn name(&self) -> &str {
            "timeout"
        }
        fn detect(&self, _buffer: &ImageBuffer) -> DetectResult<OrientationEstimate> {
            Err(DetectionError::Timeout(Duration::from_secs(30)))
        }
    }

    /// Records the dimensions of every buffer it is shown
    struct RecordingDetector {
        seen: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    impl OrientationDetector for RecordingDetector {
        fn name(&self) -> &str {
            "recording"
        }
        fn detect(&self, buffer: &ImageBuffer) -> DetectResult<OrientationEstimate> {
            self.seen.lock().unwrap().push(buffer.dimensions());
            Ok(OrientationEstimate::new(0, Some(5.0)))
        }
    }

    /// Returns text only when the image is wider than tall
    struct LandscapeOcr {
        text: &'static str,
    }

    impl OcrEngine for LandscapeOcr {
        fn name(&self) -> &str {
            "landscape"
        }
        fn extract_text(&self, buffer: &ImageBuffer, _language: &str) -> crate::ocr::Result<String> {
            let (w, h) = buffer.dimensions();
            Ok(if w > h { self.text.to_string() } else { String::new() })
        }
    }

    /// Returns text only when the image is taller than wide
    struct PortraitOcr;

    impl OcrEngine for PortraitOcr {
        fn name(&self) -> &str {
            "portrait"
        }
        fn extract_text(&self, buffer: &ImageBuffer, _language: &str) -> crate::ocr::Result<String> {
            let (w, h) = buffer.dimensions();
            Ok(if h > w { "NAME JOHN DOE".to_string() } else { "x".to_string() })
        }
    }

    struct FailingOcr;

    impl OcrEngine for FailingOcr {
        fn name(&self) -> &str {
            "failing"
        }
        fn extract_text(&self, _buffer: &ImageBuffer, _language: &str) -> crate::ocr::Result<String> {
            Err(OcrError::ExtractionFailed("engine crashed".to_string()))
        }
    }

    struct UppercaseEnhancer;

    impl TextEnhancer for UppercaseEnhancer {
        fn name(&self) -> &str {
            "upper"
        }
        fn enhance(&self, raw: &str, _context: &EnhanceContext) -> crate::enhance::Result<String> {
            Ok(raw.to_uppercase())
        }
    }

    struct RejectingEnhancer;

    impl TextEnhancer for RejectingEnhancer {
        fn name(&self) -> &str {
            "reject"
        }
        fn enhance(&self, _raw: &str, _context: &EnhanceContext) -> crate::enhance::Result<String> {
            Err(EnhanceError::LengthGuard { ratio: 3.2 })
        }
    }

    fn loaded(width: u32, height: u32) -> LoadedImage {
        let buffer = ImageBuffer::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([230, 230, 230]),
        )));
        LoadedImage {
            descriptor: ImageDescriptor {
                width,
                height,
                color_mode: buffer.color_mode(),
                file_size: 0,
                extension: "png".to_string(),
                mime_type: "image/png".to_string(),
            },
            buffer,
            orientation: OrientationMetadata::Absent,
        }
    }

    fn quiet_config() -> PipelineConfig {
        PipelineConfig::default()
            .with_snapshots(false)
            .with_report(false)
    }

    fn fixed(rotate: u32, confidence: Option<f64>) -> Box<dyn OrientationDetector> {
        Box::new(FixedDetector(OrientationEstimate::new(rotate, confidence)))
    }

    // ============ PipelineConfig Tests ============

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert!(config.ocr_enabled);
        assert_eq!(config.ocr_language, "eng");
        assert!(!config.enhancement_enabled);
        assert_eq!(config.enhancement_temperature, 0.1);
        assert_eq!(config.confidence_threshold, 0.3);
        assert!(!config.invert);
        assert!(config.save_snapshots);
        assert!(config.write_report);
        assert_eq!(config.fallback_min_chars, 5);
        assert_eq!(config.osd_timeout_secs, 30);
        assert_eq!(config.ocr_timeout_secs, 120);
        assert_eq!(config.max_memory_mb, 0);
        assert_eq!(config.chunk_size, 0);
        assert_eq!(config.tool_retries, 0);
    }

    #[test]
    fn test_tool_config_carries_retries() {
        let mut config = PipelineConfig::default();
        config.tool_retries = 2;
        let tool = config.tool_config(config.ocr_timeout_secs);
        assert_eq!(tool.retry_config.max_retries, 2);
        assert_eq!(tool.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_pipeline_config_to_json_hides_key() {
        let mut config = PipelineConfig::default();
        config.enhancement_api_key = Some("gsk_secret".to_string());
        let json = config.to_json();
        assert!(json.contains("\"ocr_language\":\"eng\""));
        assert!(json.contains("\"confidence_threshold\":0.3"));
        assert!(!json.contains("gsk_secret"));
    }

    #[test]
    fn test_pipeline_config_builder() {
        let config = PipelineConfig::default()
            .with_ocr(false)
            .with_language("deu")
            .with_enhancement(true)
            .with_temperature(0.2)
            .with_threshold(1.0)
            .with_invert(true)
            .with_threads(Some(2));
        assert!(!config.ocr_enabled);
        assert_eq!(config.ocr_language, "deu");
        assert!(config.enhancement_enabled);
        assert_eq!(config.enhancement_temperature, 0.2);
        assert_eq!(config.confidence_threshold, 1.0);
        assert!(config.normalize_options().invert);
        assert_eq!(config.threads, Some(2));
    }

    #[test]
    fn test_from_config_without_key_has_no_enhancer() {
        let pipeline = DocumentPipeline::from_config(PipelineConfig::default().with_enhancement(true));
        assert!(pipeline.enhancer.is_none());
        assert!(pipeline.ocr.is_some());
        let pipeline = DocumentPipeline::from_config(PipelineConfig::default().with_ocr(false));
        assert!(pipeline.ocr.is_none());
    }

    // ============ Stage Wiring Tests ============

    #[test]
    fn test_rotation_produces_grayscale_landscape() {
        let pipeline = DocumentPipeline::new(quiet_config(), fixed(270, Some(0.47)));
        let result = pipeline
            .process_loaded(loaded(1052, 1604), "licence", None, &SilentProgress)
            .unwrap();

        assert!(result.diagnostics.rotated);
        assert_eq!(result.diagnostics.decision.applied_angle, -270);
        assert_eq!(result.final_image.dimensions(), (1604, 1052));
        assert_eq!(result.diagnostics.final_dimensions, (1604, 1052));
        assert!(result.final_image.is_single_channel());
        assert!(result.diagnostics.verification.is_none());
        // No OCR engine attached
        assert!(result.raw_text.is_none());
    }

    #[test]
    fn test_timeout_means_no_rotation() {
        let pipeline = DocumentPipeline::new(quiet_config(), Box::new(TimeoutDetector));
        let result = pipeline
            .process_loaded(loaded(40, 60), "card", None, &SilentProgress)
            .unwrap();
        assert!(!result.diagnostics.rotated);
        assert!(matches!(result.diagnostics.detection, DetectionOutcome::TimedOut(_)));
        assert_eq!(result.final_image.dimensions(), (40, 60));
    }

    #[test]
    fn test_ocr_failure_aborts() {
        let pipeline = DocumentPipeline::new(quiet_config(), fixed(0, Some(5.0)))
            .with_ocr(Box::new(FailingOcr));
        let result = pipeline.process_loaded(loaded(20, 10), "card", None, &SilentProgress);
        assert!(matches!(result, Err(PipelineError::Ocr(_))));
    }

    #[test]
    fn test_ocr_disabled_skips_engine() {
        let pipeline = DocumentPipeline::new(quiet_config().with_ocr(false), fixed(0, None))
            .with_ocr(Box::new(FailingOcr));
        let result = pipeline
            .process_loaded(loaded(20, 10), "card", None, &SilentProgress)
            .unwrap();
        assert!(result.raw_text.is_none());
        assert!(result.statistics.is_none());
    }

    // ============ Fallback Tests ============

    #[test]
    fn test_fallback_uses_unrotated_text() {
        // Detector asks for a quarter turn, but only the original portrait layout reads
        let pipeline = DocumentPipeline::new(quiet_config(), fixed(90, Some(2.0)))
            .with_ocr(Box::new(PortraitOcr));
        let result = pipeline
            .process_loaded(loaded(30, 50), "card", None, &SilentProgress)
            .unwrap();

        assert_eq!(result.raw_text.as_deref(), Some("NAME JOHN DOE"));
        assert_eq!(
            result.diagnostics.fallback,
            Some(FallbackOutcome::UsedUnrotated {
                rotated_chars: 1,
                unrotated_chars: 13
            })
        );
        // Final image stays rotated
        assert_eq!(result.final_image.dimensions(), (50, 30));
    }

    #[test]
    fn test_fallback_not_triggered_with_enough_text() {
        let pipeline = DocumentPipeline::new(quiet_config(), fixed(90, Some(2.0)))
            .with_ocr(Box::new(LandscapeOcr { text: "DRIVING LICENCE" }));
        let result = pipeline
            .process_loaded(loaded(30, 50), "card", None, &SilentProgress)
            .unwrap();
        assert_eq!(result.raw_text.as_deref(), Some("DRIVING LICENCE"));
        assert!(result.diagnostics.fallback.is_none());
    }

    #[test]
    fn test_fallback_keeps_rotated_when_not_longer() {
        let pipeline = DocumentPipeline::new(quiet_config(), fixed(90, Some(2.0)))
            .with_ocr(Box::new(LandscapeOcr { text: "ab" }));
        let result = pipeline
            .process_loaded(loaded(30, 50), "card", None, &SilentProgress)
            .unwrap();
        assert_eq!(result.raw_text.as_deref(), Some("ab"));
        assert_eq!(
            result.diagnostics.fallback,
            Some(FallbackOutcome::KeptRotated {
                rotated_chars: 2,
                unrotated_chars: 0
            })
        );
    }

    #[test]
    fn test_fallback_disabled() {
        let pipeline = DocumentPipeline::new(
            quiet_config().with_fallback_min_chars(0),
            fixed(90, Some(2.0)),
        )
        .with_ocr(Box::new(PortraitOcr));
        let result = pipeline
            .process_loaded(loaded(30, 50), "card", None, &SilentProgress)
            .unwrap();
        assert_eq!(result.raw_text.as_deref(), Some("x"));
        assert!(result.diagnostics.fallback.is_none());
    }

    #[test]
    fn test_compare_original() {
        let pipeline = DocumentPipeline::new(
            quiet_config().with_compare_original(true),
            fixed(90, Some(2.0)),
        )
        .with_ocr(Box::new(LandscapeOcr { text: "DRIVING LICENCE" }));
        let result = pipeline
            .process_loaded(loaded(30, 50), "card", None, &SilentProgress)
            .unwrap();
        let cmp = result.comparison.original_vs_final.unwrap();
        assert_eq!(cmp.before_chars, 0);
        assert_eq!(cmp.after_chars, 15);
        assert_eq!(cmp.percent_change, None);
    }

    // ============ Enhancement Tests ============

    #[test]
    fn test_enhancement_applied() {
        let pipeline = DocumentPipeline::new(quiet_config().with_enhancement(true), fixed(0, None))
            .with_ocr(Box::new(LandscapeOcr { text: "dl no 42" }))
            .with_enhancer(Box::new(UppercaseEnhancer));
        let result = pipeline
            .process_loaded(loaded(60, 40), "card", None, &SilentProgress)
            .unwrap();
        assert_eq!(result.raw_text.as_deref(), Some("dl no 42"));
        assert_eq!(result.enhanced_text.as_deref(), Some("DL NO 42"));
        assert_eq!(result.final_text(), Some("DL NO 42"));
        assert_eq!(result.diagnostics.enhancement, EnhancementOutcome::Enhanced);
        assert_eq!(result.comparison.raw_vs_enhanced.unwrap().char_delta, 0);
    }

    #[test]
    fn test_enhancement_failure_keeps_raw() {
        let pipeline = DocumentPipeline::new(quiet_config().with_enhancement(true), fixed(0, None))
            .with_ocr(Box::new(LandscapeOcr { text: "dl no 42" }))
            .with_enhancer(Box::new(RejectingEnhancer));
        let result = pipeline
            .process_loaded(loaded(60, 40), "card", None, &SilentProgress)
            .unwrap();
        assert!(result.enhanced_text.is_none());
        assert_eq!(result.final_text(), Some("dl no 42"));
        assert!(matches!(
            result.diagnostics.enhancement,
            EnhancementOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_enhancement_disabled_ignores_enhancer() {
        let pipeline = DocumentPipeline::new(quiet_config(), fixed(0, None))
            .with_ocr(Box::new(LandscapeOcr { text: "abc def" }))
            .with_enhancer(Box::new(UppercaseEnhancer));
        let result = pipeline
            .process_loaded(loaded(60, 40), "card", None, &SilentProgress)
            .unwrap();
        assert!(result.enhanced_text.is_none());
        assert_eq!(result.diagnostics.enhancement, EnhancementOutcome::Disabled);
    }

    // ============ Artifact Tests ============

    #[test]
    fn test_artifacts_written() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DocumentPipeline::new(PipelineConfig::default(), fixed(180, Some(1.0)))
            .with_ocr(Box::new(LandscapeOcr { text: "REPUBLIC ID" }));
        let result = pipeline
            .process_loaded(loaded(60, 40), "id_card", Some(dir.path()), &SilentProgress)
            .unwrap();

        let artifacts = &result.diagnostics.artifacts;
        let pre = artifacts.preprocessed.as_ref().unwrap();
        let fin = artifacts.final_image.as_ref().unwrap();
        let report = artifacts.report.as_ref().unwrap();
        assert_eq!(pre, &dir.path().join("id_card_preprocessed.png"));
        assert_eq!(fin, &dir.path().join("id_card_final.png"));
        assert_eq!(report, &dir.path().join("id_card_report.md"));
        assert!(pre.exists() && fin.exists() && report.exists());

        let saved = image::open(fin).unwrap();
        assert_eq!(saved.color(), image::ColorType::L8);
        let md = std::fs::read_to_string(report).unwrap();
        assert!(md.contains("REPUBLIC ID"));
    }

    #[test]
    fn test_exif_orientation_applied_before_detection() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = DocumentPipeline::new(
            quiet_config(),
            Box::new(RecordingDetector { seen: seen.clone() }),
        );
        let jpeg = crate::exif_orientation::tests::jpeg_with_orientation(40, 20, 6);
        let result = pipeline.process_bytes(&jpeg, "phone", None).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(20, 40)]);
        assert_eq!(result.diagnostics.metadata, MetadataOutcome::Applied(6));
        assert!(!result.diagnostics.rotated);
        assert_eq!(result.final_image.dimensions(), (20, 40));
    }

    #[test]
    fn test_process_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DocumentPipeline::new(quiet_config(), fixed(0, None));
        let result = pipeline.process(Path::new("/nonexistent/card.jpg"), dir.path());
        assert!(matches!(
            result,
            Err(PipelineError::Load(LoadError::NotFound(_)))
        ));
    }

    #[test]
    fn test_process_batch_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        RgbImage::from_pixel(12, 8, Rgb([200, 200, 200]))
            .save(&good)
            .unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"not a png").unwrap();

        let out = dir.path().join("out");
        let pipeline = DocumentPipeline::new(quiet_config(), fixed(0, None));
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let on_progress = move |_done: usize, _total: usize| {
            seen_clone.fetch_add(1, Ordering::Relaxed);
        };
        let results = pipeline.process_batch(&[good, bad], &out, Some(&on_progress));

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(PipelineError::Load(LoadError::UnreadableImage(_)))
        ));
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_process_batch_same_stem_keeps_both() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("card.png");
        let jpg = dir.path().join("card.jpg");
        RgbImage::from_pixel(12, 8, Rgb([200, 200, 200]))
            .save(&png)
            .unwrap();
        RgbImage::from_pixel(8, 12, Rgb([90, 90, 90]))
            .save(&jpg)
            .unwrap();

        let out = dir.path().join("out");
        let pipeline = DocumentPipeline::new(PipelineConfig::default(), fixed(0, None));
        let results = pipeline.process_batch(&[png, jpg], &out, None::<&fn(usize, usize)>);

        let png_final = results[0].as_ref().unwrap().artifacts.final_image.clone().unwrap();
        let jpg_final = results[1].as_ref().unwrap().artifacts.final_image.clone().unwrap();
        assert_ne!(png_final, jpg_final);
        assert_eq!(png_final, out.join("card_png_final.png"));
        assert_eq!(jpg_final, out.join("card_jpg_final.png"));
        assert_eq!(image::open(&png_final).unwrap().dimensions(), (12, 8));
        assert_eq!(image::open(&jpg_final).unwrap().dimensions(), (8, 12));
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 6);
    }

    #[test]
    fn test_batch_stems() {
        let stems = batch_stems(&[
            PathBuf::from("a/front.png"),
            PathBuf::from("a/card.png"),
            PathBuf::from("a/card.jpg"),
            PathBuf::from("b/card.jpg"),
        ]);
        assert_eq!(stems, vec!["front", "card_png", "card_jpg", "card_jpg_2"]);
    }

    #[test]
    fn test_batch_stems_unique_names_unchanged() {
        let stems = batch_stems(&[PathBuf::from("front.png"), PathBuf::from("back.jpg")]);
        assert_eq!(stems, vec!["front", "back"]);
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::Load(LoadError::UnsupportedFormat("gif".to_string()));
        assert_eq!(err.to_string(), "Unsupported image format: gif");
        let err = PipelineError::Ocr(OcrError::Timeout(Duration::from_secs(120)));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DocumentPipeline>();
        assert_send_sync::<PipelineConfig>();
    }

    // ============ Memory Management Tests ============

    #[test]
    fn test_calculate_optimal_chunk_size_basic() {
        let chunk = calculate_optimal_chunk_size(100, 4096, 8);
        assert!(chunk >= MIN_CHUNK_SIZE);
        assert!(chunk <= 8);
    }

    #[test]
    fn test_calculate_optimal_chunk_size_small_batch() {
        let chunk = calculate_optimal_chunk_size(1, 4096, 8);
        assert_eq!(chunk, 1);
    }

    #[test]
    fn test_calculate_optimal_chunk_size_zero_items() {
        assert_eq!(calculate_optimal_chunk_size(0, 4096, 8), 1);
    }

    #[test]
    fn test_calculate_optimal_chunk_size_limited_memory() {
        let chunk = calculate_optimal_chunk_size(100, 200, 8);
        assert_eq!(chunk, MIN_CHUNK_SIZE);
    }

    #[test]
    fn test_process_in_chunks_maintains_order() {
        let items: Vec<i32> = (0..20).collect();
        let results: Vec<i32> = process_in_chunks(&items, 3, |x| *x * 2, None::<&fn(usize, usize)>);
        let expected: Vec<i32> = (0..20).map(|x| x * 2).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_process_in_chunks_empty() {
        let items: Vec<i32> = vec![];
        let results: Vec<i32> = process_in_chunks(&items, 4, |x| *x, None::<&fn(usize, usize)>);
        assert!(results.is_empty());
    }

    #[test]
    fn test_process_in_chunks_chunk_size_zero() {
        let items: Vec<i32> = (0..10).collect();
        let results: Vec<i32> = process_in_chunks(&items, 0, |x| *x + 1, None::<&fn(usize, usize)>);
        assert_eq!(results, (1..11).collect::<Vec<i32>>());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_get_available_memory_linux() {
        let mem = get_available_memory_mb();
        assert!(mem.is_some());
    }
}
