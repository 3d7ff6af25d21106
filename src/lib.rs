//! ocr-orient - Orientation-correcting OCR preprocessing for identity documents
//!
//! Phone photos and scans of licences, passports and ID cards often arrive
//! sideways or upside down. This crate gets them upright before OCR and keeps
//! a record of every decision it made along the way.
//!
//! # Features
//!
//! - **Loading** ([`loader`]) - Decode JPEG/PNG/TIFF/BMP and read the EXIF orientation tag
//! - **Quality Analysis** ([`quality`]) - Advisory exposure metrics
//! - **Metadata Correction** ([`exif_orientation`]) - Apply the embedded orientation tag
//! - **Orientation Detection** ([`osd`]) - Tesseract script/orientation detection
//! - **Rotation** ([`rotation`]) - Confidence-gated rotation with dimension verification
//! - **Normalization** ([`normalize`]) - 8-bit grayscale for OCR
//! - **OCR** ([`ocr`]) and **Enhancement** ([`enhance`]) - Tesseract text plus optional LLM cleanup
//! - **Reporting** ([`compare`], [`report`]) - Before/after metrics and a markdown report
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ocr_orient::{DocumentPipeline, PipelineConfig};
//! use std::path::Path;
//!
//! let pipeline = DocumentPipeline::from_config(PipelineConfig::default());
//! let result = pipeline
//!     .process(Path::new("licence.jpg"), Path::new("./output"))
//!     .unwrap();
//! println!("rotated: {}", result.diagnostics.rotated);
//! println!("{}", result.final_text().unwrap_or_default());
//! ```
//!
//! # Architecture
//!
//! ```text
//! Load -> Quality -> EXIF correction -> [snapshot] -> OSD -> Decision
//!                                                              |
//!        Report <- Enhancement <- OCR <- [snapshot] <- Normalize <- Rotate
//! ```
//!
//! # License
//!
//! AGPL-3.0

pub mod buffer;
pub mod cli;
pub mod compare;
pub mod config;
pub mod enhance;
pub mod exif_orientation;
pub mod loader;
pub mod normalize;
pub mod ocr;
pub mod osd;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod rotation;
pub mod tool_bridge;
pub mod util;

// Re-exports for convenience
pub use buffer::{ColorMode, ImageBuffer};
pub use cli::{create_progress_bar, create_spinner, Cli, Commands, ExitCode, ProcessArgs};
pub use compare::{TextComparison, TextStatistics};
pub use config::{apply_env, CliOverrides, Config, ConfigError};
pub use enhance::{
    ChatCompletionEnhancer, EnhanceContext, EnhanceError, EnhancerOptions,
    EnhancerOptionsBuilder, TextEnhancer,
};
pub use exif_orientation::{
    MetadataCorrection, MetadataCorrector, MetadataOutcome, OrientationMetadata,
};
pub use loader::{ImageDescriptor, ImageLoader, LoadError, LoadedImage, SUPPORTED_EXTENSIONS};
pub use normalize::{NormalizeOptions, NormalizeOutcome, Normalized, Normalizer};
pub use ocr::{OcrEngine, OcrError, TesseractOcr};
pub use osd::{
    parse_osd_report, DetectionError, OrientationDetector, OrientationEstimate, TesseractOsd,
};
pub use pipeline::{
    batch_stems, calculate_optimal_chunk_size, process_in_chunks, Artifacts, ComparisonMetrics,
    DetectionOutcome, DocumentPipeline, EnhancementOutcome, FallbackOutcome, PipelineConfig,
    PipelineError, PipelineResult, ProgressCallback, RunDiagnostics, SilentProgress,
};
pub use quality::{Exposure, QualityAnalyzer, QualityMetrics, QualityOptions};
pub use rotation::{
    DecisionReason, Interpolation, RotationApplicator, RotationDecision,
    RotationDecisionEngine, RotationOptions, RotationOutcome, RotationVerificationWarning,
};
pub use tool_bridge::{BridgeError, ToolBridge, ToolBridgeConfig};
pub use util::{collect_image_files, ensure_dir_writable, format_duration, format_file_size, percentage};
