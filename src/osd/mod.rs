//! Orientation detection (OSD) module
//!
//! Wraps a script/orientation detector behind the [`OrientationDetector`]
//! trait. Detection failures are never fatal: the pipeline records them and
//! carries on without rotating.
//!
//! # Example
//!
//! ```rust,no_run
//! use ocr_orient::osd::{OrientationDetector, TesseractOsd};
//! use ocr_orient::loader::ImageLoader;
//! use std::path::Path;
//! use std::time::Duration;
//!
//! let loaded = ImageLoader::load(Path::new("licence.jpg")).unwrap();
//! let detector = TesseractOsd::with_timeout(Duration::from_secs(10));
//! match detector.detect(&loaded.buffer) {
//!     Ok(estimate) => println!("rotate {} cw", estimate.rotate_degrees),
//!     Err(e) => println!("unknown orientation: {}", e),
//! }
//! ```

// Submodules
mod tesseract;
mod types;

// Re-export public API
pub use tesseract::{parse_osd_report, TesseractOsd};
pub use types::{DetectionError, OrientationDetector, OrientationEstimate, Result, VALID_ROTATIONS};
