//! Image loading module
//!
//! Opens source documents from disk or memory, checks the format against the
//! accepted set, decodes pixels and captures the embedded orientation tag.

use crate::buffer::{ColorMode, ImageBuffer};
use crate::exif_orientation::OrientationMetadata;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Accepted file extensions (lowercase)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif", "bmp"];

/// Loader error types
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Input file not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Unreadable image: {0}")]
    UnreadableImage(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// Whether a path carries one of the accepted extensions
pub fn is_supported_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_supported_format(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Tiff | ImageFormat::Bmp
    )
}

/// Facts about the source file, kept for the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    pub color_mode: ColorMode,
    pub file_size: u64,
    pub extension: String,
    pub mime_type: String,
}

/// Decoded image plus its orientation tag and descriptor
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub buffer: ImageBuffer,
    pub orientation: OrientationMetadata,
    pub descriptor: ImageDescriptor,
}

/// Image loader
pub struct ImageLoader;

impl ImageLoader {
    /// Load an image from disk
    pub fn load(path: &Path) -> Result<LoadedImage> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(LoadError::UnsupportedFormat(if extension.is_empty() {
                path.display().to_string()
            } else {
                extension
            }));
        }

        let bytes = std::fs::read(path)?;
        let format = image::guess_format(&bytes)
            .ok()
            .filter(|f| is_supported_format(*f))
            .ok_or_else(|| {
                LoadError::UnreadableImage(format!(
                    "{}: content does not match a supported image format",
                    path.display()
                ))
            })?;

        debug!(path = %path.display(), ?format, "loading image");
        Self::decode(&bytes, format, extension)
    }

    /// Load an image from an in-memory buffer; the format is sniffed from magic bytes
    pub fn load_bytes(bytes: &[u8]) -> Result<LoadedImage> {
        let format = image::guess_format(bytes)
            .map_err(|_| LoadError::UnsupportedFormat("unrecognized content".to_string()))?;
        if !is_supported_format(format) {
            return Err(LoadError::UnsupportedFormat(format!("{:?}", format)));
        }

        let extension = format
            .extensions_str()
            .first()
            .copied()
            .unwrap_or_default()
            .to_string();
        Self::decode(bytes, format, extension)
    }

    fn decode(bytes: &[u8], format: ImageFormat, extension: String) -> Result<LoadedImage> {
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| LoadError::UnreadableImage(e.to_string()))?;
        let buffer = ImageBuffer::new(image);
        let orientation = OrientationMetadata::read_from_container(bytes);

        let descriptor = ImageDescriptor {
            width: buffer.width(),
            height: buffer.height(),
            color_mode: buffer.color_mode(),
            file_size: bytes.len() as u64,
            extension,
            mime_type: format.to_mime_type().to_string(),
        };

        debug!(
            width = descriptor.width,
            height = descriptor.height,
            mode = %descriptor.color_mode,
            orientation = %orientation,
            "image decoded"
        );

        Ok(LoadedImage {
            buffer,
            orientation,
            descriptor,
        })
    }
}
