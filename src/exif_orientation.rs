//! Embedded orientation metadata
//!
//! Reads the EXIF `Orientation` tag from the source container and applies the
//! transform it describes, so that the orientation detector always sees the
//! image the way the camera meant it to be displayed.

use crate::buffer::ImageBuffer;
use exif::{In, Tag};
use image::metadata::Orientation;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

// ============================================================
// Metadata values
// ============================================================

/// Orientation recorded by the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrientationMetadata {
    /// No orientation tag present
    #[default]
    Absent,
    /// 1: already upright
    Normal,
    /// 2: mirrored left-right
    MirrorHorizontal,
    /// 3: upside down
    Rotate180,
    /// 4: mirrored top-bottom
    MirrorVertical,
    /// 5: mirror horizontal, then rotate 270 CW
    Transpose,
    /// 6: rotate 90 CW to display
    Rotate90Cw,
    /// 7: mirror horizontal, then rotate 90 CW
    Transverse,
    /// 8: rotate 270 CW to display
    Rotate270Cw,
    /// Tag present but outside 1..=8
    Unrecognized(u32),
}

impl OrientationMetadata {
    /// Map a raw EXIF orientation value
    pub fn from_exif_code(code: u32) -> Self {
        match code {
            1 => Self::Normal,
            2 => Self::MirrorHorizontal,
            3 => Self::Rotate180,
            4 => Self::MirrorVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90Cw,
            7 => Self::Transverse,
            8 => Self::Rotate270Cw,
            other => Self::Unrecognized(other),
        }
    }

    /// Raw EXIF value, if the tag was present
    pub fn exif_code(&self) -> Option<u32> {
        match self {
            Self::Absent => None,
            Self::Normal => Some(1),
            Self::MirrorHorizontal => Some(2),
            Self::Rotate180 => Some(3),
            Self::MirrorVertical => Some(4),
            Self::Transpose => Some(5),
            Self::Rotate90Cw => Some(6),
            Self::Transverse => Some(7),
            Self::Rotate270Cw => Some(8),
            Self::Unrecognized(raw) => Some(*raw),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Absent => "no metadata found",
            Self::Normal => "normal",
            Self::MirrorHorizontal => "mirrored horizontally",
            Self::Rotate180 => "rotated 180",
            Self::MirrorVertical => "mirrored vertically",
            Self::Transpose => "mirrored horizontally and rotated 270 CW",
            Self::Rotate90Cw => "rotated 90 CW",
            Self::Transverse => "mirrored horizontally and rotated 90 CW",
            Self::Rotate270Cw => "rotated 270 CW",
            Self::Unrecognized(_) => "unrecognized orientation value",
        }
    }

    /// Read the orientation tag from an encoded image container
    ///
    /// Any container without a readable EXIF block yields `Absent`.
    pub fn read_from_container(bytes: &[u8]) -> Self {
        let mut cursor = Cursor::new(bytes);
        let exif = match exif::Reader::new().read_from_container(&mut cursor) {
            Ok(exif) => exif,
            Err(e) => {
                debug!(error = %e, "no EXIF block");
                return Self::Absent;
            }
        };

        exif.get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(Self::from_exif_code)
            .unwrap_or(Self::Absent)
    }

    /// Transform the image crate applies for this value
    fn transform(&self) -> Option<Orientation> {
        let code = self.exif_code()?;
        let code = u8::try_from(code).ok()?;
        Orientation::from_exif(code)
    }
}

impl std::fmt::Display for OrientationMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.exif_code() {
            Some(code) => write!(f, "{} ({})", self.description(), code),
            None => f.write_str(self.description()),
        }
    }
}

// ============================================================
// Correction
// ============================================================

/// What the corrector did with the metadata it was given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataOutcome {
    /// Nothing to apply
    NoMetadata,
    /// Tag said the image is already upright
    AlreadyNormal,
    /// Transform for this EXIF value was applied
    Applied(u32),
    /// Tag value outside the standard set; image left as-is
    Unrecognized(u32),
}

impl MetadataOutcome {
    pub fn describe(&self) -> String {
        match self {
            Self::NoMetadata => "no metadata found".to_string(),
            Self::AlreadyNormal => "metadata reports normal orientation".to_string(),
            Self::Applied(code) => format!(
                "applied {} ({})",
                OrientationMetadata::from_exif_code(*code).description(),
                code
            ),
            Self::Unrecognized(raw) => format!("ignored unrecognized orientation value {}", raw),
        }
    }
}

/// Corrected buffer and the metadata it now carries
#[derive(Debug, Clone)]
pub struct MetadataCorrection {
    pub buffer: ImageBuffer,
    /// `Normal` once handled; `Absent` stays `Absent`
    pub orientation: OrientationMetadata,
    pub outcome: MetadataOutcome,
}

/// Applies embedded orientation metadata
pub struct MetadataCorrector;

impl MetadataCorrector {
    /// Apply `metadata` to `buffer`
    pub fn correct(buffer: ImageBuffer, metadata: OrientationMetadata) -> MetadataCorrection {
        match metadata {
            OrientationMetadata::Absent => MetadataCorrection {
                buffer,
                orientation: OrientationMetadata::Absent,
                outcome: MetadataOutcome::NoMetadata,
            },
            OrientationMetadata::Normal => MetadataCorrection {
                buffer,
                orientation: OrientationMetadata::Normal,
                outcome: MetadataOutcome::AlreadyNormal,
            },
            OrientationMetadata::Unrecognized(raw) => {
                debug!(raw, "unrecognized EXIF orientation, leaving image as-is");
                MetadataCorrection {
                    buffer,
                    orientation: OrientationMetadata::Normal,
                    outcome: MetadataOutcome::Unrecognized(raw),
                }
            }
            other => {
                let Some(transform) = other.transform() else {
                    return MetadataCorrection {
                        buffer,
                        orientation: OrientationMetadata::Normal,
                        outcome: MetadataOutcome::Unrecognized(other.exif_code().unwrap_or(0)),
                    };
                };
                let code = other.exif_code().unwrap_or(0);
                let mut image = buffer.into_dynamic();
                image.apply_orientation(transform);
                debug!(code, "applied EXIF orientation");
                MetadataCorrection {
                    buffer: ImageBuffer::new(image),
                    orientation: OrientationMetadata::Normal,
                    outcome: MetadataOutcome::Applied(code),
                }
            }
        }
    }
}
