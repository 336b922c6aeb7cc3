//! Upload validation: decides whether uploaded bytes are a plausible brain MRI.
//!
//! Two stages, chained explicitly:
//! 1. DICOM parse. A dataset with a Modality tag is judged on that tag alone:
//!    `MR` is accepted, anything else is rejected.
//! 2. Raster fallback, when the DICOM parse fails or carries no Modality:
//!    any JPEG/PNG that decodes is accepted. This is deliberately loose; the
//!    classifier has no "not an MRI" class, so any decodable picture gets a
//!    prediction.

pub mod dicom;
pub mod format;

use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub use dicom::{DicomDataset, DicomError};
pub use format::{sniff, SniffedFormat, UploadExtension, MAX_UPLOAD_BYTES};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unsupported file extension: {0:?} (accepted: dcm, jpg, jpeg, png)")]
    UnsupportedExtension(String),

    #[error("Uploaded file is empty")]
    Empty,

    #[error("Uploaded file is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("DICOM modality is {0:?}, expected MR")]
    WrongModality(String),

    #[error("Not a readable medical image: {reason}")]
    Undecodable { reason: String },
}

impl ValidationError {
    /// Stable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedExtension(_) => "UNSUPPORTED_EXTENSION",
            Self::Empty => "EMPTY_UPLOAD",
            Self::TooLarge { .. } => "UPLOAD_TOO_LARGE",
            Self::WrongModality(_) => "WRONG_MODALITY",
            Self::Undecodable { .. } => "UNDECODABLE_IMAGE",
        }
    }
}

/// How an accepted upload will be turned into pixels.
#[derive(Debug, Clone)]
pub enum AcceptedSource {
    /// DICOM dataset with modality MR.
    Dicom(Box<DicomDataset>),
    /// Decoded JPEG/PNG (orientation not yet applied).
    Raster(DynamicImage),
}

/// An upload that passed validation.
#[derive(Debug, Clone)]
pub struct AcceptedUpload {
    pub extension: UploadExtension,
    pub sniffed: SniffedFormat,
    pub source: AcceptedSource,
}

impl AcceptedUpload {
    pub fn kind(&self) -> UploadKind {
        match self.source {
            AcceptedSource::Dicom(_) => UploadKind::Dicom,
            AcceptedSource::Raster(_) => UploadKind::Raster,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    Dicom,
    Raster,
}

/// Two-stage upload validator. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Validate raw bytes with their declared extension.
    ///
    /// Every failure is folded into a typed rejection; nothing panics.
    pub fn check(&self, bytes: &[u8], extension: &str) -> Result<AcceptedUpload, ValidationError> {
        let result = self.check_inner(bytes, extension);
        if let Err(ref e) = result {
            warn!(extension, size = bytes.len(), error = %e, "Upload rejected");
        }
        result
    }

    fn check_inner(&self, bytes: &[u8], extension: &str) -> Result<AcceptedUpload, ValidationError> {
        let ext = UploadExtension::parse(extension)
            .ok_or_else(|| ValidationError::UnsupportedExtension(extension.to_string()))?;

        if bytes.is_empty() {
            return Err(ValidationError::Empty);
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ValidationError::TooLarge {
                size: bytes.len(),
                limit: MAX_UPLOAD_BYTES,
            });
        }

        let sniffed = sniff(bytes);

        // Stage 1: DICOM
        let dicom_failure = match dicom::parse(bytes) {
            Ok(dataset) => match dataset.modality() {
                Some("MR") => {
                    debug!(extension = %ext, "Accepted DICOM upload with MR modality");
                    return Ok(AcceptedUpload {
                        extension: ext,
                        sniffed,
                        source: AcceptedSource::Dicom(Box::new(dataset)),
                    });
                }
                Some(other) => return Err(ValidationError::WrongModality(other.to_string())),
                None => "DICOM dataset has no Modality element".to_string(),
            },
            Err(e) => e.to_string(),
        };

        // Stage 2: raster fallback
        match image::load_from_memory(bytes) {
            Ok(image) => {
                debug!(
                    extension = %ext,
                    sniffed = sniffed.as_str(),
                    width = image.width(),
                    height = image.height(),
                    "Accepted raster upload"
                );
                Ok(AcceptedUpload {
                    extension: ext,
                    sniffed,
                    source: AcceptedSource::Raster(image),
                })
            }
            Err(e) => Err(ValidationError::Undecodable {
                reason: format!("{dicom_failure}; image decode failed: {e}"),
            }),
        }
    }
}

/// Boolean form of [`Validator::check`].
pub fn validate(bytes: &[u8], extension: &str) -> bool {
    Validator::new().check(bytes, extension).is_ok()
}

#[cfg(test)]
pub(crate) mod test_images {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    /// A small encoded test image.
    pub fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128])
        });
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, format)
            .unwrap();
        cursor.into_inner()
    }

    pub fn png(width: u32, height: u32) -> Vec<u8> {
        encoded(width, height, ImageFormat::Png)
    }

    pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
        encoded(width, height, ImageFormat::Jpeg)
    }
}
