//! Image preprocessing for classifier input.
//!
//! Pure image-to-tensor transform: no I/O, no model calls, fully testable.
//!
//! Flow:
//! 1. Turn the accepted upload into pixels (DICOM decode, or the decoded raster
//!    as stored; EXIF rotation only when explicitly enabled)
//! 2. Force 3-channel RGB
//! 3. Resize to the model's square input (150×150)
//! 4. Scale to [0, 1] and add the batch dimension → `[1, 150, 150, 3]`

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::{Array4, ArrayView4, Axis};
use thiserror::Error;
use tracing::debug;

use super::validation::{AcceptedSource, AcceptedUpload, DicomError};

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Square side length the classifier was trained on.
pub const MODEL_INPUT_SIZE: u32 = 150;

/// Channels per pixel in the model input.
pub const CHANNELS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("Failed to decode DICOM pixel data: {0}")]
    Dicom(#[from] DicomError),

    #[error("Image has zero width or height")]
    EmptyImage,

    #[error("Tensor shape {actual:?} is not [N, {size}, {size}, 3]")]
    BadTensorShape { actual: Vec<usize>, size: u32 },

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

// ═══════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════

/// Resize filter quality levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeQuality {
    /// CatmullRom (cubic).
    High,
    /// Triangle (bilinear).
    Fast,
}

impl ResizeQuality {
    fn filter(self) -> FilterType {
        match self {
            Self::High => FilterType::CatmullRom,
            Self::Fast => FilterType::Triangle,
        }
    }
}

/// What the classifier needs. Changes per model, not per request.
#[derive(Debug, Clone)]
pub struct ModelInputConfig {
    pub target_size: u32,
    pub resize_filter: ResizeQuality,
}

impl Default for ModelInputConfig {
    fn default() -> Self {
        Self {
            target_size: MODEL_INPUT_SIZE,
            resize_filter: ResizeQuality::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Orientation
// ═══════════════════════════════════════════════════════════

/// Fixes image orientation from EXIF metadata.
///
/// Photographed scans embed rotation in EXIF tag 0x0112. The classifier was
/// trained on pixels as stored, so correction is opt-in.
pub trait OrientationCorrector: Send + Sync {
    /// `raw_bytes`: original file bytes (EXIF lives there).
    /// No-op if no EXIF or orientation=1.
    fn correct(&self, raw_bytes: &[u8], image: DynamicImage) -> DynamicImage;
}

/// EXIF-based orientation correction via `kamadak-exif`.
///
/// EXIF orientation values:
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub struct ExifOrientationCorrector;

impl OrientationCorrector for ExifOrientationCorrector {
    fn correct(&self, raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
        let orientation = read_exif_orientation(raw_bytes);
        apply_orientation(image, orientation)
    }
}

/// Leaves pixels as stored. Used on the classifier path by default.
pub struct NoOpOrientationCorrector;

impl OrientationCorrector for NoOpOrientationCorrector {
    fn correct(&self, _raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
        image
    }
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ═══════════════════════════════════════════════════════════
// Preprocessor
// ═══════════════════════════════════════════════════════════

/// Output of preprocessing: the resized RGB image and its tensor.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    /// Resized model-input image (target × target, RGB).
    pub image: RgbImage,
    /// `[1, target, target, 3]`, values in [0, 1].
    pub tensor: Array4<f32>,
    pub original_width: u32,
    pub original_height: u32,
}

/// Normalizes accepted uploads into the classifier's input tensor.
pub struct Preprocessor {
    orientation: Box<dyn OrientationCorrector>,
    config: ModelInputConfig,
}

impl Preprocessor {
    pub fn new(orientation: Box<dyn OrientationCorrector>, config: ModelInputConfig) -> Self {
        Self {
            orientation,
            config,
        }
    }

    /// Production preprocessor: pixels as stored, 150×150, cubic resize.
    pub fn standard() -> Self {
        Self::new(Box::new(NoOpOrientationCorrector), ModelInputConfig::default())
    }

    /// Like `standard`, but rotates raster uploads by their EXIF orientation.
    pub fn with_exif_orientation() -> Self {
        Self::new(Box::new(ExifOrientationCorrector), ModelInputConfig::default())
    }

    pub fn config(&self) -> &ModelInputConfig {
        &self.config
    }

    /// Pixels of an accepted upload, before resizing.
    pub fn load(&self, upload: &AcceptedUpload, raw_bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
        let image = match &upload.source {
            AcceptedSource::Dicom(dataset) => dataset.to_image()?,
            AcceptedSource::Raster(image) => self.orientation.correct(raw_bytes, image.clone()),
        };
        if image.width() == 0 || image.height() == 0 {
            return Err(PreprocessError::EmptyImage);
        }
        Ok(image)
    }

    /// Load and preprocess an accepted upload.
    pub fn prepare(&self, upload: &AcceptedUpload, raw_bytes: &[u8]) -> Result<PreparedInput, PreprocessError> {
        let image = self.load(upload, raw_bytes)?;
        self.prepare_image(&image)
    }

    /// RGB conversion, resize, scaling and batch dimension.
    pub fn prepare_image(&self, image: &DynamicImage) -> Result<PreparedInput, PreprocessError> {
        let (orig_w, orig_h) = (image.width(), image.height());
        if orig_w == 0 || orig_h == 0 {
            return Err(PreprocessError::EmptyImage);
        }

        let resized = self.resize(image);
        let tensor = image_to_tensor(&resized);

        debug!(
            original = format!("{orig_w}x{orig_h}"),
            output = format!("{}x{}", resized.width(), resized.height()),
            "Image preprocessed for classifier"
        );

        Ok(PreparedInput {
            image: resized,
            tensor,
            original_width: orig_w,
            original_height: orig_h,
        })
    }

    /// Force RGB and resize to the target square (aspect ratio not preserved).
    pub fn resize(&self, image: &DynamicImage) -> RgbImage {
        let target = self.config.target_size;
        let rgb = image.to_rgb8();
        if rgb.width() == target && rgb.height() == target {
            return rgb;
        }
        image::imageops::resize(&rgb, target, target, self.config.resize_filter.filter())
    }
}

/// Preprocess with the standard configuration.
pub fn preprocess(image: &DynamicImage) -> Result<Array4<f32>, PreprocessError> {
    Preprocessor::new(Box::new(NoOpOrientationCorrector), ModelInputConfig::default())
        .prepare_image(image)
        .map(|prepared| prepared.tensor)
}

// ═══════════════════════════════════════════════════════════
// Tensor helpers
// ═══════════════════════════════════════════════════════════

/// `[1, H, W, 3]` tensor of an RGB image, values scaled to [0, 1].
pub fn image_to_tensor(image: &RgbImage) -> Array4<f32> {
    images_to_batch(std::slice::from_ref(image))
}

/// Stack same-sized RGB images into an `[N, H, W, 3]` tensor.
pub fn images_to_batch(images: &[RgbImage]) -> Array4<f32> {
    let (w, h) = images
        .first()
        .map(|img| (img.width() as usize, img.height() as usize))
        .unwrap_or((0, 0));

    let mut batch = Array4::<f32>::zeros((images.len(), h, w, CHANNELS));
    for (mut slot, image) in batch.axis_iter_mut(Axis(0)).zip(images) {
        for (x, y, Rgb(px)) in image.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            if x >= w || y >= h {
                continue;
            }
            for (c, value) in px.iter().enumerate() {
                slot[[y, x, c]] = f32::from(*value) / 255.0;
            }
        }
    }
    batch
}

/// First image of a `[N, H, W, 3]` tensor back to 8-bit RGB.
pub fn tensor_to_image(tensor: ArrayView4<'_, f32>) -> Result<RgbImage, PreprocessError> {
    let shape = tensor.shape();
    if shape[0] == 0 || shape[3] != CHANNELS {
        return Err(PreprocessError::BadTensorShape {
            actual: shape.to_vec(),
            size: MODEL_INPUT_SIZE,
        });
    }
    let (h, w) = (shape[1], shape[2]);
    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let px = |c: usize| (tensor[[0, y as usize, x as usize, c]].clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgb([px(0), px(1), px(2)])
    }))
}

/// Check a batch tensor has the model's input shape.
pub fn check_input_shape(tensor: ArrayView4<'_, f32>, size: u32) -> Result<(), PreprocessError> {
    let shape = tensor.shape();
    let side = size as usize;
    if shape[1] != side || shape[2] != side || shape[3] != CHANNELS {
        return Err(PreprocessError::BadTensorShape {
            actual: shape.to_vec(),
            size,
        });
    }
    Ok(())
}

/// Encode an RGB image as PNG bytes.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, PreprocessError> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(cursor.into_inner())
}
