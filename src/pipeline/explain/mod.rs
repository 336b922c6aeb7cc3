//! Perturbation-based local explanation of a classification.
//!
//! The image is split into superpixels, random subsets of them are blacked
//! out, and every perturbed copy is classified. A weighted linear surrogate
//! fitted on "segment shown" indicators tells which segments pushed the
//! predicted category's probability up; the strongest ones are highlighted.
//!
//! Pipeline flow:
//! 1. `segmentation::slic()`: superpixels over the model-input image
//! 2. Sample binary on/off vectors (sample 0 = everything shown)
//! 3. Classify perturbed images in batches, keep the target class probability
//! 4. Weight samples by cosine distance to sample 0 (exponential kernel)
//! 5. `surrogate::weighted_ridge()`: per-segment weights
//! 6. `render::render_overlay()`: tint + outline the top positive segments

pub mod render;
pub mod segmentation;
pub mod surrogate;

use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::classify::{top_prediction, ClassificationError, Classifier};
use super::preprocess::{encode_png, images_to_batch, PreprocessError};
use crate::config::ExplainerSettings;
use crate::models::TumorCategory;

pub use segmentation::Segmentation;

/// Kernel width of the sample weighting.
pub const KERNEL_WIDTH: f64 = 0.25;
/// Ridge penalty of the surrogate.
pub const RIDGE_ALPHA: f64 = 1.0;
/// Surrogate weights at or below this are rounding noise, never highlighted.
const MIN_HIGHLIGHT_WEIGHT: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExplanationError {
    #[error("Invalid explainer configuration: {0}")]
    InvalidConfig(String),

    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    #[error("Classifying perturbed images failed: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Surrogate fit failed: {0}")]
    Regression(String),

    #[error("Overlay rendering failed: {0}")]
    Render(String),
}

impl From<PreprocessError> for ExplanationError {
    fn from(e: PreprocessError) -> Self {
        Self::Render(e.to_string())
    }
}

// ═══════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct ExplainConfig {
    /// Perturbed samples classified per explanation.
    pub num_samples: usize,
    /// Maximum segments highlighted.
    pub num_features: usize,
    /// Black out everything but the highlighted segments.
    pub hide_rest: bool,
    /// Requested superpixel count (approximate).
    pub num_segments: usize,
    pub compactness: f32,
    /// Perturbed images per classifier call.
    pub batch_size: usize,
    /// Fill of switched-off segments.
    pub hide_color: [u8; 3],
    /// Fixed seed for reproducible sampling; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            num_samples: 1000,
            num_features: 5,
            hide_rest: false,
            num_segments: 50,
            compactness: 10.0,
            batch_size: 10,
            hide_color: [0, 0, 0],
            seed: None,
        }
    }
}

impl ExplainConfig {
    pub fn from_settings(settings: &ExplainerSettings) -> Self {
        Self {
            num_samples: settings.num_samples,
            num_features: settings.num_features,
            hide_rest: settings.hide_rest,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), ExplanationError> {
        if self.num_samples == 0 {
            return Err(ExplanationError::InvalidConfig("num_samples must be at least 1".into()));
        }
        if self.num_segments == 0 {
            return Err(ExplanationError::InvalidConfig("num_segments must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ExplanationError::InvalidConfig("batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Result types
// ═══════════════════════════════════════════════════════════

/// Surrogate weight of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentWeight {
    pub segment: usize,
    pub weight: f64,
}

/// Visual explanation of one prediction.
#[derive(Debug, Clone)]
pub struct ExplanationOverlay {
    /// Category the explanation is for (prediction on the unperturbed image).
    pub category: TumorCategory,
    /// Rendered overlay, same size as the model-input image.
    pub image: RgbImage,
    /// Row-major pixel mask of the highlighted segments.
    pub mask: Vec<bool>,
    /// All segment weights, strongest first.
    pub segment_weights: Vec<SegmentWeight>,
    /// Highlighted segments, strongest first.
    pub selected_segments: Vec<usize>,
    pub intercept: f64,
    /// Weighted R² of the surrogate.
    pub score: f64,
    pub num_segments: usize,
}

impl ExplanationOverlay {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Share of pixels inside the highlighted mask.
    pub fn highlighted_fraction(&self) -> f64 {
        if self.mask.is_empty() {
            return 0.0;
        }
        self.mask.iter().filter(|m| **m).count() as f64 / self.mask.len() as f64
    }

    pub fn to_png(&self) -> Result<Vec<u8>, ExplanationError> {
        Ok(encode_png(&self.image)?)
    }
}

// ═══════════════════════════════════════════════════════════
// Explainer
// ═══════════════════════════════════════════════════════════

/// Explains a classifier decision on a model-input image.
pub trait Explainer: Send + Sync {
    fn explain(&self, image: &RgbImage, classifier: &Classifier) -> Result<ExplanationOverlay, ExplanationError>;
}

/// LIME-style image explainer.
pub struct LimeExplainer {
    config: ExplainConfig,
}

impl LimeExplainer {
    pub fn new(config: ExplainConfig) -> Result<Self, ExplanationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExplainConfig {
        &self.config
    }

    fn sample_masks(&self, segments: usize) -> Vec<Vec<bool>> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut rows = Vec::with_capacity(self.config.num_samples);
        rows.push(vec![true; segments]);
        for _ in 1..self.config.num_samples {
            rows.push((0..segments).map(|_| rng.gen_bool(0.5)).collect());
        }
        rows
    }

    fn perturb(&self, image: &RgbImage, segmentation: &Segmentation, shown: &[bool]) -> RgbImage {
        let mut out = image.clone();
        let hide = image::Rgb(self.config.hide_color);
        for (x, y, px) in out.enumerate_pixels_mut() {
            if !shown[segmentation.label(x, y)] {
                *px = hide;
            }
        }
        out
    }

    /// Target-class probability of every sample, plus the target itself.
    fn classify_samples(
        &self,
        image: &RgbImage,
        segmentation: &Segmentation,
        samples: &[Vec<bool>],
        classifier: &Classifier,
    ) -> Result<(TumorCategory, Vec<f64>), ExplanationError> {
        let mut target: Option<TumorCategory> = None;
        let mut probabilities = Vec::with_capacity(samples.len());

        for chunk in samples.chunks(self.config.batch_size) {
            let images: Vec<RgbImage> = chunk
                .iter()
                .map(|shown| self.perturb(image, segmentation, shown))
                .collect();
            let batch = images_to_batch(&images);
            let scores = classifier.predict_batch(batch.view())?;

            let category = match target {
                Some(category) => category,
                None => {
                    let first = scores.row(0).to_vec();
                    let category = top_prediction(&first)?.category;
                    target = Some(category);
                    category
                }
            };
            probabilities.extend(scores.column(category.index()).iter().map(|p| f64::from(*p)));
        }

        let target = target.ok_or_else(|| ExplanationError::InvalidConfig("no samples classified".into()))?;
        Ok((target, probabilities))
    }
}

impl Explainer for LimeExplainer {
    fn explain(&self, image: &RgbImage, classifier: &Classifier) -> Result<ExplanationOverlay, ExplanationError> {
        let segmentation = segmentation::slic(image, self.config.num_segments, self.config.compactness)?;
        let segments = segmentation.count();

        let samples = self.sample_masks(segments);
        let (category, probabilities) = self.classify_samples(image, &segmentation, &samples, classifier)?;

        let distances = surrogate::cosine_distances_to_all_on(&samples);
        let weights = surrogate::exponential_kernel(&distances, KERNEL_WIDTH);
        let features: Vec<Vec<f64>> = samples
            .iter()
            .map(|row| row.iter().map(|on| if *on { 1.0 } else { 0.0 }).collect())
            .collect();
        let fit = surrogate::weighted_ridge(&features, &probabilities, &weights, RIDGE_ALPHA)?;

        let mut segment_weights: Vec<SegmentWeight> = fit
            .coefficients
            .iter()
            .enumerate()
            .map(|(segment, weight)| SegmentWeight {
                segment,
                weight: *weight,
            })
            .collect();
        segment_weights.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        let selected_segments: Vec<usize> = segment_weights
            .iter()
            .filter(|w| w.weight > MIN_HIGHLIGHT_WEIGHT)
            .take(self.config.num_features)
            .map(|w| w.segment)
            .collect();

        let mask = render::selection_mask(&segmentation, &selected_segments);
        let overlay = render::render_overlay(image, &mask, self.config.hide_rest, self.config.hide_color);

        debug!(
            category = %category,
            segments,
            samples = samples.len(),
            selected = selected_segments.len(),
            score = fit.score,
            "Explanation computed"
        );

        Ok(ExplanationOverlay {
            category,
            image: overlay,
            mask,
            segment_weights,
            selected_segments,
            intercept: fit.intercept,
            score: fit.score,
            num_segments: segments,
        })
    }
}
