//! Tumor classifier: pure inference over the preprocessed tensor.
//!
//! The model artifact is loaded once at startup into an `Arc<dyn TumorModel>`
//! and injected into [`Classifier::new`]. The classifier owns no business
//! logic beyond mapping the output vector onto the fixed category order.

#[cfg(feature = "onnx-classifier")]
mod onnx;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{Array2, ArrayView3, ArrayView4, Axis};
use thiserror::Error;
use tracing::debug;

use crate::models::{PredictionResult, TumorCategory};

#[cfg(feature = "onnx-classifier")]
pub use onnx::OnnxTumorModel;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassificationError {
    #[error("Classifier model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Classifier model failed to load: {0}")]
    ModelLoad(String),

    #[error("No inference backend compiled in; rebuild with the `onnx-classifier` feature to load {0}")]
    BackendUnavailable(PathBuf),

    #[error("Invalid classifier input: {0}")]
    InvalidInput(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model returned {actual} scores per image, expected {expected}")]
    OutputLength { expected: usize, actual: usize },

    #[error("Model returned {actual} rows for a batch of {expected}")]
    BatchMismatch { expected: usize, actual: usize },

    #[error("Model returned a non-finite score")]
    NonFinite,
}

/// A loaded image classification model.
///
/// `predict` maps an `[N, H, W, 3]` batch to `[N, classes]` probabilities.
pub trait TumorModel: Send + Sync {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassificationError>;

    /// Short backend name for health reporting.
    fn backend(&self) -> &'static str;
}

/// Load the model artifact at `path`. Fatal at startup when it fails.
pub fn load_model(path: &Path) -> Result<Arc<dyn TumorModel>, ClassificationError> {
    if !path.exists() {
        return Err(ClassificationError::ModelNotFound(path.to_path_buf()));
    }
    load_backend(path)
}

#[cfg(feature = "onnx-classifier")]
fn load_backend(path: &Path) -> Result<Arc<dyn TumorModel>, ClassificationError> {
    Ok(Arc::new(OnnxTumorModel::load(path)?))
}

#[cfg(not(feature = "onnx-classifier"))]
fn load_backend(path: &Path) -> Result<Arc<dyn TumorModel>, ClassificationError> {
    Err(ClassificationError::BackendUnavailable(path.to_path_buf()))
}

// ═══════════════════════════════════════════════════════════
// Classifier
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct Classifier {
    model: Arc<dyn TumorModel>,
}

impl Classifier {
    pub fn new(model: Arc<dyn TumorModel>) -> Self {
        Self { model }
    }

    pub fn backend(&self) -> &'static str {
        self.model.backend()
    }

    /// Classify a single preprocessed image (`[1, H, W, 3]`).
    pub fn classify(&self, tensor: ArrayView4<'_, f32>) -> Result<PredictionResult, ClassificationError> {
        if tensor.len_of(Axis(0)) != 1 {
            return Err(ClassificationError::InvalidInput(format!(
                "expected a batch of one image, got {}",
                tensor.len_of(Axis(0))
            )));
        }
        let scores = self.predict_batch(tensor)?;
        let row = scores.row(0).to_vec();
        let prediction = top_prediction(&row)?;
        debug!(
            category = %prediction.category,
            confidence = prediction.confidence,
            "Classified image"
        );
        Ok(prediction)
    }

    /// Batch inference; every row is checked against the category count.
    pub fn predict_batch(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassificationError> {
        let n = batch.len_of(Axis(0));
        if n == 0 {
            return Err(ClassificationError::InvalidInput("empty batch".into()));
        }
        let scores = self.model.predict(batch)?;
        let (rows, cols) = scores.dim();
        if rows != n {
            return Err(ClassificationError::BatchMismatch {
                expected: n,
                actual: rows,
            });
        }
        if cols != TumorCategory::COUNT {
            return Err(ClassificationError::OutputLength {
                expected: TumorCategory::COUNT,
                actual: cols,
            });
        }
        if scores.iter().any(|v| !v.is_finite()) {
            return Err(ClassificationError::NonFinite);
        }
        Ok(scores)
    }
}

/// Argmax over a probability vector, mapped through the category order.
///
/// Ties resolve to the lowest index. Confidence is the maximum value.
pub fn top_prediction(scores: &[f32]) -> Result<PredictionResult, ClassificationError> {
    if scores.len() != TumorCategory::COUNT {
        return Err(ClassificationError::OutputLength {
            expected: TumorCategory::COUNT,
            actual: scores.len(),
        });
    }
    if scores.iter().any(|v| !v.is_finite()) {
        return Err(ClassificationError::NonFinite);
    }

    let mut best = 0;
    for (i, score) in scores.iter().enumerate().skip(1) {
        if *score > scores[best] {
            best = i;
        }
    }

    let category = TumorCategory::from_index(best).ok_or(ClassificationError::OutputLength {
        expected: TumorCategory::COUNT,
        actual: scores.len(),
    })?;
    Ok(PredictionResult {
        category,
        confidence: scores[best],
    })
}

// ═══════════════════════════════════════════════════════════
// Mock model
// ═══════════════════════════════════════════════════════════

type ScoreFn = dyn Fn(ArrayView3<'_, f32>) -> Vec<f32> + Send + Sync;

/// Mock model for tests. Scores each image with a closure.
pub struct MockTumorModel {
    score: Box<ScoreFn>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockTumorModel {
    /// Same probability vector for every image.
    pub fn fixed(scores: Vec<f32>) -> Self {
        Self::from_fn(move |_| scores.clone())
    }

    /// Per-image scoring closure over an `[H, W, 3]` view.
    pub fn from_fn<F>(score: F) -> Self
    where
        F: Fn(ArrayView3<'_, f32>) -> Vec<f32> + Send + Sync + 'static,
    {
        Self {
            score: Box::new(score),
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with an inference error.
    pub fn failing(message: &str) -> Self {
        let mut model = Self::fixed(Vec::new());
        model.failure = Some(message.to_string());
        model
    }

    /// Number of `predict` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TumorModel for MockTumorModel {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.failure {
            return Err(ClassificationError::Inference(message.clone()));
        }

        let rows: Vec<Vec<f32>> = batch.axis_iter(Axis(0)).map(|img| (self.score)(img)).collect();
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(ClassificationError::Inference("ragged mock output".into()));
        }
        Array2::from_shape_vec((rows.len(), cols), rows.concat())
            .map_err(|e| ClassificationError::Inference(e.to_string()))
    }

    fn backend(&self) -> &'static str {
        "mock"
    }
}
