use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, ArrayView4};
use ort::session::Session;

use super::{ClassificationError, TumorModel};

/// Keras-exported CNN run through ONNX Runtime.
///
/// Input: `[N, 150, 150, 3]` float32 (NHWC, values in [0, 1]).
/// Output: `[N, 4]` softmax probabilities in category order.
///
/// Uses interior mutability (Mutex) because ort::Session::run requires `&mut self`
/// but the TumorModel trait exposes `&self` for shared usage across requests.
pub struct OnnxTumorModel {
    session: Mutex<Session>,
}

impl OnnxTumorModel {
    pub fn load(model_path: &Path) -> Result<Self, ClassificationError> {
        if !model_path.exists() {
            return Err(ClassificationError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e: ort::Error| ClassificationError::ModelLoad(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e: ort::Error| ClassificationError::ModelLoad(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e: ort::Error| ClassificationError::ModelLoad(format!("ONNX load failed: {e}")))?;

        tracing::info!("ONNX tumor classifier loaded from {}", model_path.display());

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl TumorModel for OnnxTumorModel {
    fn predict(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, ClassificationError> {
        use ort::value::TensorRef;

        let n = batch.shape()[0];
        // Runtime needs contiguous row-major data.
        let input = batch.to_owned();
        let input_tensor = TensorRef::from_array_view(&input)
            .map_err(|e| ClassificationError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassificationError::Inference("Session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| ClassificationError::Inference(format!("ONNX inference failed: {e}")))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassificationError::Inference(format!("Output extraction: {e}")))?;

        if shape.len() != 2 {
            return Err(ClassificationError::Inference(format!(
                "Unexpected output shape: {shape:?}, expected [{n}, classes]"
            )));
        }
        let rows = shape[0] as usize;
        let cols = shape[1] as usize;

        Array2::from_shape_vec((rows, cols), data.to_vec())
            .map_err(|e| ClassificationError::Inference(e.to_string()))
    }

    fn backend(&self) -> &'static str {
        "onnx"
    }
}
