use serde::{Deserialize, Serialize};

use super::enums::TumorCategory;

/// Outcome of one classification call.
///
/// `confidence` is the largest value of the model's probability vector,
/// i.e. the probability assigned to `category`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub category: TumorCategory,
    pub confidence: f32,
}

impl PredictionResult {
    /// Confidence as a percentage rounded to two decimals, for display.
    pub fn confidence_percent(&self) -> String {
        format!("{:.2}%", self.confidence * 100.0)
    }
}
