//! Symptom checklist endpoints.
//!
//! - `GET /api/symptoms`: checklist and per-condition table
//! - `POST /api/symptoms/score`: score a selection

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::Condition;
use crate::symptoms::{self, ScoreSignal, Symptom};

#[derive(Serialize)]
pub struct ConditionSymptoms {
    pub condition: Condition,
    pub symptoms: Vec<Symptom>,
}

#[derive(Serialize)]
pub struct CatalogResponse {
    /// Each symptom once, first-appearance order.
    pub checklist: Vec<Symptom>,
    pub conditions: Vec<ConditionSymptoms>,
}

/// `GET /api/symptoms`
pub async fn catalog(State(ctx): State<ApiContext>) -> Json<CatalogResponse> {
    let catalog = ctx.core.catalog;
    Json(CatalogResponse {
        checklist: catalog.checklist(),
        conditions: catalog
            .entries()
            .iter()
            .map(|(condition, symptoms)| ConditionSymptoms {
                condition: *condition,
                symptoms: symptoms.clone(),
            })
            .collect(),
    })
}

#[derive(Deserialize)]
pub struct ScoreRequest {
    #[serde(default)]
    pub symptoms: Vec<String>,
}

#[derive(Serialize)]
pub struct ScoreView {
    pub condition: Condition,
    pub matched: usize,
    pub total: usize,
    pub percentage: f64,
    /// "28.57%"
    pub formatted: String,
}

#[derive(Serialize)]
pub struct ScoreResponse {
    pub selected: Vec<Symptom>,
    pub scores: Vec<ScoreView>,
    pub signal: ScoreSignal,
    pub guidance: Option<&'static str>,
}

/// `POST /api/symptoms/score`
pub async fn score(
    State(ctx): State<ApiContext>,
    Json(req): Json<ScoreRequest>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let result = symptoms::score_labels(ctx.core.catalog, &req.symptoms)?;

    Ok(Json(ScoreResponse {
        guidance: result.signal.guidance(),
        scores: result
            .scores
            .iter()
            .map(|s| ScoreView {
                condition: s.condition,
                matched: s.matched,
                total: s.total,
                percentage: s.percentage,
                formatted: s.formatted(),
            })
            .collect(),
        selected: result.selected,
        signal: result.signal,
    }))
}
