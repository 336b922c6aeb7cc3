//! Full diagnosis endpoint.
//!
//! `POST /api/diagnosis`: multipart `file` → prediction, overlay,
//! condition summary and speech status. Images travel as base64 PNG.

use axum::extract::{Multipart, State};
use axum::Json;
use base64::Engine;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{read_upload, ApiContext};
use crate::config;
use crate::models::{PredictionResult, TumorCategory};
use crate::pipeline::explain::ExplanationOverlay;
use crate::pipeline::orchestrator::DiagnosisReport;
use crate::pipeline::preprocess::encode_png;
use crate::pipeline::validation::UploadKind;
use crate::reference::SpeechStatus;

#[derive(Serialize)]
pub struct PredictionView {
    pub category: TumorCategory,
    pub confidence: f32,
    /// "87.50%"
    pub confidence_percent: String,
}

impl From<PredictionResult> for PredictionView {
    fn from(p: PredictionResult) -> Self {
        Self {
            category: p.category,
            confidence: p.confidence,
            confidence_percent: p.confidence_percent(),
        }
    }
}

#[derive(Serialize)]
pub struct ExplanationView {
    pub category: TumorCategory,
    pub overlay_png_base64: String,
    pub width: u32,
    pub height: u32,
    pub selected_segments: Vec<usize>,
    pub num_segments: usize,
    pub highlighted_fraction: f64,
    pub score: f64,
}

#[derive(Serialize)]
pub struct DiagnosisResponse {
    pub request_id: String,
    pub file_name: String,
    pub upload_kind: UploadKind,
    pub original_width: u32,
    pub original_height: u32,
    pub image_png_base64: String,
    pub prediction: PredictionView,
    pub explanation: Option<ExplanationView>,
    pub explanation_error: Option<String>,
    pub tumor_information: String,
    pub speech: SpeechStatus,
    pub disclaimer: &'static str,
}

/// `POST /api/diagnosis`: run the full pipeline on one upload.
pub async fn run(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<DiagnosisResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let core = ctx.core.clone();
    let (bytes, extension) = (upload.bytes, upload.extension);

    let report = tokio::task::spawn_blocking(move || core.pipeline.run(&bytes, &extension)).await??;

    Ok(Json(build_response(upload.file_name, report)?))
}

fn to_base64(png: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(png)
}

fn explanation_view(overlay: &ExplanationOverlay) -> Result<ExplanationView, ApiError> {
    let png = overlay
        .to_png()
        .map_err(|e| ApiError::Internal(format!("overlay encoding: {e}")))?;
    Ok(ExplanationView {
        category: overlay.category,
        overlay_png_base64: to_base64(&png),
        width: overlay.width(),
        height: overlay.height(),
        selected_segments: overlay.selected_segments.clone(),
        num_segments: overlay.num_segments,
        highlighted_fraction: overlay.highlighted_fraction(),
        score: overlay.score,
    })
}

fn build_response(file_name: String, report: DiagnosisReport) -> Result<DiagnosisResponse, ApiError> {
    let image_png = encode_png(&report.preprocessed)
        .map_err(|e| ApiError::Internal(format!("image encoding: {e}")))?;
    let explanation = report.explanation.as_ref().map(explanation_view).transpose()?;

    Ok(DiagnosisResponse {
        request_id: report.request_id.to_string(),
        file_name,
        upload_kind: report.upload_kind,
        original_width: report.original_width,
        original_height: report.original_height,
        image_png_base64: to_base64(&image_png),
        prediction: report.prediction.into(),
        explanation,
        explanation_error: report.explanation_error,
        tumor_information: report.tumor_information,
        speech: report.speech,
        disclaimer: config::DISCLAIMER,
    })
}
