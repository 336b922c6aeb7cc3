//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::config;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub app: &'static str,
    pub version: &'static str,
    pub classifier_backend: &'static str,
    pub assistant: &'static str,
    pub uptime_secs: u64,
    pub disclaimer: &'static str,
}

/// `GET /api/health`
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: config::APP_NAME,
        version: config::APP_VERSION,
        classifier_backend: ctx.core.pipeline.classifier().backend(),
        assistant: ctx.core.chat.name(),
        uptime_secs: ctx.core.uptime_secs(),
        disclaimer: config::DISCLAIMER,
    })
}
