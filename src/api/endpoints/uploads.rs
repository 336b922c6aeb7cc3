//! Upload validation endpoint.
//!
//! `POST /api/uploads/validate`: runs only the validator, so the front-end
//! can reject a file before asking for a full diagnosis.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{read_upload, ApiContext};
use crate::pipeline::validation::{SniffedFormat, UploadKind};

#[derive(Serialize)]
pub struct ValidateResponse {
    pub file_name: String,
    pub accepted: bool,
    pub kind: Option<UploadKind>,
    pub sniffed: Option<SniffedFormat>,
    /// Rejection code, absent when accepted.
    pub code: Option<&'static str>,
    pub reason: Option<String>,
}

/// `POST /api/uploads/validate`: multipart `file`.
///
/// A rejection is a normal answer here (200 with `accepted: false`).
pub async fn validate(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<ValidateResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let core = ctx.core.clone();
    let (bytes, extension) = (upload.bytes, upload.extension);

    let result = tokio::task::spawn_blocking(move || {
        core.pipeline.validator().check(&bytes, &extension)
    })
    .await?;

    let response = match result {
        Ok(accepted) => ValidateResponse {
            file_name: upload.file_name,
            accepted: true,
            kind: Some(accepted.kind()),
            sniffed: Some(accepted.sniffed),
            code: None,
            reason: None,
        },
        Err(e) => ValidateResponse {
            file_name: upload.file_name,
            accepted: false,
            kind: None,
            sniffed: None,
            code: Some(e.code()),
            reason: Some(e.to_string()),
        },
    };
    Ok(Json(response))
}
