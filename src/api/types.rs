//! Shared types for the HTTP layer.

use std::path::Path;
use std::sync::Arc;

use axum::extract::Multipart;

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::pipeline::validation::format::sanitize_filename;

/// Multipart field carrying the uploaded scan.
pub const UPLOAD_FIELD: &str = "file";

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

// ═══════════════════════════════════════════════════════════
// Uploads
// ═══════════════════════════════════════════════════════════

/// A file received through the `file` multipart field.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    /// Declared extension, as typed by the user (may be empty).
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Read the `file` field of a multipart body. Other fields are ignored.
pub async fn read_upload(mut multipart: Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = sanitize_filename(field.file_name().unwrap_or("upload"));
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
        let extension = declared_extension(&file_name);

        tracing::debug!(file_name, extension, size = bytes.len(), "Upload received");
        return Ok(UploadedFile {
            file_name,
            extension,
            bytes: bytes.to_vec(),
        });
    }
    Err(ApiError::BadRequest(format!(
        "Missing multipart field '{UPLOAD_FIELD}'"
    )))
}

fn declared_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string()
}

// ═══════════════════════════════════════════════════════════
// Test fixtures
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod test_fixtures {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;

    use super::ApiContext;
    use crate::config::AppConfig;
    use crate::core_state::CoreState;
    use crate::llm::MockChatBackend;
    use crate::pipeline::classify::{Classifier, MockTumorModel};
    use crate::pipeline::diagnostic::DiagnosticDump;
    use crate::pipeline::explain::{ExplainConfig, LimeExplainer};
    use crate::pipeline::orchestrator::DiagnosisPipeline;
    use crate::pipeline::preprocess::Preprocessor;
    use crate::reference::{MockEncyclopedia, RecordingSpeech};

    pub const BOUNDARY: &str = "brainscan-test-boundary";

    /// Context backed by mocks: fixed classifier scores, canned lookup text.
    pub fn context(model: MockTumorModel, chat: MockChatBackend) -> ApiContext {
        let explainer = LimeExplainer::new(ExplainConfig {
            num_samples: 20,
            seed: Some(11),
            ..ExplainConfig::default()
        })
        .unwrap();
        let pipeline = DiagnosisPipeline::new(
            Preprocessor::standard(),
            Classifier::new(Arc::new(model)),
            Box::new(explainer),
            Arc::new(MockEncyclopedia::new(
                "A glioma is a tumor of glial cells. It can occur in the brain. Third sentence.",
            )),
            Arc::new(RecordingSpeech::new()),
            DiagnosticDump::disabled(),
        );
        let core = CoreState::new(AppConfig::default(), pipeline, Arc::new(chat));
        ApiContext::new(Arc::new(core))
    }

    pub fn glioma_context() -> ApiContext {
        context(
            MockTumorModel::fixed(vec![0.82, 0.08, 0.06, 0.04]),
            MockChatBackend::new("Stay hydrated and follow up with your doctor."),
        )
    }

    /// Multipart request with one file field.
    pub fn multipart_request(uri: &str, field: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    pub fn json_request(method: &str, uri: &str, json: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    pub fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
        use http_body_util::BodyExt;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}
