//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.
//!
//! Layers (outermost → innermost):
//! 1. CORS → 2. Request body limit

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;
use crate::pipeline::validation::MAX_UPLOAD_BYTES;

/// Body limit: largest upload plus multipart overhead.
const BODY_LIMIT_BYTES: usize = MAX_UPLOAD_BYTES + 1024 * 1024;

/// Build the API router.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/uploads/validate", post(endpoints::uploads::validate))
        .route("/diagnosis", post(endpoints::diagnosis::run))
        .route("/symptoms", get(endpoints::symptoms::catalog))
        .route("/symptoms/score", post(endpoints::symptoms::score))
        .route("/chat", post(endpoints::chat::send))
        .route("/chat/suggestions", get(endpoints::chat::suggestions))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
pub(crate) fn api_router_with_ctx(ctx: ApiContext) -> Router {
    build_router(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use base64::Engine;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::api::types::test_fixtures::{
        body_json, context, get_request, glioma_context, json_request, multipart_request,
    };
    use crate::chat::CHAT_FAILURE_REPLY;
    use crate::llm::{LlmError, MockChatBackend};
    use crate::pipeline::classify::MockTumorModel;
    use crate::pipeline::validation::dicom::test_support::{mr_slice, DicomBuilder};
    use crate::pipeline::validation::test_images::{jpeg, png};

    fn app() -> Router {
        api_router_with_ctx(glioma_context())
    }

    // ── Health ──

    #[tokio::test]
    async fn health_reports_backend_and_disclaimer() {
        let response = app().oneshot(get_request("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["classifier_backend"], "mock");
        assert_eq!(json["assistant"], "mock");
        assert_eq!(json["disclaimer"], crate::config::DISCLAIMER);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let response = app().oneshot(get_request("/api/nonexistent")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // ── Upload validation ──

    #[tokio::test]
    async fn validate_accepts_jpeg() {
        let req = multipart_request("/api/uploads/validate", "file", "scan.jpg", &jpeg(20, 20));
        let json = body_json(app().oneshot(req).await.unwrap()).await;
        assert_eq!(json["accepted"], true);
        assert_eq!(json["kind"], "raster");
        assert_eq!(json["sniffed"], "jpeg");
    }

    #[tokio::test]
    async fn validate_accepts_mr_dicom() {
        let req = multipart_request("/api/uploads/validate", "file", "slice.dcm", &mr_slice());
        let json = body_json(app().oneshot(req).await.unwrap()).await;
        assert_eq!(json["accepted"], true);
        assert_eq!(json["kind"], "dicom");
    }

    #[tokio::test]
    async fn validate_rejects_with_reason() {
        let ct = DicomBuilder::new().modality("CT").gray8(4, 4, &[0; 16]).build();
        let req = multipart_request("/api/uploads/validate", "file", "slice.dcm", &ct);
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["accepted"], false);
        assert_eq!(json["code"], "WRONG_MODALITY");

        let req = multipart_request("/api/uploads/validate", "file", "notes.txt", b"hello");
        let json = body_json(app().oneshot(req).await.unwrap()).await;
        assert_eq!(json["code"], "UNSUPPORTED_EXTENSION");
    }

    #[tokio::test]
    async fn missing_file_field_is_bad_request() {
        let req = multipart_request("/api/uploads/validate", "image", "scan.png", &png(4, 4));
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ── Diagnosis ──

    #[tokio::test]
    async fn diagnosis_returns_prediction_overlay_and_information() {
        let req = multipart_request("/api/diagnosis", "file", "scan.png", &png(60, 40));
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;

        assert_eq!(json["prediction"]["category"], "glioma");
        assert_eq!(json["prediction"]["confidence_percent"], "82.00%");
        assert_eq!(json["original_width"], 60);
        assert_eq!(json["explanation"]["width"], 150);
        assert_eq!(
            json["tumor_information"],
            "A glioma is a tumor of glial cells. It can occur in the brain."
        );
        assert_eq!(json["speech"]["status"], "spoken");

        let overlay = base64::engine::general_purpose::STANDARD
            .decode(json["explanation"]["overlay_png_base64"].as_str().unwrap())
            .unwrap();
        assert_eq!(&overlay[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[tokio::test]
    async fn diagnosis_rejects_undecodable_upload() {
        let req = multipart_request("/api/diagnosis", "file", "scan.png", b"definitely not a png");
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"]["code"], "UNDECODABLE_IMAGE");
    }

    #[tokio::test]
    async fn diagnosis_reports_inference_failure() {
        let ctx = context(MockTumorModel::failing("boom"), MockChatBackend::new("ok"));
        let req = multipart_request("/api/diagnosis", "file", "scan.png", &png(10, 10));
        let response = api_router_with_ctx(ctx).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"]["code"], "INFERENCE_FAILED");
    }

    // ── Symptoms ──

    #[tokio::test]
    async fn symptoms_catalog_lists_checklist() {
        let json = body_json(app().oneshot(get_request("/api/symptoms")).await.unwrap()).await;
        assert_eq!(json["checklist"][0], "Headaches");
        assert_eq!(json["conditions"].as_array().unwrap().len(), 4);
        assert_eq!(json["conditions"][3]["condition"], "Pituitary Tumor");
    }

    #[tokio::test]
    async fn score_headaches_and_seizures_is_ambiguous() {
        let req = json_request(
            "POST",
            "/api/symptoms/score",
            json!({ "symptoms": ["Headaches", "Seizures"] }),
        );
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["signal"]["kind"], "ambiguous");
        assert_eq!(json["scores"][0]["formatted"], "28.57%");
        assert_eq!(json["selected"], json!(["Headaches", "Seizures"]));
        assert!(json["guidance"].as_str().unwrap().contains("consult a doctor"));
    }

    #[tokio::test]
    async fn score_rejects_empty_and_unknown_selections() {
        let req = json_request("POST", "/api/symptoms/score", json!({ "symptoms": [] }));
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "NO_SYMPTOMS_SELECTED");

        let req = json_request("POST", "/api/symptoms/score", json!({ "symptoms": ["Sneezing"] }));
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(body_json(response).await["error"]["code"], "UNKNOWN_SYMPTOM");
    }

    // ── Chat ──

    #[tokio::test]
    async fn chat_round_trips_session() {
        let req = json_request("POST", "/api/chat", json!({ "message": "What precautions?" }));
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first = body_json(response).await;
        assert_eq!(first["failed"], false);
        assert_eq!(first["session"]["title"], "What precautions?");
        assert_eq!(first["transcript"][1]["role"], "assistant");

        let req = json_request(
            "POST",
            "/api/chat",
            json!({ "session": first["session"], "message": "And diet?" }),
        );
        let second = body_json(app().oneshot(req).await.unwrap()).await;
        assert_eq!(second["session"]["messages"].as_array().unwrap().len(), 4);
        assert_eq!(second["session"]["id"], first["session"]["id"]);
    }

    #[tokio::test]
    async fn chat_failure_returns_apology() {
        let ctx = context(
            MockTumorModel::fixed(vec![0.25; 4]),
            MockChatBackend::failing(LlmError::Connection("http://gemini".into())),
        );
        let req = json_request("POST", "/api/chat", json!({ "message": "hello" }));
        let json = body_json(api_router_with_ctx(ctx).oneshot(req).await.unwrap()).await;
        assert_eq!(json["failed"], true);
        assert_eq!(json["reply"], CHAT_FAILURE_REPLY);
        assert!(json["session"]["messages"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_rejects_empty_message() {
        let req = json_request("POST", "/api/chat", json!({ "message": "   " }));
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn suggestions_are_listed() {
        let json = body_json(app().oneshot(get_request("/api/chat/suggestions")).await.unwrap()).await;
        assert_eq!(json["suggestions"].as_array().unwrap().len(), 6);
        assert_eq!(json["placeholder"], crate::chat::CHAT_INPUT_PLACEHOLDER);
    }

    // ── Layers ──

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let req = axum::http::Request::builder()
            .method("OPTIONS")
            .uri("/api/symptoms/score")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app().oneshot(req).await.unwrap();
        assert!(response.headers().contains_key("access-control-allow-origin"));
    }
}
