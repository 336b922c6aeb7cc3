//! Conversational assistant backends.
//!
//! The assistant is stateless: every call receives the full conversation
//! history plus the new user message and returns the model's reply.

pub mod gemini;
pub mod ollama;

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::config::{AppConfig, AssistantProvider};
use crate::models::ChatMessage;

pub use gemini::GeminiClient;
pub use ollama::OllamaChatClient;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Assistant is not configured: {0}")]
    NotConfigured(String),

    #[error("Cannot connect to assistant at {0}")]
    Connection(String),

    #[error("Assistant request timed out after {0}s")]
    Timeout(u64),

    #[error("Assistant returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Assistant blocked the prompt: {0}")]
    Blocked(String),

    #[error("Assistant returned an empty reply")]
    EmptyResponse,

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed assistant response: {0}")]
    ResponseParsing(String),
}

/// A chat model that answers the next user turn.
pub trait ChatBackend: Send + Sync {
    /// Reply to `message` given the prior `history` (oldest first).
    fn reply(&self, history: &[ChatMessage], message: &str) -> Result<String, LlmError>;

    /// Provider name for health reporting.
    fn name(&self) -> &'static str;
}

/// Map a reqwest send error onto the assistant error taxonomy.
pub(crate) fn map_send_error(e: reqwest::Error, base_url: &str, timeout_secs: u64) -> LlmError {
    if e.is_connect() {
        LlmError::Connection(base_url.to_string())
    } else if e.is_timeout() {
        LlmError::Timeout(timeout_secs)
    } else {
        LlmError::HttpClient(e.to_string())
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, LlmError> {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LlmError::HttpClient(e.to_string()))
}

/// Backend selected by configuration.
///
/// A missing API key or a client build failure yields an
/// [`UnconfiguredBackend`]: the chat then answers with the apology text
/// instead of blocking startup.
pub fn backend_from_config(config: &AppConfig) -> Arc<dyn ChatBackend> {
    let built: Result<Arc<dyn ChatBackend>, LlmError> = match config.assistant {
        AssistantProvider::Gemini => match config.google_api_key.as_deref() {
            Some(key) => GeminiClient::new(key, &config.gemini_model, config.http_timeout_secs)
                .map(|c| Arc::new(c) as Arc<dyn ChatBackend>),
            None => Err(LlmError::NotConfigured("GOOGLE_API_KEY is not set".into())),
        },
        AssistantProvider::Ollama => OllamaChatClient::new(
            &config.ollama_host,
            &config.ollama_model,
            config.http_timeout_secs,
        )
        .map(|c| Arc::new(c) as Arc<dyn ChatBackend>),
    };

    match built {
        Ok(backend) => {
            tracing::info!(provider = backend.name(), "Assistant backend ready");
            backend
        }
        Err(e) => {
            tracing::warn!(error = %e, "Assistant unavailable, chat will return fallback replies");
            Arc::new(UnconfiguredBackend::new(&e.to_string()))
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Unconfigured + mock backends
// ═══════════════════════════════════════════════════════════

/// Always fails with `NotConfigured`.
pub struct UnconfiguredBackend {
    reason: String,
}

impl UnconfiguredBackend {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

impl ChatBackend for UnconfiguredBackend {
    fn reply(&self, _history: &[ChatMessage], _message: &str) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured(self.reason.clone()))
    }

    fn name(&self) -> &'static str {
        "unconfigured"
    }
}

/// Mock backend for testing: fixed reply, records history sizes.
pub struct MockChatBackend {
    outcome: Result<String, LlmError>,
    seen_history: Mutex<Vec<usize>>,
}

impl MockChatBackend {
    pub fn new(reply: &str) -> Self {
        Self {
            outcome: Ok(reply.to_string()),
            seen_history: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: LlmError) -> Self {
        Self {
            outcome: Err(error),
            seen_history: Mutex::new(Vec::new()),
        }
    }

    /// History length passed to each `reply` call.
    pub fn seen_history(&self) -> Vec<usize> {
        self.seen_history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl ChatBackend for MockChatBackend {
    fn reply(&self, history: &[ChatMessage], _message: &str) -> Result<String, LlmError> {
        if let Ok(mut seen) = self.seen_history.lock() {
            seen.push(history.len());
        }
        self.outcome.clone()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
