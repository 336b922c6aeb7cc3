use serde::{Deserialize, Serialize};

use super::{http_client, map_send_error, ChatBackend, LlmError};
use crate::models::ChatMessage;

/// Ollama HTTP client (`/api/chat`, non-streaming).
pub struct OllamaChatClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaChatClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        if model.trim().is_empty() {
            return Err(LlmError::NotConfigured("empty Ollama model name".into()));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: http_client(timeout_secs)?,
            timeout_secs,
        })
    }
}

/// Request body for /api/chat
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from /api/chat
#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl ChatBackend for OllamaChatClient {
    fn reply(&self, history: &[ChatMessage], message: &str) -> Result<String, LlmError> {
        // Ollama speaks OpenAI-style roles: "model" turns go out as "assistant".
        let messages = history
            .iter()
            .map(|m| OllamaMessage {
                role: m.role.display_role(),
                content: &m.content,
            })
            .chain(std::iter::once(OllamaMessage {
                role: "user",
                content: message,
            }))
            .collect();

        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .map_err(|e| map_send_error(e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        let content = parsed.message.map(|m| m.content).unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
