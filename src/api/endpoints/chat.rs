//! Chat endpoints.
//!
//! - `POST /api/chat`: one turn; the client sends its session and gets it back updated
//! - `GET /api/chat/suggestions`: starter prompts for an empty conversation

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::chat::{self, PromptSuggestion, TranscriptEntry};
use crate::models::ConversationSession;

/// Longest accepted chat message, in characters.
const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Deserialize)]
pub struct ChatRequest {
    /// Absent on the first turn.
    pub session: Option<ConversationSession>,
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub session: ConversationSession,
    pub reply: String,
    pub failed: bool,
    pub transcript: Vec<TranscriptEntry>,
}

/// `POST /api/chat`
pub async fn send(
    State(ctx): State<ApiContext>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Message too long (max {MAX_MESSAGE_CHARS} chars)"
        )));
    }

    let backend = ctx.core.chat.clone();
    let session = req.session.unwrap_or_default();
    let message = req.message;

    let turn = tokio::task::spawn_blocking(move || {
        chat::send_chat_turn(backend.as_ref(), session, &message)
    })
    .await??;

    Ok(Json(ChatResponse {
        transcript: chat::transcript(&turn.session),
        session: turn.session,
        reply: turn.reply,
        failed: turn.failed,
    }))
}

#[derive(Serialize)]
pub struct SuggestionsResponse {
    pub placeholder: &'static str,
    pub suggestions: Vec<PromptSuggestion>,
}

/// `GET /api/chat/suggestions`
pub async fn suggestions() -> Json<SuggestionsResponse> {
    Json(SuggestionsResponse {
        placeholder: chat::CHAT_INPUT_PLACEHOLDER,
        suggestions: chat::default_prompt_suggestions(),
    })
}
