//! Help-assist chat: turn handling, titles, transcript view, suggestions.
//!
//! Builds on top of:
//! - `models::ConversationSession` / `models::ChatMessage` (data structs)
//! - `llm::ChatBackend` (the hosted or local model)
//!
//! The session is a value owned by the caller. A turn takes it by value and
//! hands it back, extended with the user message and the reply on success,
//! untouched on failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::ChatBackend;
use crate::models::{ChatMessage, ConversationSession};

/// Reply shown when the assistant cannot answer.
pub const CHAT_FAILURE_REPLY: &str = "Sorry, I couldn't fetch the response.";

/// Placeholder for the chat input box.
pub const CHAT_INPUT_PLACEHOLDER: &str = "Ask for precautions";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,
}

// ═══════════════════════════════════════════
// Frontend-facing types
// ═══════════════════════════════════════════

/// Result of one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub session: ConversationSession,
    pub reply: String,
    /// `true` when `reply` is the apology text.
    pub failed: bool,
}

/// One transcript line as displayed ("user" / "assistant").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: String,
    pub content: String,
}

/// Prompt suggestion for empty state / new conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSuggestion {
    pub text: String,
    pub category: String,
}

// ═══════════════════════════════════════════
// Turn handling
// ═══════════════════════════════════════════

/// Send `message` with the session's history and record the exchange.
pub fn send_chat_turn(
    backend: &dyn ChatBackend,
    mut session: ConversationSession,
    message: &str,
) -> Result<ChatTurn, ChatError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    tracing::debug!(
        session_id = %session.id,
        history_len = session.messages.len(),
        provider = backend.name(),
        "Sending chat turn"
    );

    match backend.reply(&session.messages, message) {
        Ok(reply) => {
            if session.title.is_none() {
                session.title = Some(generate_title(message));
            }
            session.messages.push(ChatMessage::user(message));
            session.messages.push(ChatMessage::model(&reply));
            Ok(ChatTurn {
                session,
                reply,
                failed: false,
            })
        }
        Err(e) => {
            tracing::warn!(session_id = %session.id, error = %e, "Assistant reply failed");
            Ok(ChatTurn {
                session,
                reply: CHAT_FAILURE_REPLY.to_string(),
                failed: true,
            })
        }
    }
}

/// Transcript with display roles, oldest first.
pub fn transcript(session: &ConversationSession) -> Vec<TranscriptEntry> {
    session
        .messages
        .iter()
        .map(|m| TranscriptEntry {
            role: m.role.display_role().to_string(),
            content: m.content.clone(),
        })
        .collect()
}

// ═══════════════════════════════════════════
// Title generation
// ═══════════════════════════════════════════

/// Generate a conversation title from the first user message.
/// Truncates at 50 characters with "..." if longer, handling UTF-8 correctly.
pub fn generate_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.is_empty() {
        return "New conversation".to_string();
    }

    // Byte position just past the 50th character
    let boundary = trimmed
        .char_indices()
        .nth(50)
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());

    if boundary >= trimmed.len() {
        trimmed.to_string()
    } else {
        format!("{}...", &trimmed[..boundary])
    }
}

// ═══════════════════════════════════════════
// Prompt suggestions
// ═══════════════════════════════════════════

fn suggestion(text: &str, category: &str) -> PromptSuggestion {
    PromptSuggestion {
        text: text.into(),
        category: category.into(),
    }
}

/// Default prompt suggestions for empty conversations.
pub fn default_prompt_suggestions() -> Vec<PromptSuggestion> {
    vec![
        suggestion("What precautions should I take after a glioma diagnosis?", "precautions"),
        suggestion("Which symptoms of a meningioma need urgent care?", "symptoms"),
        suggestion("How is a pituitary tumor usually treated?", "treatment"),
        suggestion("What lifestyle changes help during brain tumor treatment?", "precautions"),
        suggestion("What questions should I ask my neurologist?", "appointments"),
        suggestion("How often should a follow-up MRI be done?", "general"),
    ]
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
