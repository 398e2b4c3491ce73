use serde::{Deserialize, Serialize};

use crate::utils::token_estimator;

/// Numeric session identifier, generated from user_id + timestamp.
pub type SessionId = i64;

/// A single turn in a conversation, either from the user, the assistant,
/// or the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }

    pub fn estimate_tokens(&self) -> usize {
        token_estimator::estimate_tokens(&self.content)
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: SessionId,
    pub user_id: i64,
    pub message: String,
    #[serde(default)]
    pub document_id: Option<i64>,
    #[serde(default)]
    pub document_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub file_base64: String,
    pub file_type: String,
}

// ===== RESPONSE EVENT MODELS =====

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusInfo {
    pub stage: String, // uploading, parsing, embedding, retrieving, generating
    pub message: String,
    pub progress: u8, // 0-100
}

#[derive(Debug, Serialize)]
pub struct UploadedDocInfo {
    pub document_id: i32,
    pub file_name: String,
    pub status: String, // success, failed
    pub chunks_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SourceInfo {
    pub document_id: i32,
    pub document_name: String,
    pub chunk_id: i64,
    pub similarity: f32,
    pub page_number: Option<i32>,
    pub preview: String, // first 150 chars
    pub download_url: String,
    pub view_url: String,
}

#[derive(Debug, Serialize)]
pub struct MessageChunk {
    pub delta: String, // streaming text chunk
}

#[derive(Debug, Serialize)]
pub struct CompletionInfo {
    pub session_id: String,
    pub message_id: String,
    pub sources_count: usize,
    pub processing_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_messages_with_expected_roles() {
        let msg = ChatMessage::user("hello");
        assert_eq!(msg.role, "user");
        assert_eq!(msg.content, "hello");

        let msg = ChatMessage::assistant("hi".to_string());
        assert_eq!(msg.role, "assistant");
    }

    #[test]
    fn estimates_nonzero_tokens_for_nonempty_content() {
        let msg = ChatMessage::user("what is the deadline for project y?");
        assert!(msg.estimate_tokens() > 0);
    }
}
