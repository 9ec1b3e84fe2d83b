//! Reasoning backend abstraction
//!
//! A backend is stateless per call: every request carries the full transcript,
//! the system instruction and the capability manifest. Responses are a list of
//! content blocks (reasoning text and invocation requests) plus a stop reason.

mod anthropic;

pub use anthropic::AnthropicBackend;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::ManifestEntry;

/// Error type for backend calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Backend not available: {0}")]
    NotAvailable(String),

    #[error("Backend call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Role of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// An invocation the backend wants performed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One block of message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    InvocationRequest(InvocationRequest),
    InvocationResult {
        request_id: String,
        content: String,
        is_error: bool,
    },
}

/// A role-tagged transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl TranscriptMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
        }
    }

    /// Invocation results travel back on the user side of the conversation
    pub fn invocation_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::User,
            content: results,
        }
    }
}

/// Why the backend stopped generating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            other => StopReason::Other(other.to_string()),
        }
    }
}

/// A complete backend request
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub system_instruction: String,
    pub transcript: Vec<TranscriptMessage>,
    pub manifest: Vec<ManifestEntry>,
    pub max_output_tokens: u32,
}

impl BackendRequest {
    /// Single-message request without capabilities
    pub fn single(
        system_instruction: impl Into<String>,
        message: impl Into<String>,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            transcript: vec![TranscriptMessage::user(message)],
            manifest: Vec::new(),
            max_output_tokens,
        }
    }
}

/// Backend output
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
}

impl BackendResponse {
    /// Concatenated text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Invocation requests in emission order
    pub fn invocation_requests(&self) -> Vec<InvocationRequest> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::InvocationRequest(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Trait that all reasoning backends implement
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Produce the next response for the given transcript
    async fn respond(&self, request: BackendRequest) -> Result<BackendResponse, BackendError>;
}

/// Call the backend, converting an elapsed timeout into [`BackendError::Timeout`]
pub async fn respond_with_timeout(
    backend: &dyn ReasoningBackend,
    request: BackendRequest,
    timeout: Duration,
) -> Result<BackendResponse, BackendError> {
    match tokio::time::timeout(timeout, backend.respond(request)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("[BACKEND] {} timed out after {:?}", backend.name(), timeout);
            Err(BackendError::Timeout {
                secs: timeout.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_splits_text_and_requests() {
        let response = BackendResponse {
            content: vec![
                ContentBlock::Text {
                    text: "Looking at the sign. ".into(),
                },
                ContentBlock::InvocationRequest(InvocationRequest {
                    id: "call_1".into(),
                    name: "web_search".into(),
                    arguments: serde_json::json!({"query": "Naturkompaniet"}),
                }),
                ContentBlock::Text {
                    text: "Then geocode.".into(),
                },
            ],
            stop_reason: StopReason::ToolUse,
        };

        assert_eq!(response.text(), "Looking at the sign. Then geocode.");
        let requests = response.invocation_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "web_search");
    }

    #[test]
    fn test_stop_reason_parse() {
        assert_eq!(StopReason::parse("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::parse("tool_use"), StopReason::ToolUse);
        assert_eq!(
            StopReason::parse("refusal"),
            StopReason::Other("refusal".into())
        );
    }
}
