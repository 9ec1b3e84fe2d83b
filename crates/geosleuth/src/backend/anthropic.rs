//! Anthropic Messages API backend

use async_trait::async_trait;
use reqwest::Client;

use super::{
    BackendError, BackendRequest, BackendResponse, ContentBlock, InvocationRequest, MessageRole,
    ReasoningBackend, StopReason, TranscriptMessage,
};
use crate::{capability::ManifestEntry, config::BackendConfig};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude reasoning backend
pub struct AnthropicBackend {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl AnthropicBackend {
    /// Create a backend from configuration, reading the API key from the configured env var
    pub fn new(config: &BackendConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok();

        if api_key.is_some() {
            tracing::info!("[BACKEND] Anthropic backend initialized with API key");
        } else {
            tracing::warn!(
                "[BACKEND] Anthropic backend created without API key - {} env var not found",
                config.api_key_env
            );
        }

        Self {
            client: Client::new(),
            api_key,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn messages_to_anthropic(messages: &[TranscriptMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                };
                let content: Vec<serde_json::Value> = msg
                    .content
                    .iter()
                    .map(|block| match block {
                        ContentBlock::Text { text } => {
                            serde_json::json!({ "type": "text", "text": text })
                        }
                        ContentBlock::InvocationRequest(request) => serde_json::json!({
                            "type": "tool_use",
                            "id": request.id,
                            "name": request.name,
                            "input": request.arguments
                        }),
                        ContentBlock::InvocationResult {
                            request_id,
                            content,
                            is_error,
                        } => serde_json::json!({
                            "type": "tool_result",
                            "tool_use_id": request_id,
                            "content": content,
                            "is_error": is_error
                        }),
                    })
                    .collect();
                serde_json::json!({ "role": role, "content": content })
            })
            .collect()
    }

    fn tool_to_anthropic(entry: &ManifestEntry) -> serde_json::Value {
        serde_json::json!({
            "name": entry.name,
            "description": entry.description,
            "input_schema": entry.parameter_schema
        })
    }

    /// Parse a Messages API response body
    fn parse_response(json: &serde_json::Value) -> Result<BackendResponse, BackendError> {
        let blocks = json["content"].as_array().ok_or_else(|| {
            BackendError::MalformedResponse("response has no content array".to_string())
        })?;

        let content = blocks
            .iter()
            .filter_map(|block| match block["type"].as_str()? {
                "text" => Some(ContentBlock::Text {
                    text: block["text"].as_str()?.to_string(),
                }),
                "tool_use" => Some(ContentBlock::InvocationRequest(InvocationRequest {
                    id: block["id"].as_str()?.to_string(),
                    name: block["name"].as_str()?.to_string(),
                    arguments: block["input"].clone(),
                })),
                _ => None,
            })
            .collect();

        let stop_reason = StopReason::parse(json["stop_reason"].as_str().unwrap_or("end_turn"));

        Ok(BackendResponse {
            content,
            stop_reason,
        })
    }
}

#[async_trait]
impl ReasoningBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn respond(&self, request: BackendRequest) -> Result<BackendResponse, BackendError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| BackendError::AuthError("No Anthropic API key configured".to_string()))?;

        if request.transcript.is_empty() {
            return Err(BackendError::ConfigError(
                "At least one transcript message is required".to_string(),
            ));
        }

        let messages = Self::messages_to_anthropic(&request.transcript);
        let mut payload = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_output_tokens,
            "system": request.system_instruction,
            "messages": messages,
            "temperature": self.temperature
        });

        if !request.manifest.is_empty() {
            let tools: Vec<serde_json::Value> =
                request.manifest.iter().map(Self::tool_to_anthropic).collect();
            payload["tools"] = serde_json::json!(tools);
        }

        tracing::debug!(
            "[BACKEND] Sending request: model={}, messages={}, tools={}",
            self.model,
            messages.len(),
            request.manifest.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(BackendError::RateLimited {
                    retry_after_ms: None,
                });
            }

            if status.as_u16() == 529 {
                return Err(BackendError::NotAvailable(
                    "Anthropic API is temporarily overloaded".to_string(),
                ));
            }

            return Err(BackendError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        Self::parse_response(&json)
    }
}
