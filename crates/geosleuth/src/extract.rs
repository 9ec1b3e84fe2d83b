//! Structured data recovery from free-form backend text
//!
//! Backend output is prose that usually, but not always, contains a JSON
//! object. Extraction tries fenced blocks first, then the first balanced
//! object literal, then the outermost brace span. A fenced block only counts
//! when it holds a whole object, so scalars and fence markers quoted inside
//! strings never win over the surrounding object.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

const PREVIEW_CHARS: usize = 200;

/// Error type for structured extraction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Response is empty")]
    Empty,

    #[error("No structured data found in response: {preview}")]
    NotFound { preview: String },

    #[error("Structured data does not match the expected shape: {reason}")]
    Shape { reason: String },
}

/// Result of a non-failing extraction
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Parsed(Value),
    Failed { raw_response: String },
}

impl Extraction {
    pub fn is_failed(&self) -> bool {
        matches!(self, Extraction::Failed { .. })
    }

    /// Collapse into a JSON value, using the `{parse_error, raw_response}` sentinel on failure
    pub fn into_value(self) -> Value {
        match self {
            Extraction::Parsed(value) => value,
            Extraction::Failed { raw_response } => json!({
                "parse_error": true,
                "raw_response": raw_response,
            }),
        }
    }
}

/// Recovers JSON values from backend text
pub struct StructuredExtractor;

impl StructuredExtractor {
    /// Extract the first parseable JSON object, or fail with a [`ParseError`]
    pub fn extract(text: &str) -> Result<Value, ParseError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }

        for block in fenced_blocks(trimmed) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(block) {
                return Ok(value);
            }
        }

        for candidate in balanced_objects(trimmed) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Ok(value);
            }
        }

        if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                    return Ok(value);
                }
            }
        }

        tracing::debug!("[EXTRACT] No JSON found in response ({} chars)", trimmed.len());
        Err(ParseError::NotFound {
            preview: trimmed.chars().take(PREVIEW_CHARS).collect(),
        })
    }

    /// Never fails: parse failures become [`Extraction::Failed`] carrying the raw text
    pub fn extract_safe(text: &str) -> Extraction {
        match Self::extract(text) {
            Ok(value) => Extraction::Parsed(value),
            Err(e) => {
                tracing::warn!("[EXTRACT] Falling back to raw response: {}", e);
                Extraction::Failed {
                    raw_response: text.to_string(),
                }
            }
        }
    }

    /// Extract and deserialize into a typed value
    pub fn extract_as<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
        let value = Self::extract(text)?;
        serde_json::from_value(value).map_err(|e| ParseError::Shape {
            reason: e.to_string(),
        })
    }

    /// Render a value the way backends are asked to answer: a fenced JSON block
    pub fn render(value: &Value) -> String {
        let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        format!("```json\n{}\n```", body)
    }
}

/// Bodies of ``` fenced blocks, with any language tag removed
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let body_start = match after.find('\n') {
            Some(nl)
                if after[..nl]
                    .trim()
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
            {
                nl + 1
            }
            _ => 0,
        };
        let body = &after[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(body[..close].trim());
                rest = &body[close + 3..];
            }
            None => break,
        }
    }

    blocks
}

/// Every balanced `{ ... }` span in order of its opening brace.
/// Braces inside string literals do not count.
fn balanced_objects(text: &str) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    (0..bytes.len())
        .filter(move |&i| bytes[i] == b'{')
        .filter_map(move |start| {
            let mut depth = 0usize;
            let mut in_string = false;
            let mut escaped = false;
            for (offset, &b) in bytes[start..].iter().enumerate() {
                if in_string {
                    match b {
                        _ if escaped => escaped = false,
                        b'\\' => escaped = true,
                        b'"' => in_string = false,
                        _ => {}
                    }
                    continue;
                }
                match b {
                    b'"' => in_string = true,
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(&text[start..=start + offset]);
                        }
                    }
                    _ => {}
                }
            }
            None
        })
}
