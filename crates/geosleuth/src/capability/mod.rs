//! Capabilities the reasoning backend can invoke
//!
//! Every capability declares a unique name, a description and a JSON schema for
//! its arguments. The [`CapabilityRegistry`] turns a set of them into the
//! manifest advertised to the backend and resolves invocation requests by name.

mod case_file;
mod clue_guide;
mod fetch_page;
mod geocode;
mod registry;
mod web_search;

pub use case_file::CaseFileCapability;
pub use clue_guide::{ClueGuideCapability, ClueGuideEntry, ClueGuideSection};
pub use fetch_page::FetchPageCapability;
pub use geocode::GeocodeCapability;
pub use registry::CapabilityRegistry;
pub use web_search::WebSearchCapability;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Closed set of capability families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Search,
    Scrape,
    Geocode,
    RecordAccess,
}

/// Outcome of one capability invocation.
///
/// `error` is always present when `success` is false; `data` may be absent
/// even on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CapabilityResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Enforce the failure invariant on results coming from capability code
    pub(crate) fn normalized(mut self) -> Self {
        if !self.success && self.error.is_none() {
            self.error = Some("capability reported failure without a message".to_string());
        }
        self
    }

    /// Text form fed back to the backend as an invocation result
    pub fn to_transcript_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!("{{\"success\":false,\"error\":\"unserializable result: {}\"}}", e)
        })
    }
}

/// Errors raised inside capability implementations
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Capability not configured: {0}")]
    NotConfigured(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invocation timed out after {limit:?}")]
    Timeout { limit: std::time::Duration },
}

impl From<reqwest::Error> for CapabilityError {
    fn from(e: reqwest::Error) -> Self {
        CapabilityError::Request(e.to_string())
    }
}

/// A manifest entry advertised to the reasoning backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
}

/// Trait implemented by every capability
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name used for dispatch
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn kind(&self) -> CapabilityKind;

    /// JSON schema of the accepted arguments
    fn parameter_schema(&self) -> Value;

    async fn invoke(&self, arguments: Value) -> Result<CapabilityResult, CapabilityError>;

    fn manifest_entry(&self) -> ManifestEntry {
        ManifestEntry {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameter_schema: self.parameter_schema(),
        }
    }
}

/// Parameter schema for a typed argument struct
pub fn schema_of<T: JsonSchema>() -> Value {
    let mut schema = schemars::schema_for!(T).to_value();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    schema
}

/// Deserialize invocation arguments into a typed struct
pub fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> Result<T, CapabilityError> {
    // Backends sometimes send `null` for capabilities without required fields
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| CapabilityError::InvalidArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct ProbeArgs {
        /// What to look for
        query: String,
        #[serde(default)]
        limit: Option<u32>,
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = schema_of::<ProbeArgs>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["query"].is_object());
        assert!(schema["properties"]["limit"].is_object());
        assert_eq!(schema["required"], json!(["query"]));
        assert!(schema.get("$schema").is_none());
    }

    #[test]
    fn test_parse_arguments() {
        let args: ProbeArgs = parse_arguments(json!({"query": "Tromsø"})).unwrap();
        assert_eq!(args.query, "Tromsø");
        assert_eq!(args.limit, None);

        let err = parse_arguments::<ProbeArgs>(json!({"limit": 3})).unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidArguments(_)));
    }

    #[test]
    fn test_failure_invariant() {
        let result = CapabilityResult::failure("boom");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));

        let silent = CapabilityResult {
            success: false,
            data: None,
            error: None,
            metadata: None,
        }
        .normalized();
        assert!(silent.error.is_some());
    }

    #[test]
    fn test_transcript_content_skips_empty_fields() {
        let content = CapabilityResult::ok(json!({"hits": 2})).to_transcript_content();
        assert_eq!(content, r#"{"success":true,"data":{"hits":2}}"#);
    }
}
