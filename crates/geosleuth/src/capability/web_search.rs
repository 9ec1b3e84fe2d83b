//! Web search through a SearxNG-compatible JSON endpoint

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    parse_arguments, schema_of, Capability, CapabilityError, CapabilityKind, CapabilityResult,
};

const MAX_RESULTS_CAP: usize = 20;

#[derive(Debug, Deserialize, JsonSchema)]
struct WebSearchArgs {
    /// Search query, e.g. a shop name plus a street name
    query: String,
    /// Number of results to return (1-20)
    #[serde(default)]
    max_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
struct SearxResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct SearchHit {
    title: String,
    url: String,
    snippet: String,
}

pub struct WebSearchCapability {
    client: Client,
    endpoint: String,
    default_results: usize,
}

impl WebSearchCapability {
    pub fn new(endpoint: impl Into<String>, default_results: usize) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            default_results: default_results.max(1),
        }
    }

    fn hits(response: SearxResponse, limit: usize) -> Vec<SearchHit> {
        response
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .take(limit)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect()
    }
}

#[async_trait]
impl Capability for WebSearchCapability {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns titles, URLs and snippets. Use it to check business \
         names, street names, phone prefixes and other text seen in the image."
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Search
    }

    fn parameter_schema(&self) -> Value {
        schema_of::<WebSearchArgs>()
    }

    async fn invoke(&self, arguments: Value) -> Result<CapabilityResult, CapabilityError> {
        let args: WebSearchArgs = parse_arguments(arguments)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Ok(CapabilityResult::failure("query must not be empty"));
        }
        let limit = args
            .max_results
            .unwrap_or(self.default_results)
            .clamp(1, MAX_RESULTS_CAP);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::Upstream {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: SearxResponse = response.json().await?;
        let hits = Self::hits(body, limit);
        tracing::debug!("[CAPABILITY] web_search '{}' returned {} hits", query, hits.len());

        Ok(CapabilityResult::ok(json!({ "query": query, "results": hits }))
            .with_metadata(json!({ "result_count": hits.len() })))
    }
}
