//! Plain-text page fetch

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    parse_arguments, schema_of, Capability, CapabilityError, CapabilityKind, CapabilityResult,
};

static SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|svg)[^>]*>.*?</(script|style|noscript|svg)>")
        .expect("valid script regex")
});
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Deserialize, JsonSchema)]
struct FetchPageArgs {
    /// Absolute http(s) URL of the page
    url: String,
}

pub struct FetchPageCapability {
    client: Client,
    user_agent: String,
    char_limit: usize,
}

impl FetchPageCapability {
    pub fn new(user_agent: impl Into<String>, char_limit: usize) -> Self {
        Self {
            client: Client::new(),
            user_agent: user_agent.into(),
            char_limit,
        }
    }

    fn decode_entities(text: &str) -> String {
        text.replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&")
    }

    /// Visible text of an HTML document, whitespace collapsed
    fn page_text(html: &str) -> (Option<String>, String) {
        let title = TITLE
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| Self::decode_entities(WHITESPACE.replace_all(m.as_str(), " ").trim()))
            .filter(|t| !t.is_empty());

        let without_code = SCRIPT_STYLE.replace_all(html, " ");
        let without_tags = TAGS.replace_all(&without_code, " ");
        let text = WHITESPACE.replace_all(&without_tags, " ");
        (title, Self::decode_entities(text.trim()))
    }

    fn truncate(text: String, limit: usize) -> (String, bool) {
        match text.char_indices().nth(limit) {
            Some((cut, _)) => (text[..cut].to_string(), true),
            None => (text, false),
        }
    }
}

#[async_trait]
impl Capability for FetchPageCapability {
    fn name(&self) -> &str {
        "fetch_page"
    }

    fn description(&self) -> &str {
        "Download a web page and return its visible text. Use it to read a search \
         result in full, e.g. a store locator page or an address listing."
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Scrape
    }

    fn parameter_schema(&self) -> Value {
        schema_of::<FetchPageArgs>()
    }

    async fn invoke(&self, arguments: Value) -> Result<CapabilityResult, CapabilityError> {
        let args: FetchPageArgs = parse_arguments(arguments)?;
        let url = args.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Ok(CapabilityResult::failure(format!(
                "'{}' is not an http(s) URL",
                url
            )));
        }

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::Upstream {
                status: status.as_u16(),
                message: format!("fetching {}", url),
            });
        }

        let html = response.text().await?;
        let (title, text) = Self::page_text(&html);
        let (content, truncated) = Self::truncate(text, self.char_limit);
        tracing::debug!(
            "[CAPABILITY] fetch_page {} -> {} chars (truncated: {})",
            url,
            content.chars().count(),
            truncated
        );

        Ok(CapabilityResult::ok(json!({
            "url": url,
            "title": title,
            "content": content,
        }))
        .with_metadata(json!({ "truncated": truncated })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_text_strips_markup() {
        let html = r#"<html><head><title> Naturkompaniet &amp; Co </title>
            <style>body { color: red; }</style>
            <script>var x = "<p>hidden</p>";</script></head>
            <body><h1>Butikker</h1><p>Storgata&nbsp;62,
            9008 Tromsø</p></body></html>"#;

        let (title, text) = FetchPageCapability::page_text(html);
        assert_eq!(title.as_deref(), Some("Naturkompaniet & Co"));
        assert!(text.contains("Butikker Storgata 62, 9008 Tromsø"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("color"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        let (text, truncated) = FetchPageCapability::truncate("Tromsø".to_string(), 5);
        assert_eq!(text, "Troms");
        assert!(truncated);

        let (text, truncated) = FetchPageCapability::truncate("øøø".to_string(), 3);
        assert_eq!(text, "øøø");
        assert!(!truncated);
    }

    #[tokio::test]
    async fn test_rejects_non_http_urls() {
        let capability = FetchPageCapability::new("test", 100);
        let result = capability.invoke(json!({"url": "file:///etc/passwd"})).await.unwrap();
        assert!(!result.success);
    }
}
