//! Keyword search over a local per-country clue guide

use std::{collections::BTreeSet, path::Path};

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    parse_arguments, schema_of, Capability, CapabilityError, CapabilityKind, CapabilityResult,
};

const DEFAULT_MAX_RESULTS: usize = 10;
const MAX_RESULTS_CAP: usize = 50;

/// One country entry of the guide
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClueGuideEntry {
    pub country: String,
    pub code: String,
    #[serde(default)]
    pub sections: Vec<ClueGuideSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClueGuideSection {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ClueGuideArgs {
    /// Keywords to look for, e.g. ["yellow license plate", "cyrillic", "red soil"]
    keywords: Vec<String>,
    /// Only search these countries (names or codes)
    #[serde(default)]
    country_filter: Option<Vec<String>>,
    /// Maximum number of countries to return (1-50, default 10)
    #[serde(default)]
    max_results: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SectionMatch<'a> {
    title: &'a str,
    description: &'a str,
    matched_keywords: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct CountryMatch<'a> {
    country: &'a str,
    code: &'a str,
    match_count: usize,
    matched_keywords: BTreeSet<&'a str>,
    sections: Vec<SectionMatch<'a>>,
}

/// Searches the clue guide for countries whose sections mention the given keywords
pub struct ClueGuideCapability {
    entries: Vec<ClueGuideEntry>,
}

impl ClueGuideCapability {
    pub fn new(entries: Vec<ClueGuideEntry>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, CapabilityError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<ClueGuideEntry> = serde_json::from_str(&raw).map_err(|e| {
            CapabilityError::NotConfigured(format!("invalid clue guide {}: {}", path.display(), e))
        })?;
        tracing::info!("[CAPABILITY] Loaded clue guide with {} countries", entries.len());
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn search_country<'a>(
        entry: &'a ClueGuideEntry,
        keywords: &'a [String],
        patterns: &[Regex],
    ) -> Option<CountryMatch<'a>> {
        let sections: Vec<SectionMatch<'a>> = entry
            .sections
            .iter()
            .filter_map(|section| {
                let matched: Vec<&str> = keywords
                    .iter()
                    .zip(patterns)
                    .filter(|(_, pattern)| {
                        pattern.is_match(&section.description) || pattern.is_match(&section.title)
                    })
                    .map(|(keyword, _)| keyword.as_str())
                    .collect();
                (!matched.is_empty()).then_some(SectionMatch {
                    title: &section.title,
                    description: &section.description,
                    matched_keywords: matched,
                })
            })
            .collect();

        if sections.is_empty() {
            return None;
        }

        Some(CountryMatch {
            country: &entry.country,
            code: &entry.code,
            match_count: sections.len(),
            matched_keywords: sections
                .iter()
                .flat_map(|s| s.matched_keywords.iter().copied())
                .collect(),
            sections,
        })
    }
}

#[async_trait]
impl Capability for ClueGuideCapability {
    fn name(&self) -> &str {
        "clue_guide_search"
    }

    fn description(&self) -> &str {
        "Search the country clue guide for identification clues: license plates, road \
         signs and markings, bollards and poles, vegetation, architecture, language. Pass \
         the visual features you observed as keywords; several keywords can be searched \
         at once. Countries are ranked by how many guide sections match."
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Search
    }

    fn parameter_schema(&self) -> Value {
        schema_of::<ClueGuideArgs>()
    }

    async fn invoke(&self, arguments: Value) -> Result<CapabilityResult, CapabilityError> {
        let args: ClueGuideArgs = parse_arguments(arguments)?;

        let keywords: Vec<String> = args
            .keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return Ok(CapabilityResult::failure("No keywords provided for search"));
        }
        let max_results = args
            .max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_CAP);

        let patterns = keywords
            .iter()
            .map(|k| {
                RegexBuilder::new(&regex::escape(k))
                    .case_insensitive(true)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CapabilityError::InvalidArguments(e.to_string()))?;

        let filter: Option<Vec<String>> = args
            .country_filter
            .map(|countries| countries.iter().map(|c| c.to_lowercase()).collect());

        let mut matches: Vec<CountryMatch<'_>> = self
            .entries
            .iter()
            .filter(|entry| match &filter {
                Some(allowed) => allowed.iter().any(|c| {
                    *c == entry.country.to_lowercase() || *c == entry.code.to_lowercase()
                }),
                None => true,
            })
            .filter_map(|entry| Self::search_country(entry, &keywords, &patterns))
            .collect();

        // Stable sort keeps guide order among equal counts
        matches.sort_by(|a, b| b.match_count.cmp(&a.match_count));
        let total_matches = matches.len();
        matches.truncate(max_results);

        tracing::debug!(
            "[CAPABILITY] clue_guide_search {:?}: {} countries matched",
            keywords,
            total_matches
        );

        let metadata = json!({
            "database_size": self.entries.len(),
            "total_matches": total_matches,
        });

        if matches.is_empty() {
            return Ok(CapabilityResult::ok(json!({
                "message": format!("No matches found for keywords: {}", keywords.join(", ")),
                "results": [],
            }))
            .with_metadata(metadata));
        }

        let data = json!({
            "keywords": keywords,
            "total_matches": total_matches,
            "results": matches,
        });
        Ok(CapabilityResult::ok(data).with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn guide_json() -> Value {
        json!([
            {
                "country": "Norway",
                "code": "NO",
                "sections": [
                    {"title": "Bollards", "description": "Black bollards with a yellow reflector."},
                    {"title": "Plates", "description": "White plates with a blue EU strip."},
                    {"title": "Signs", "description": "Yellow road numbers on a black background."}
                ]
            },
            {
                "country": "Sweden",
                "code": "SE",
                "sections": [
                    {"title": "Plates", "description": "White plates, blue strip on the left."}
                ]
            },
            {
                "country": "Russia",
                "code": "RU",
                "sections": [
                    {"title": "Language", "description": "Cyrillic script everywhere."}
                ]
            }
        ])
    }

    fn capability() -> ClueGuideCapability {
        let entries: Vec<ClueGuideEntry> = serde_json::from_value(guide_json()).unwrap();
        ClueGuideCapability::new(entries)
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", guide_json()).unwrap();
        let guide = ClueGuideCapability::load(file.path()).unwrap();
        assert_eq!(guide.len(), 3);

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        write!(broken, "{{ not a list").unwrap();
        assert!(matches!(
            ClueGuideCapability::load(broken.path()),
            Err(CapabilityError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_ranked_by_match_count() {
        let result = capability()
            .invoke(json!({"keywords": ["YELLOW", "blue strip"]}))
            .await
            .unwrap();
        assert!(result.success);

        let data = result.data.unwrap();
        let results = data["results"].as_array().unwrap();
        assert_eq!(results[0]["country"], "Norway");
        assert_eq!(results[0]["match_count"], 2);
        assert_eq!(results[1]["country"], "Sweden");
        assert_eq!(results[1]["matched_keywords"], json!(["blue strip"]));
        assert_eq!(result.metadata.unwrap()["database_size"], 3);
    }

    #[tokio::test]
    async fn test_country_filter_and_limit() {
        let result = capability()
            .invoke(json!({"keywords": ["plates"], "country_filter": ["se"], "max_results": 5}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["total_matches"], 1);
        assert_eq!(data["results"][0]["code"], "SE");

        let limited = capability()
            .invoke(json!({"keywords": ["plates"], "max_results": 1}))
            .await
            .unwrap();
        assert_eq!(limited.data.unwrap()["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_keywords_and_no_matches() {
        let empty = capability().invoke(json!({"keywords": ["  "]})).await.unwrap();
        assert!(!empty.success);

        let none = capability().invoke(json!({"keywords": ["kangaroo"]})).await.unwrap();
        assert!(none.success);
        assert!(none.data.unwrap()["message"].as_str().unwrap().contains("kangaroo"));
    }
}
