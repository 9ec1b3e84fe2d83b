//! Summarizer - condenses an execution trace and scores it against earlier rounds

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    backend::{respond_with_timeout, BackendRequest, ReasoningBackend},
    config::InvestigationConfig,
    executor::ExecutionTrace,
    extract::{ParseError, StructuredExtractor},
    prompts, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPointCategory {
    Location,
    Evidence,
    Hypothesis,
    Contradiction,
}

impl KeyPointCategory {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "location" => Some(Self::Location),
            "evidence" => Some(Self::Evidence),
            "hypothesis" => Some(Self::Hypothesis),
            "contradiction" => Some(Self::Contradiction),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyPointCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Location => "location",
            Self::Evidence => "evidence",
            Self::Hypothesis => "hypothesis",
            Self::Contradiction => "contradiction",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPoint {
    pub category: KeyPointCategory,
    pub finding: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

impl KeyPoint {
    /// Lenient conversion from the backend's JSON. Unknown categories become evidence.
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) if !text.trim().is_empty() => Some(Self {
                category: KeyPointCategory::Evidence,
                finding: text.trim().to_string(),
                confidence: None,
            }),
            Value::Object(fields) => {
                let finding = fields
                    .get("finding")
                    .or_else(|| fields.get("description"))
                    .and_then(Value::as_str)?
                    .trim();
                if finding.is_empty() {
                    return None;
                }
                let raw_category = fields.get("category").and_then(Value::as_str).unwrap_or("");
                let category = KeyPointCategory::parse(raw_category).unwrap_or_else(|| {
                    tracing::warn!(
                        "[SUMMARIZER] Unknown key point category '{}', using evidence",
                        raw_category
                    );
                    KeyPointCategory::Evidence
                });
                Some(Self {
                    category,
                    finding: finding.to_string(),
                    confidence: fields
                        .get("confidence")
                        .and_then(Value::as_str)
                        .and_then(Confidence::parse),
                })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub overview: String,
    pub key_points: Vec<KeyPoint>,
    pub next_actions: Vec<String>,
    pub is_redundant: bool,
    /// Always within [0, 1]
    pub similarity_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_reasoning: Option<String>,
}

impl Summary {
    /// Highest-confidence location key point, first one wins ties
    pub fn best_location(&self) -> Option<&KeyPoint> {
        self.key_points
            .iter()
            .filter(|p| p.category == KeyPointCategory::Location)
            .fold(None, |best: Option<&KeyPoint>, point| match best {
                Some(current) if current.confidence >= point.confidence => Some(current),
                _ => Some(point),
            })
    }

    fn from_value(value: &Value) -> std::result::Result<Self, ParseError> {
        let object = value.as_object().ok_or_else(|| ParseError::Shape {
            reason: "summary is not a JSON object".into(),
        })?;

        let overview = object
            .get("summary")
            .or_else(|| object.get("overview"))
            .and_then(Value::as_str)
            .ok_or_else(|| ParseError::Shape {
                reason: "summary has no overview text".into(),
            })?
            .trim()
            .to_string();

        let key_points = object
            .get("key_points")
            .and_then(Value::as_array)
            .map(|points| points.iter().filter_map(KeyPoint::from_value).collect())
            .unwrap_or_default();

        let next_actions = object
            .get("next_actions")
            .and_then(Value::as_array)
            .map(|actions| {
                actions
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            overview,
            key_points,
            next_actions,
            is_redundant: false,
            similarity_score: 0.0,
            similarity_reasoning: None,
        })
    }
}

/// Read a similarity score from backend JSON, clamped to [0, 1].
/// Strings are parsed; missing, unparseable and NaN scores count as 0.
pub fn clamp_score(raw: Option<&Value>) -> f64 {
    let score = match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

pub fn is_redundant(similarity_score: f64, threshold: f64) -> bool {
    similarity_score >= threshold
}

pub struct Summarizer {
    backend: Arc<dyn ReasoningBackend>,
    threshold: f64,
    reasoning_chars: usize,
    result_chars: usize,
    summary_max_tokens: u32,
    similarity_max_tokens: u32,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: &InvestigationConfig) -> Self {
        Self {
            backend,
            threshold: config.similarity_threshold,
            reasoning_chars: config.reasoning_excerpt_chars,
            result_chars: config.result_excerpt_chars,
            summary_max_tokens: config.backend.summarizer_max_tokens,
            similarity_max_tokens: config.backend.similarity_max_tokens,
            timeout: Duration::from_secs(config.backend.request_timeout_secs),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Summarize a trace. The result is not yet scored.
    pub async fn summarize_trace(&self, trace: &ExecutionTrace) -> Result<Summary> {
        let message = prompts::summary_message(trace, self.reasoning_chars, self.result_chars);
        let request = BackendRequest::single(
            prompts::SUMMARIZER_INSTRUCTION,
            message,
            self.summary_max_tokens,
        );
        let response = respond_with_timeout(self.backend.as_ref(), request, self.timeout).await?;

        let value = StructuredExtractor::extract(&response.text())?;
        let summary = Summary::from_value(&value)?;
        tracing::info!(
            "[SUMMARIZER] Summary with {} key points, {} next actions",
            summary.key_points.len(),
            summary.next_actions.len()
        );
        Ok(summary)
    }

    /// Score how much `latest` repeats the key points of `previous` summaries
    pub async fn score_similarity(
        &self,
        previous: &[Summary],
        latest: &Summary,
    ) -> Result<(f64, Option<String>)> {
        let previous_points: Vec<KeyPoint> = previous
            .iter()
            .flat_map(|s| s.key_points.iter().cloned())
            .collect();
        let message = prompts::similarity_message(&previous_points, &latest.key_points);
        let request = BackendRequest::single(
            prompts::SIMILARITY_INSTRUCTION,
            message,
            self.similarity_max_tokens,
        );
        let response = respond_with_timeout(self.backend.as_ref(), request, self.timeout).await?;

        let value = StructuredExtractor::extract(&response.text())?;
        let score = clamp_score(value.get("similarity_score"));
        let reasoning = value
            .get("reasoning")
            .and_then(Value::as_str)
            .map(String::from);
        tracing::info!("[SUMMARIZER] Similarity to earlier rounds: {:.2}", score);
        Ok((score, reasoning))
    }

    /// Summarize and, when earlier summaries exist, score for redundancy.
    /// Without earlier summaries the similarity call is skipped.
    pub async fn summarize(&self, trace: &ExecutionTrace, previous: &[Summary]) -> Result<Summary> {
        let mut summary = self.summarize_trace(trace).await?;
        if previous.is_empty() {
            return Ok(summary);
        }
        let (score, reasoning) = self.score_similarity(previous, &summary).await?;
        self.apply_score(&mut summary, score, reasoning);
        Ok(summary)
    }

    pub fn apply_score(&self, summary: &mut Summary, score: f64, reasoning: Option<String>) {
        summary.similarity_score = score;
        summary.is_redundant = is_redundant(score, self.threshold);
        summary.similarity_reasoning = reasoning;
    }
}
