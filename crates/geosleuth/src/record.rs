//! Shared investigation record
//!
//! The record holds the immutable seed (extracted features and metadata) plus
//! append-only lists of corrections, context hints, validated findings and
//! summaries. The owning orchestrator is the only writer. Everybody else gets
//! either a [`RecordReader`] that observes whole snapshots, or a narrow append
//! handle ([`FindingSink`], [`UserFeedback`]) whose entries are queued and
//! folded in by the owner at stage boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::summarizer::Summary;

/// Top-level feature groups produced by the extraction pipeline
const FEATURE_GROUPS: [&str; 3] = [
    "textual_features",
    "architecture_features",
    "infrastructure_features",
];

/// Seed facts an investigation starts from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedFeatures {
    /// Structured clues extracted from the image
    pub features: Value,
    #[serde(default)]
    pub metadata: Value,
    /// Path or upload identifier of the source image
    #[serde(default)]
    pub source: Option<String>,
}

impl SeedFeatures {
    pub fn new(features: Value, metadata: Value) -> Self {
        Self {
            features,
            metadata,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Number of extracted clues across the known feature groups
    pub fn feature_count(&self) -> usize {
        FEATURE_GROUPS
            .iter()
            .map(|group| match &self.features[*group] {
                Value::Object(map) => map.len(),
                Value::Array(items) => items.len(),
                _ => 0,
            })
            .sum()
    }
}

/// A wrong guess corrected by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub guess: String,
    pub correction: String,
}

/// A finding confirmed during execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedFinding {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
    pub recorded_at: DateTime<Utc>,
}

impl ValidatedFinding {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            source: None,
            details: Value::Null,
            recorded_at: Utc::now(),
        }
    }
}

/// Point-in-time copy of the whole record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub seed: SeedFeatures,
    pub corrections: Vec<Correction>,
    pub context_hints: Vec<String>,
    pub validated_findings: Vec<ValidatedFinding>,
    pub summaries: Vec<Summary>,
}

impl RecordSnapshot {
    fn new(seed: SeedFeatures) -> Self {
        Self {
            seed,
            corrections: Vec::new(),
            context_hints: Vec::new(),
            validated_findings: Vec::new(),
            summaries: Vec::new(),
        }
    }

    /// Field names addressable through [`RecordSnapshot::field`]
    pub const FIELDS: [&'static str; 7] = [
        "seed_features",
        "metadata",
        "source",
        "corrections",
        "context_hints",
        "validated_findings",
        "summaries",
    ];

    /// A single field as JSON, `None` for unknown names
    pub fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "seed_features" => self.seed.features.clone(),
            "metadata" => self.seed.metadata.clone(),
            "source" => serde_json::to_value(&self.seed.source).ok()?,
            "corrections" => serde_json::to_value(&self.corrections).ok()?,
            "context_hints" => serde_json::to_value(&self.context_hints).ok()?,
            "validated_findings" => serde_json::to_value(&self.validated_findings).ok()?,
            "summaries" => serde_json::to_value(&self.summaries).ok()?,
            _ => return None,
        };
        Some(value)
    }
}

enum PendingAppend {
    Finding(ValidatedFinding),
    Correction(Correction),
    ContextHint(String),
}

/// The record, owned by exactly one orchestrator
pub struct SharedInvestigationRecord {
    state: watch::Sender<RecordSnapshot>,
    pending_tx: mpsc::UnboundedSender<PendingAppend>,
    pending_rx: mpsc::UnboundedReceiver<PendingAppend>,
}

impl SharedInvestigationRecord {
    pub fn new(seed: SeedFeatures) -> Self {
        let (feedback, pending) = feedback_channel();
        Self::with_feedback(seed, feedback, pending)
    }

    /// Build a record whose user feedback handle was handed out earlier
    pub(crate) fn with_feedback(
        seed: SeedFeatures,
        feedback: UserFeedback,
        pending: PendingAppends,
    ) -> Self {
        let (state, _) = watch::channel(RecordSnapshot::new(seed));
        Self {
            state,
            pending_tx: feedback.tx,
            pending_rx: pending.rx,
        }
    }

    pub fn snapshot(&self) -> RecordSnapshot {
        self.state.borrow().clone()
    }

    pub fn reader(&self) -> RecordReader {
        RecordReader {
            rx: self.state.subscribe(),
        }
    }

    pub fn finding_sink(&self) -> FindingSink {
        FindingSink {
            tx: self.pending_tx.clone(),
        }
    }

    pub fn user_feedback(&self) -> UserFeedback {
        UserFeedback {
            tx: self.pending_tx.clone(),
        }
    }

    pub fn append_summary(&mut self, summary: Summary) {
        self.state.send_modify(|record| record.summaries.push(summary));
    }

    pub fn append_finding(&mut self, finding: ValidatedFinding) {
        self.state
            .send_modify(|record| record.validated_findings.push(finding));
    }

    pub fn add_correction(&mut self, correction: Correction) {
        self.state.send_modify(|record| record.corrections.push(correction));
    }

    pub fn add_context_hint(&mut self, hint: impl Into<String>) {
        let hint = hint.into();
        self.state.send_modify(|record| record.context_hints.push(hint));
    }

    /// Fold queued appends into the record, returning how many were applied
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(append) = self.pending_rx.try_recv() {
            match append {
                PendingAppend::Finding(finding) => self.append_finding(finding),
                PendingAppend::Correction(correction) => self.add_correction(correction),
                PendingAppend::ContextHint(hint) => self.add_context_hint(hint),
            }
            applied += 1;
        }
        if applied > 0 {
            tracing::debug!("[RECORD] Applied {} pending appends", applied);
        }
        applied
    }
}

/// Receiving half of the pending-append queue before the record exists
pub(crate) struct PendingAppends {
    rx: mpsc::UnboundedReceiver<PendingAppend>,
}

/// Create the user feedback handle ahead of the record it will feed
pub(crate) fn feedback_channel() -> (UserFeedback, PendingAppends) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UserFeedback { tx }, PendingAppends { rx })
}

/// Read-only view that always observes whole snapshots
#[derive(Clone)]
pub struct RecordReader {
    rx: watch::Receiver<RecordSnapshot>,
}

impl RecordReader {
    pub fn snapshot(&self) -> RecordSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next update. Fails once the record is dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Append-only handle for validated findings
#[derive(Clone)]
pub struct FindingSink {
    tx: mpsc::UnboundedSender<PendingAppend>,
}

impl FindingSink {
    /// Queue a finding. Returns false when the record no longer exists.
    pub fn add(&self, finding: ValidatedFinding) -> bool {
        self.tx.send(PendingAppend::Finding(finding)).is_ok()
    }
}

/// Append-only handle for user corrections and context hints
#[derive(Clone)]
pub struct UserFeedback {
    tx: mpsc::UnboundedSender<PendingAppend>,
}

impl UserFeedback {
    pub fn add_correction(&self, guess: impl Into<String>, correction: impl Into<String>) -> bool {
        self.tx
            .send(PendingAppend::Correction(Correction {
                guess: guess.into(),
                correction: correction.into(),
            }))
            .is_ok()
    }

    pub fn add_context_hint(&self, hint: impl Into<String>) -> bool {
        self.tx.send(PendingAppend::ContextHint(hint.into())).is_ok()
    }
}
