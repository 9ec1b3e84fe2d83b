//! Progress updates - structured events for whatever renders an investigation
//!
//! Each investigation owns one bounded channel. The engine is the only
//! producer, one presentation layer is the only consumer, and sends wait for
//! the consumer when the buffer is full.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Pipeline phase an update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Extracting,
    Planning,
    Investigating,
    Summarizing,
    Complete,
    Error,
}

impl std::fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProgressPhase::Extracting => "extracting",
            ProgressPhase::Planning => "planning",
            ProgressPhase::Investigating => "investigating",
            ProgressPhase::Summarizing => "summarizing",
            ProgressPhase::Complete => "complete",
            ProgressPhase::Error => "error",
        };
        f.write_str(name)
    }
}

/// One progress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub phase: ProgressPhase,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Best location guess so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_lead: Option<String>,
    /// Console-style line for log panes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_output: Option<String>,
    pub complete: bool,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(phase: ProgressPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            details: None,
            current_lead: None,
            terminal_output: None,
            complete: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_lead(mut self, lead: impl Into<String>) -> Self {
        self.current_lead = Some(lead.into());
        self
    }

    pub fn with_terminal_output(mut self, line: impl Into<String>) -> Self {
        self.terminal_output = Some(line.into());
        self
    }

    /// Mark as the final update of the investigation
    pub fn completed(mut self) -> Self {
        self.complete = true;
        self
    }
}

/// Producer half of a progress channel
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressUpdate>,
}

impl ProgressSender {
    /// Send an update, waiting for buffer space. A gone consumer is not an error.
    pub async fn send(&self, update: ProgressUpdate) {
        if self.tx.send(update).await.is_err() {
            tracing::debug!("[PROGRESS] Receiver dropped, update discarded");
        }
    }
}

/// Create a bounded progress channel
pub fn channel(capacity: usize) -> (ProgressSender, mpsc::Receiver<ProgressUpdate>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ProgressSender { tx }, rx)
}

/// Send through an optional sender
pub(crate) async fn emit(sender: Option<&ProgressSender>, update: ProgressUpdate) {
    if let Some(sender) = sender {
        sender.send(update).await;
    }
}
