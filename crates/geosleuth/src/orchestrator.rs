//! Orchestrator - the plan / execute / summarize cycle
//!
//! The orchestrator owns the investigation record and is its only writer.
//! Each cycle plans from a fresh snapshot, executes the plan, summarizes the
//! trace and stops once a plan comes back empty, a summary is judged
//! redundant, a stage faults or the cycle budget runs out. Cancellation is
//! honoured before every backend call the orchestrator makes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{
    backend::ReasoningBackend,
    capability::CapabilityRegistry,
    config::InvestigationConfig,
    executor::{Executor, TraceStatus},
    planner::Planner,
    progress::{self, ProgressPhase, ProgressSender, ProgressUpdate},
    record::{RecordReader, SharedInvestigationRecord},
    summarizer::{Summarizer, Summary},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestratorState {
    Planning,
    Executing,
    Summarizing,
    Converged,
    Exhausted,
    Failed,
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted | Self::Failed)
    }
}

/// Why an investigation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The planner had nothing left to do
    EmptyPlan,
    /// The latest summary repeated earlier findings
    Redundant,
    CycleBudgetExhausted,
    Fault,
    Cancelled,
}

/// Terminal result of an investigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationOutcome {
    pub state: OrchestratorState,
    pub reason: TerminationReason,
    pub last_summary: Option<Summary>,
    pub cycles: usize,
    pub error: Option<String>,
}

impl InvestigationOutcome {
    /// Outcome for a run that failed before or outside the cycle loop
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: OrchestratorState::Failed,
            reason: TerminationReason::Fault,
            last_summary: None,
            cycles: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == OrchestratorState::Converged
    }
}

pub struct Orchestrator {
    planner: Planner,
    executor: Executor,
    summarizer: Summarizer,
    record: SharedInvestigationRecord,
    turn_budget: usize,
    cycle_budget: usize,
    state: OrchestratorState,
    progress: Option<ProgressSender>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        registry: Arc<CapabilityRegistry>,
        record: SharedInvestigationRecord,
        config: &InvestigationConfig,
    ) -> Self {
        Self {
            planner: Planner::new(backend.clone(), config),
            executor: Executor::new(backend.clone(), registry, config),
            summarizer: Summarizer::new(backend, config),
            record,
            turn_budget: config.turn_budget,
            cycle_budget: config.cycle_budget,
            state: OrchestratorState::Planning,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.executor = self.executor.with_progress(progress.clone());
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.executor = self.executor.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn record_reader(&self) -> RecordReader {
        self.record.reader()
    }

    fn transition(&mut self, next: OrchestratorState) {
        tracing::debug!("[ORCHESTRATOR] {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    async fn emit(&self, update: ProgressUpdate) {
        progress::emit(self.progress.as_ref(), update).await;
    }

    /// Run cycles until a terminal state is reached
    pub async fn run(mut self) -> InvestigationOutcome {
        let mut last_summary: Option<Summary> = None;
        let mut cycles = 0;

        for cycle_index in 0..self.cycle_budget {
            self.record.apply_pending();
            if self.cancel.is_cancelled() {
                return self.finish_cancelled(last_summary, cycles).await;
            }

            cycles = cycle_index + 1;
            self.transition(OrchestratorState::Planning);
            self.emit(ProgressUpdate::new(
                ProgressPhase::Planning,
                format!("Planning cycle {} of {}", cycles, self.cycle_budget),
            ))
            .await;

            let snapshot = self.record.snapshot();
            let plan = match self.planner.plan(&snapshot, cycle_index).await {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::error!("[ORCHESTRATOR] Planning failed in cycle {}: {}", cycles, e);
                    return self.finish_failed(last_summary, cycles, e.to_string()).await;
                }
            };

            if plan.is_empty() {
                tracing::info!("[ORCHESTRATOR] Empty plan in cycle {}, converged", cycles);
                return self
                    .finish(
                        OrchestratorState::Converged,
                        TerminationReason::EmptyPlan,
                        last_summary,
                        cycles,
                        None,
                    )
                    .await;
            }

            self.transition(OrchestratorState::Executing);
            self.emit(
                ProgressUpdate::new(
                    ProgressPhase::Investigating,
                    format!("Executing {} steps", plan.steps.len()),
                )
                .with_details(json!({
                    "state": plan.state_summary,
                    "steps": plan.steps,
                })),
            )
            .await;

            let trace = self.executor.execute(&plan, self.turn_budget).await;
            if trace.status == TraceStatus::Error {
                tracing::warn!(
                    "[ORCHESTRATOR] Execution ended with error: {}",
                    trace.error.as_deref().unwrap_or("unknown")
                );
            }

            self.record.apply_pending();
            if self.cancel.is_cancelled() {
                return self.finish_cancelled(last_summary, cycles).await;
            }

            self.transition(OrchestratorState::Summarizing);
            self.emit(ProgressUpdate::new(
                ProgressPhase::Summarizing,
                format!(
                    "Summarizing {} turns and {} invocations",
                    trace.turns.len(),
                    trace.invocation_count()
                ),
            ))
            .await;

            let mut summary = match self.summarizer.summarize_trace(&trace).await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::error!("[ORCHESTRATOR] Summarizing failed in cycle {}: {}", cycles, e);
                    return self.finish_failed(last_summary, cycles, e.to_string()).await;
                }
            };

            let previous = self.record.snapshot().summaries;
            if !previous.is_empty() {
                if self.cancel.is_cancelled() {
                    return self.finish_cancelled(last_summary, cycles).await;
                }
                match self.summarizer.score_similarity(&previous, &summary).await {
                    Ok((score, reasoning)) => {
                        self.summarizer.apply_score(&mut summary, score, reasoning)
                    }
                    Err(e) => tracing::warn!(
                        "[ORCHESTRATOR] Similarity scoring failed, treating cycle {} as new: {}",
                        cycles,
                        e
                    ),
                }
            }

            self.record.append_summary(summary.clone());
            let redundant = summary.is_redundant;

            let mut update =
                ProgressUpdate::new(ProgressPhase::Summarizing, summary.overview.clone())
                    .with_details(json!({
                        "key_points": summary.key_points,
                        "similarity_score": summary.similarity_score,
                        "is_redundant": redundant,
                    }));
            if let Some(lead) = summary.best_location() {
                update = update.with_lead(lead.finding.clone());
            }
            self.emit(update).await;
            last_summary = Some(summary);

            if redundant {
                tracing::info!("[ORCHESTRATOR] Findings converged after {} cycles", cycles);
                return self
                    .finish(
                        OrchestratorState::Converged,
                        TerminationReason::Redundant,
                        last_summary,
                        cycles,
                        None,
                    )
                    .await;
            }
        }

        tracing::info!("[ORCHESTRATOR] Cycle budget of {} exhausted", self.cycle_budget);
        self.finish(
            OrchestratorState::Exhausted,
            TerminationReason::CycleBudgetExhausted,
            last_summary,
            cycles,
            None,
        )
        .await
    }

    async fn finish_cancelled(
        &mut self,
        last_summary: Option<Summary>,
        cycles: usize,
    ) -> InvestigationOutcome {
        tracing::warn!("[ORCHESTRATOR] Investigation cancelled");
        self.finish(
            OrchestratorState::Failed,
            TerminationReason::Cancelled,
            last_summary,
            cycles,
            Some("investigation cancelled".to_string()),
        )
        .await
    }

    async fn finish_failed(
        &mut self,
        last_summary: Option<Summary>,
        cycles: usize,
        error: String,
    ) -> InvestigationOutcome {
        self.finish(
            OrchestratorState::Failed,
            TerminationReason::Fault,
            last_summary,
            cycles,
            Some(error),
        )
        .await
    }

    async fn finish(
        &mut self,
        state: OrchestratorState,
        reason: TerminationReason,
        last_summary: Option<Summary>,
        cycles: usize,
        error: Option<String>,
    ) -> InvestigationOutcome {
        self.record.apply_pending();
        self.transition(state);

        let (phase, message) = match (&error, reason) {
            (Some(e), _) => (ProgressPhase::Error, format!("Investigation failed: {}", e)),
            (None, TerminationReason::EmptyPlan) => (
                ProgressPhase::Complete,
                "Investigation complete: nothing left to check".to_string(),
            ),
            (None, TerminationReason::Redundant) => (
                ProgressPhase::Complete,
                "Investigation complete: findings converged".to_string(),
            ),
            (None, _) => (
                ProgressPhase::Complete,
                format!("Investigation stopped after {} cycles", cycles),
            ),
        };

        let mut update = ProgressUpdate::new(phase, message)
            .with_details(json!({
                "state": state,
                "reason": reason,
                "cycles": cycles,
            }))
            .completed();
        if let Some(lead) = last_summary.as_ref().and_then(Summary::best_location) {
            update = update.with_lead(lead.finding.clone());
        }
        self.emit(update).await;

        InvestigationOutcome {
            state,
            reason,
            last_summary,
            cycles,
            error,
        }
    }
}
