//! Executor - the agentic tool-calling loop
//!
//! Each turn sends the full transcript plus the capability manifest to the
//! backend. Invocation requests are dispatched through the registry and their
//! results appended to the transcript before the next turn. The loop ends when
//! the backend answers without requesting anything or the turn budget runs out.

use std::{collections::HashSet, sync::Arc, time::Duration, time::Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{
        respond_with_timeout, BackendRequest, ContentBlock, InvocationRequest, ReasoningBackend,
        TranscriptMessage,
    },
    capability::{CapabilityRegistry, CapabilityResult},
    config::InvestigationConfig,
    planner::Plan,
    progress::{self, ProgressPhase, ProgressSender, ProgressUpdate},
    prompts,
};

const CANCELLED: &str = "investigation cancelled";

/// Whether the loop should keep going after a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StopSignal {
    Continue,
    Done,
}

/// One dispatched capability call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub request_id: String,
    pub capability_name: String,
    pub arguments: Value,
    pub result: CapabilityResult,
    pub elapsed_ms: u64,
    /// Same capability and arguments were already invoked in this run
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTurn {
    pub turn_index: usize,
    pub reasoning_text: String,
    pub invocations: Vec<Invocation>,
    pub stop_signal: StopSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    /// The backend signalled it was done
    Completed,
    /// Turn budget ran out first
    Partial,
    /// Backend fault or cancellation
    Error,
}

/// Full record of one executor run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub status: TraceStatus,
    pub turns: Vec<ExecutionTurn>,
    pub final_text: String,
    pub error: Option<String>,
    pub total_steps: usize,
    pub turn_budget: usize,
}

impl ExecutionTrace {
    pub fn invocation_count(&self) -> usize {
        self.turns.iter().map(|t| t.invocations.len()).sum()
    }
}

/// Signature of an invocation: name plus arguments with object keys sorted
fn canonical_signature(name: &str, arguments: &Value) -> String {
    fn write_canonical(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&Value::String(key.clone()).to_string());
                    out.push(':');
                    write_canonical(&map[key], out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_canonical(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut signature = format!("{}:", name);
    write_canonical(arguments, &mut signature);
    signature
}

/// Remembers invocation signatures of one run
#[derive(Debug, Default)]
struct InvocationLedger {
    seen: HashSet<String>,
}

impl InvocationLedger {
    /// Record an invocation, returning true when it was seen before
    fn record(&mut self, name: &str, arguments: &Value) -> bool {
        !self.seen.insert(canonical_signature(name, arguments))
    }
}

/// Drives the reasoning backend through a plan
pub struct Executor {
    backend: Arc<dyn ReasoningBackend>,
    registry: Arc<CapabilityRegistry>,
    max_tokens: u32,
    timeout: Duration,
    parallel: bool,
    progress: Option<ProgressSender>,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        registry: Arc<CapabilityRegistry>,
        config: &InvestigationConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            max_tokens: config.backend.executor_max_tokens,
            timeout: Duration::from_secs(config.backend.request_timeout_secs),
            parallel: config.parallel_invocations,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the plan for at most `budget` turns. Never fails; faults end up in the trace.
    pub async fn execute(&self, plan: &Plan, budget: usize) -> ExecutionTrace {
        let manifest = self.registry.manifest();
        let mut transcript = vec![TranscriptMessage::user(prompts::execution_seed(plan))];
        let mut ledger = InvocationLedger::default();
        let mut turns: Vec<ExecutionTurn> = Vec::new();
        let mut last_reasoning = String::new();

        let trace = |status, turns, final_text, error| ExecutionTrace {
            status,
            turns,
            final_text,
            error,
            total_steps: plan.steps.len(),
            turn_budget: budget,
        };

        tracing::info!(
            "[EXECUTOR] Starting: {} steps, budget {} turns, {} capabilities",
            plan.steps.len(),
            budget,
            manifest.len()
        );

        for turn_index in 0..budget {
            if self.cancel.is_cancelled() {
                tracing::warn!("[EXECUTOR] Cancelled before turn {}", turn_index + 1);
                return trace(
                    TraceStatus::Error,
                    turns,
                    last_reasoning,
                    Some(CANCELLED.to_string()),
                );
            }

            let request = BackendRequest {
                system_instruction: prompts::EXECUTOR_INSTRUCTION.to_string(),
                transcript: transcript.clone(),
                manifest: manifest.clone(),
                max_output_tokens: self.max_tokens,
            };

            let response =
                match respond_with_timeout(self.backend.as_ref(), request, self.timeout).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!(
                            "[EXECUTOR] Backend failed on turn {}: {}",
                            turn_index + 1,
                            e
                        );
                        let error = Some(e.to_string());
                        return trace(TraceStatus::Error, turns, last_reasoning, error);
                    }
                };

            let reasoning_text = response.text();
            if !reasoning_text.trim().is_empty() {
                last_reasoning = reasoning_text.clone();
            }
            let requests = response.invocation_requests();

            if requests.is_empty() {
                tracing::info!("[EXECUTOR] Backend finished after {} turns", turn_index + 1);
                turns.push(ExecutionTurn {
                    turn_index,
                    reasoning_text: reasoning_text.clone(),
                    invocations: Vec::new(),
                    stop_signal: StopSignal::Done,
                });
                return trace(TraceStatus::Completed, turns, reasoning_text, None);
            }

            tracing::info!(
                "[EXECUTOR] Turn {}: {} invocation(s) requested",
                turn_index + 1,
                requests.len()
            );
            transcript.push(TranscriptMessage::assistant(response.content));

            let invocations = self.dispatch(requests, &mut ledger).await;
            transcript.push(TranscriptMessage::invocation_results(
                invocations
                    .iter()
                    .map(|invocation| ContentBlock::InvocationResult {
                        request_id: invocation.request_id.clone(),
                        content: invocation.result.to_transcript_content(),
                        is_error: !invocation.result.success,
                    })
                    .collect(),
            ));

            turns.push(ExecutionTurn {
                turn_index,
                reasoning_text,
                invocations,
                stop_signal: StopSignal::Continue,
            });
        }

        tracing::warn!("[EXECUTOR] Turn budget of {} exhausted", budget);
        trace(TraceStatus::Partial, turns, last_reasoning, None)
    }

    /// Run one turn's invocations, returning them in emission order
    async fn dispatch(
        &self,
        requests: Vec<InvocationRequest>,
        ledger: &mut InvocationLedger,
    ) -> Vec<Invocation> {
        let duplicates: Vec<bool> = requests
            .iter()
            .map(|request| {
                let duplicate = ledger.record(&request.name, &request.arguments);
                if duplicate {
                    tracing::warn!(
                        "[EXECUTOR] Duplicate invocation: {} {}",
                        request.name,
                        request.arguments
                    );
                }
                duplicate
            })
            .collect();

        for request in &requests {
            progress::emit(
                self.progress.as_ref(),
                ProgressUpdate::new(
                    ProgressPhase::Investigating,
                    format!("Calling {}", request.name),
                )
                .with_details(request.arguments.clone())
                .with_terminal_output(format!("> {} {}", request.name, request.arguments)),
            )
            .await;
        }

        let registry = &self.registry;
        let calls = requests
            .into_iter()
            .zip(duplicates)
            .map(|(request, duplicate)| async move {
                let started = Instant::now();
                let result = registry.invoke(&request.name, request.arguments.clone()).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::debug!(
                    "[EXECUTOR] {} finished in {}ms (success: {})",
                    request.name,
                    elapsed_ms,
                    result.success
                );
                Invocation {
                    request_id: request.id,
                    capability_name: request.name,
                    arguments: request.arguments,
                    result,
                    elapsed_ms,
                    duplicate,
                }
            });

        if self.parallel {
            join_all(calls).await
        } else {
            let mut invocations = Vec::new();
            for call in calls {
                invocations.push(call.await);
            }
            invocations
        }
    }
}
