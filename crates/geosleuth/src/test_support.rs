//! Test doubles: a scripted backend and misbehaving capabilities

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{
        BackendError, BackendRequest, BackendResponse, ContentBlock, InvocationRequest,
        ReasoningBackend, StopReason,
    },
    capability::{
        parse_arguments, schema_of, Capability, CapabilityError, CapabilityKind, CapabilityResult,
    },
    extract::StructuredExtractor,
    investigation::FeatureExtractor,
    prompts,
    record::SeedFeatures,
    GeoSleuthError,
};

type Scripted = Result<BackendResponse, BackendError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Planner,
    Executor,
    Summary,
    Similarity,
}

impl CallKind {
    fn of(instruction: &str) -> Self {
        if instruction == prompts::EXECUTOR_INSTRUCTION {
            CallKind::Executor
        } else if instruction == prompts::SUMMARIZER_INSTRUCTION {
            CallKind::Summary
        } else if instruction == prompts::SIMILARITY_INSTRUCTION {
            CallKind::Similarity
        } else {
            CallKind::Planner
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Default)]
struct Script {
    queued: VecDeque<Scripted>,
    /// Answer repeated once the queue is empty
    fallback: Option<Scripted>,
}

/// Backend that answers from per-stage scripts and records every request
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<[Script; 4]>,
    calls: [AtomicUsize; 4],
    requests: Mutex<Vec<BackendRequest>>,
    next_id: AtomicUsize,
    /// Token cancelled when the nth call of a kind arrives
    cancel_on: Mutex<Option<(CallKind, usize, CancellationToken)>>,
}

pub fn text_response(text: &str) -> BackendResponse {
    BackendResponse {
        content: vec![ContentBlock::Text {
            text: text.to_string(),
        }],
        stop_reason: StopReason::EndTurn,
    }
}

pub fn json_response(value: Value) -> BackendResponse {
    text_response(&StructuredExtractor::render(&value))
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, kind: CallKind, answer: Scripted) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts[kind.slot()].queued.push_back(answer);
        }
    }

    fn set_fallback(&self, kind: CallKind, answer: Scripted) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts[kind.slot()].fallback = Some(answer);
        }
    }

    pub fn push_plan(&self, plan: Value) {
        self.push(CallKind::Planner, Ok(json_response(plan)));
    }

    pub fn push_planner_text(&self, text: &str) {
        self.push(CallKind::Planner, Ok(text_response(text)));
    }

    /// Every plan from now on has these steps
    pub fn always_plan(&self, steps: &[&str]) {
        self.set_fallback(
            CallKind::Planner,
            Ok(json_response(json!({"state": "scripted", "next_steps": steps}))),
        );
    }

    pub fn push_turn(&self, response: BackendResponse) {
        self.push(CallKind::Executor, Ok(response));
    }

    pub fn push_turn_error(&self, error: BackendError) {
        self.push(CallKind::Executor, Err(error));
    }

    /// Every executor turn from now on returns this response
    pub fn always_turn(&self, response: BackendResponse) {
        self.set_fallback(CallKind::Executor, Ok(response));
    }

    pub fn push_summary(&self, summary: Value) {
        self.push(CallKind::Summary, Ok(json_response(summary)));
    }

    pub fn push_summary_text(&self, text: &str) {
        self.push(CallKind::Summary, Ok(text_response(text)));
    }

    pub fn always_summary(&self, summary: Value) {
        self.set_fallback(CallKind::Summary, Ok(json_response(summary)));
    }

    pub fn push_similarity(&self, verdict: Value) {
        self.push(CallKind::Similarity, Ok(json_response(verdict)));
    }

    pub fn push_similarity_error(&self, error: BackendError) {
        self.push(CallKind::Similarity, Err(error));
    }

    pub fn always_similarity(&self, verdict: Value) {
        self.set_fallback(CallKind::Similarity, Ok(json_response(verdict)));
    }

    /// Executor turn that requests the given invocations
    pub fn invocation_turn(
        &self,
        reasoning: &str,
        invocations: &[(&str, Value)],
    ) -> BackendResponse {
        let mut content = vec![ContentBlock::Text {
            text: reasoning.to_string(),
        }];
        for (name, arguments) in invocations {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            content.push(ContentBlock::InvocationRequest(InvocationRequest {
                id: format!("call_{}", n),
                name: name.to_string(),
                arguments: arguments.clone(),
            }));
        }
        BackendResponse {
            content,
            stop_reason: StopReason::ToolUse,
        }
    }

    pub fn calls(&self, kind: CallKind) -> usize {
        self.calls[kind.slot()].load(Ordering::SeqCst)
    }

    pub fn planner_calls(&self) -> usize {
        self.calls(CallKind::Planner)
    }

    pub fn executor_calls(&self) -> usize {
        self.calls(CallKind::Executor)
    }

    pub fn summary_calls(&self) -> usize {
        self.calls(CallKind::Summary)
    }

    pub fn similarity_calls(&self) -> usize {
        self.calls(CallKind::Similarity)
    }

    /// Cancel `token` while answering the `nth` call (from 1) of `kind`
    pub fn cancel_on(&self, kind: CallKind, nth: usize, token: CancellationToken) {
        if let Ok(mut slot) = self.cancel_on.lock() {
            *slot = Some((kind, nth, token));
        }
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn instructions(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.system_instruction)
            .collect()
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn respond(&self, request: BackendRequest) -> Result<BackendResponse, BackendError> {
        let kind = CallKind::of(&request.system_instruction);
        let count = self.calls[kind.slot()].fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(slot) = self.cancel_on.lock() {
            if let Some((on, nth, token)) = slot.as_ref() {
                if *on == kind && *nth == count {
                    token.cancel();
                }
            }
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let mut scripts = self
            .scripts
            .lock()
            .map_err(|_| BackendError::NotAvailable("script lock poisoned".into()))?;
        let script = &mut scripts[kind.slot()];
        match script.queued.pop_front() {
            Some(answer) => answer,
            None => script.fallback.clone().unwrap_or_else(|| {
                Err(BackendError::NotAvailable(format!("no scripted answer for {:?}", kind)))
            }),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EchoArgs {
    text: String,
}

pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text"
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Search
    }

    fn parameter_schema(&self) -> Value {
        schema_of::<EchoArgs>()
    }

    async fn invoke(&self, arguments: Value) -> Result<CapabilityResult, CapabilityError> {
        let args: EchoArgs = parse_arguments(arguments)?;
        Ok(CapabilityResult::ok(json!({ "echo": args.text })))
    }
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

pub struct FailingCapability;

#[async_trait]
impl Capability for FailingCapability {
    fn name(&self) -> &str {
        "always_fails"
    }

    fn description(&self) -> &str {
        "Fails every time"
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Scrape
    }

    fn parameter_schema(&self) -> Value {
        empty_schema()
    }

    async fn invoke(&self, _arguments: Value) -> Result<CapabilityResult, CapabilityError> {
        Err(CapabilityError::Request("upstream unreachable".into()))
    }
}

pub struct PanickingCapability;

#[async_trait]
impl Capability for PanickingCapability {
    fn name(&self) -> &str {
        "panics"
    }

    fn description(&self) -> &str {
        "Panics every time"
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Geocode
    }

    fn parameter_schema(&self) -> Value {
        empty_schema()
    }

    async fn invoke(&self, _arguments: Value) -> Result<CapabilityResult, CapabilityError> {
        panic!("geocoder exploded")
    }
}

pub struct SlowCapability;

#[async_trait]
impl Capability for SlowCapability {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Never answers in time"
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Scrape
    }

    fn parameter_schema(&self) -> Value {
        empty_schema()
    }

    async fn invoke(&self, _arguments: Value) -> Result<CapabilityResult, CapabilityError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(CapabilityResult::ok(json!("too late")))
    }
}

/// Extractor returning fixed features, or failing on empty input
pub struct StubExtractor {
    pub features: Value,
}

#[async_trait]
impl FeatureExtractor for StubExtractor {
    async fn extract(&self, image: &[u8]) -> crate::Result<SeedFeatures> {
        if image.is_empty() {
            return Err(GeoSleuthError::Extraction("image is empty".into()));
        }
        Ok(SeedFeatures::new(self.features.clone(), json!({"bytes": image.len()})))
    }
}
