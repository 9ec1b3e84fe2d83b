//! Planner - turns the record into an ordered list of investigation steps

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    backend::{respond_with_timeout, BackendRequest, ReasoningBackend},
    config::InvestigationConfig,
    extract::StructuredExtractor,
    prompts,
    record::RecordSnapshot,
    GeoSleuthError, Result,
};

/// One step of a plan, numbered from 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub description: String,
}

/// Plan for one cycle. No steps means no further work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub state_summary: String,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Build a plan from the backend's JSON answer.
    ///
    /// Steps may be `{"step_n", "description"}` objects or bare strings. Steps
    /// without a description are dropped and the rest renumbered 1..n.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| GeoSleuthError::PlanParse("plan is not a JSON object".into()))?;

        let raw_steps = object
            .get("next_steps")
            .ok_or_else(|| GeoSleuthError::PlanParse("plan has no next_steps field".into()))?
            .as_array()
            .ok_or_else(|| GeoSleuthError::PlanParse("next_steps is not a list".into()))?;

        let state_summary = object
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        let steps = raw_steps
            .iter()
            .filter_map(|step| match step {
                Value::String(text) => Some(text.as_str()),
                Value::Object(fields) => fields.get("description").and_then(Value::as_str),
                _ => None,
            })
            .map(str::trim)
            .filter(|description| !description.is_empty())
            .enumerate()
            .map(|(i, description)| Step {
                index: i + 1,
                description: description.to_string(),
            })
            .collect();

        Ok(Self {
            state_summary,
            steps,
        })
    }
}

/// Produces cold-start and refinement plans
pub struct Planner {
    backend: Arc<dyn ReasoningBackend>,
    max_tokens: u32,
    timeout: Duration,
}

impl Planner {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: &InvestigationConfig) -> Self {
        Self {
            backend,
            max_tokens: config.backend.planner_max_tokens,
            timeout: Duration::from_secs(config.backend.request_timeout_secs),
        }
    }

    /// Plan cycle `cycle_index`. Cycle 0 sees only the seed.
    pub async fn plan(&self, record: &RecordSnapshot, cycle_index: usize) -> Result<Plan> {
        let (instruction, message) = if cycle_index == 0 {
            (prompts::PLANNER_INSTRUCTION, prompts::initial_plan_message(record))
        } else {
            (
                prompts::REFINE_PLANNER_INSTRUCTION,
                prompts::refine_plan_message(record, cycle_index),
            )
        };

        tracing::info!("[PLANNER] Planning cycle {}", cycle_index + 1);
        let request = BackendRequest::single(instruction, message, self.max_tokens);
        let response = respond_with_timeout(self.backend.as_ref(), request, self.timeout).await?;

        let text = response.text();
        let value = StructuredExtractor::extract(&text).map_err(|e| {
            tracing::error!("[PLANNER] Could not read plan: {}", e);
            GeoSleuthError::PlanParse(e.to_string())
        })?;
        let plan = Plan::from_value(&value)?;

        tracing::info!(
            "[PLANNER] Cycle {} plan has {} steps",
            cycle_index + 1,
            plan.steps.len()
        );
        Ok(plan)
    }
}
