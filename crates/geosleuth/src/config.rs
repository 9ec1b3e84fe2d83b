//! Configuration for GeoSleuth investigations

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{investigation::InvestigationMode, GeoSleuthError, Result};

/// Reasoning backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_planner_max_tokens")]
    pub planner_max_tokens: u32,
    #[serde(default = "default_executor_max_tokens")]
    pub executor_max_tokens: u32,
    #[serde(default = "default_summarizer_max_tokens")]
    pub summarizer_max_tokens: u32,
    #[serde(default = "default_similarity_max_tokens")]
    pub similarity_max_tokens: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            endpoint: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
            planner_max_tokens: default_planner_max_tokens(),
            executor_max_tokens: default_executor_max_tokens(),
            summarizer_max_tokens: default_summarizer_max_tokens(),
            similarity_max_tokens: default_similarity_max_tokens(),
        }
    }
}

/// Turn and cycle budgets for one investigation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeBudgets {
    pub turn_budget: usize,
    pub cycle_budget: usize,
}

/// Settings for the bundled capability adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesConfig {
    /// SearxNG-compatible search endpoint (`/search?format=json`)
    #[serde(default)]
    pub search_endpoint: Option<String>,
    #[serde(default = "default_geocode_endpoint")]
    pub geocode_endpoint: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Path to the country clue guide JSON database
    #[serde(default)]
    pub clue_guide_path: Option<PathBuf>,
    #[serde(default = "default_page_char_limit")]
    pub page_char_limit: usize,
    #[serde(default = "default_search_results")]
    pub default_search_results: usize,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            search_endpoint: None,
            geocode_endpoint: default_geocode_endpoint(),
            user_agent: default_user_agent(),
            clue_guide_path: None,
            page_char_limit: default_page_char_limit(),
            default_search_results: default_search_results(),
        }
    }
}

/// Core configuration for an investigation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    /// Maximum reasoning turns per executor run. Submitted investigations
    /// replace both budgets with those of their mode.
    #[serde(default = "default_turn_budget")]
    pub turn_budget: usize,
    /// Maximum plan/execute/summarize cycles
    #[serde(default = "default_cycle_budget")]
    pub cycle_budget: usize,
    #[serde(default = "default_quick_budgets")]
    pub quick: ModeBudgets,
    #[serde(default = "default_deep_budgets")]
    pub deep: ModeBudgets,
    /// Similarity score at or above which new findings count as redundant
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Characters of per-turn reasoning kept when rendering a trace for summarization
    #[serde(default = "default_reasoning_excerpt_chars")]
    pub reasoning_excerpt_chars: usize,
    #[serde(default = "default_result_excerpt_chars")]
    pub result_excerpt_chars: usize,
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,
    /// Dispatch the invocations of one turn concurrently
    #[serde(default = "default_true")]
    pub parallel_invocations: bool,
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
}

fn default_true() -> bool {
    true
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_planner_max_tokens() -> u32 {
    4000
}

fn default_executor_max_tokens() -> u32 {
    4096
}

fn default_summarizer_max_tokens() -> u32 {
    2000
}

fn default_similarity_max_tokens() -> u32 {
    1000
}

fn default_turn_budget() -> usize {
    20
}

fn default_cycle_budget() -> usize {
    5
}

fn default_quick_budgets() -> ModeBudgets {
    ModeBudgets {
        turn_budget: 10,
        cycle_budget: 5,
    }
}

fn default_deep_budgets() -> ModeBudgets {
    ModeBudgets {
        turn_budget: 25,
        cycle_budget: 10,
    }
}

fn default_similarity_threshold() -> f64 {
    0.42
}

fn default_reasoning_excerpt_chars() -> usize {
    300
}

fn default_result_excerpt_chars() -> usize {
    200
}

fn default_invocation_timeout_secs() -> u64 {
    60
}

fn default_progress_capacity() -> usize {
    64
}

fn default_geocode_endpoint() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_user_agent() -> String {
    "GeoSleuth/0.1 (geolocation investigations)".to_string()
}

fn default_page_char_limit() -> usize {
    50_000
}

fn default_search_results() -> usize {
    5
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            turn_budget: default_turn_budget(),
            cycle_budget: default_cycle_budget(),
            quick: default_quick_budgets(),
            deep: default_deep_budgets(),
            similarity_threshold: default_similarity_threshold(),
            reasoning_excerpt_chars: default_reasoning_excerpt_chars(),
            result_excerpt_chars: default_result_excerpt_chars(),
            invocation_timeout_secs: default_invocation_timeout_secs(),
            parallel_invocations: true,
            progress_capacity: default_progress_capacity(),
            capabilities: CapabilitiesConfig::default(),
        }
    }
}

impl InvestigationConfig {
    /// Copy of this configuration with the budgets of the given mode applied
    pub fn for_mode(&self, mode: InvestigationMode) -> Self {
        let budgets = match mode {
            InvestigationMode::Quick => self.quick,
            InvestigationMode::Deep => self.deep,
        };
        Self {
            turn_budget: budgets.turn_budget,
            cycle_budget: budgets.cycle_budget,
            ..self.clone()
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.turn_budget == 0 {
            return Err(GeoSleuthError::Config("turn_budget must be at least 1".into()));
        }
        if self.cycle_budget == 0 {
            return Err(GeoSleuthError::Config("cycle_budget must be at least 1".into()));
        }
        for (mode, budgets) in [("quick", self.quick), ("deep", self.deep)] {
            if budgets.turn_budget == 0 || budgets.cycle_budget == 0 {
                return Err(GeoSleuthError::Config(format!(
                    "{} mode budgets must be at least 1",
                    mode
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(GeoSleuthError::Config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.progress_capacity == 0 {
            return Err(GeoSleuthError::Config("progress_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
