//! # GeoSleuth - Agentic Geolocation Investigations
//!
//! Turns clues extracted from an image into a location hypothesis by running a
//! bounded "plan → execute → summarize" cycle against a reasoning backend.
//!
//! ## Components
//!
//! - **Planner**: builds or refines an ordered list of investigation steps
//! - **Executor**: the tool-calling loop that lets the backend invoke capabilities
//! - **Summarizer**: condenses an execution trace and scores it against prior findings
//! - **Orchestrator**: sequences the stages and decides when findings have converged
//! - **Capabilities**: web search, page fetch, geocoding, clue guide and case file access

pub mod backend;
pub mod capability;
pub mod config;
pub mod executor;
pub mod extract;
pub mod investigation;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod summarizer;

#[cfg(test)]
mod executor_tests;
#[cfg(test)]
mod summarizer_tests;
#[cfg(test)]
mod test_support;

pub use backend::{
    AnthropicBackend, BackendError, BackendRequest, BackendResponse, ContentBlock,
    InvocationRequest, ReasoningBackend, StopReason, TranscriptMessage,
};
pub use capability::{
    Capability, CapabilityError, CapabilityKind, CapabilityRegistry, CapabilityResult,
    ManifestEntry,
};
pub use config::{BackendConfig, CapabilitiesConfig, InvestigationConfig, ModeBudgets};
pub use executor::{
    ExecutionTrace, ExecutionTurn, Executor, Invocation, StopSignal, TraceStatus,
};
pub use extract::{Extraction, ParseError, StructuredExtractor};
pub use investigation::{
    FeatureExtractor, InvestigationHandle, InvestigationHost, InvestigationId, InvestigationMode,
};
pub use orchestrator::{InvestigationOutcome, Orchestrator, OrchestratorState, TerminationReason};
pub use planner::{Plan, Planner, Step};
pub use progress::{ProgressPhase, ProgressSender, ProgressUpdate};
pub use record::{
    Correction, FindingSink, RecordReader, RecordSnapshot, SeedFeatures,
    SharedInvestigationRecord, UserFeedback, ValidatedFinding,
};
pub use summarizer::{Confidence, KeyPoint, KeyPointCategory, Summarizer, Summary};

/// Main error types for GeoSleuth operations
#[derive(Debug, thiserror::Error)]
pub enum GeoSleuthError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Plan parse error: {0}")]
    PlanParse(String),

    #[error("Feature extraction error: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Investigation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GeoSleuthError>;
