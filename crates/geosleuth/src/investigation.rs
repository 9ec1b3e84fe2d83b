//! Investigation submission
//!
//! The host turns an image (or already extracted features) into a running
//! investigation: a fresh record, a capability registry bound to it and an
//! orchestrator in its own tokio task. Callers get a handle with the progress
//! receiver, a feedback appender, a cancellation token and the join handle.

use std::{str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    backend::ReasoningBackend,
    capability::CapabilityRegistry,
    config::InvestigationConfig,
    orchestrator::{InvestigationOutcome, Orchestrator},
    progress::{self, ProgressPhase, ProgressSender, ProgressUpdate},
    record::{self, PendingAppends, SeedFeatures, SharedInvestigationRecord, UserFeedback},
    GeoSleuthError, Result,
};

pub type InvestigationId = Uuid;

/// Budget profile requested by the submitter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestigationMode {
    #[default]
    Quick,
    Deep,
}

impl FromStr for InvestigationMode {
    type Err = GeoSleuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "deep" => Ok(Self::Deep),
            other => Err(GeoSleuthError::Config(format!(
                "unknown investigation mode '{}', expected quick or deep",
                other
            ))),
        }
    }
}

impl std::fmt::Display for InvestigationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quick => f.write_str("quick"),
            Self::Deep => f.write_str("deep"),
        }
    }
}

/// Turns raw image bytes into seed features
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract(&self, image: &[u8]) -> Result<SeedFeatures>;
}

/// A running investigation
pub struct InvestigationHandle {
    pub id: InvestigationId,
    pub progress: mpsc::Receiver<ProgressUpdate>,
    pub feedback: UserFeedback,
    pub cancel: CancellationToken,
    task: JoinHandle<InvestigationOutcome>,
}

impl InvestigationHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the investigation to end
    pub async fn join(self) -> InvestigationOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("[HOST] Investigation {} task failed: {}", self.id, e);
                InvestigationOutcome::failed(format!("investigation task failed: {}", e))
            }
        }
    }
}

enum SeedSource {
    Image(Vec<u8>),
    Features(SeedFeatures),
}

/// Starts investigations, one tokio task each
pub struct InvestigationHost {
    backend: Arc<dyn ReasoningBackend>,
    extractor: Option<Arc<dyn FeatureExtractor>>,
    config: InvestigationConfig,
}

impl InvestigationHost {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: InvestigationConfig) -> Self {
        Self {
            backend,
            extractor: None,
            config,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn config(&self) -> &InvestigationConfig {
        &self.config
    }

    /// Start an investigation from raw image bytes
    pub fn submit(&self, image: Vec<u8>, mode: InvestigationMode) -> Result<InvestigationHandle> {
        if self.extractor.is_none() {
            return Err(GeoSleuthError::Config(
                "no feature extractor configured for image submissions".into(),
            ));
        }
        self.spawn(SeedSource::Image(image), mode)
    }

    /// Start an investigation from already extracted features
    pub fn submit_features(
        &self,
        seed: SeedFeatures,
        mode: InvestigationMode,
    ) -> Result<InvestigationHandle> {
        self.spawn(SeedSource::Features(seed), mode)
    }

    fn spawn(&self, source: SeedSource, mode: InvestigationMode) -> Result<InvestigationHandle> {
        let config = self.config.for_mode(mode);
        config.validate()?;

        let id = Uuid::new_v4();
        let (progress_tx, progress_rx) = progress::channel(config.progress_capacity);
        let (feedback, pending) = record::feedback_channel();
        let cancel = CancellationToken::new();

        tracing::info!(
            "[HOST] Starting investigation {} ({} mode: {} turns, {} cycles)",
            id,
            mode,
            config.turn_budget,
            config.cycle_budget
        );

        let run = InvestigationRun {
            id,
            backend: self.backend.clone(),
            extractor: self.extractor.clone(),
            config,
            progress: progress_tx,
            pending,
            feedback: feedback.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(run.run(source));

        Ok(InvestigationHandle {
            id,
            progress: progress_rx,
            feedback,
            cancel,
            task,
        })
    }
}

/// Everything one investigation task owns
struct InvestigationRun {
    id: InvestigationId,
    backend: Arc<dyn ReasoningBackend>,
    extractor: Option<Arc<dyn FeatureExtractor>>,
    config: InvestigationConfig,
    progress: ProgressSender,
    pending: PendingAppends,
    feedback: UserFeedback,
    cancel: CancellationToken,
}

impl InvestigationRun {
    async fn run(self, source: SeedSource) -> InvestigationOutcome {
        let seed = match self.seed(source).await {
            Ok(seed) => seed,
            Err(e) => {
                tracing::error!("[HOST] Feature extraction failed for {}: {}", self.id, e);
                self.progress
                    .send(
                        ProgressUpdate::new(
                            ProgressPhase::Error,
                            format!("Feature extraction failed: {}", e),
                        )
                        .completed(),
                    )
                    .await;
                return InvestigationOutcome::failed(e.to_string());
            }
        };

        let record = SharedInvestigationRecord::with_feedback(seed, self.feedback, self.pending);
        let registry = Arc::new(CapabilityRegistry::with_defaults(
            &self.config,
            record.reader(),
            record.finding_sink(),
        ));

        let outcome = Orchestrator::new(self.backend, registry, record, &self.config)
            .with_progress(self.progress)
            .with_cancellation(self.cancel)
            .run()
            .await;

        tracing::info!(
            "[HOST] Investigation {} finished: {:?} ({:?}) after {} cycles",
            self.id,
            outcome.state,
            outcome.reason,
            outcome.cycles
        );
        outcome
    }

    async fn seed(&self, source: SeedSource) -> Result<SeedFeatures> {
        let seed = match source {
            SeedSource::Features(seed) => seed,
            SeedSource::Image(image) => {
                let extractor = self.extractor.as_ref().ok_or_else(|| {
                    GeoSleuthError::Config("no feature extractor configured".into())
                })?;
                self.progress
                    .send(ProgressUpdate::new(
                        ProgressPhase::Extracting,
                        format!("Extracting features from {} byte image", image.len()),
                    ))
                    .await;
                let timeout = Duration::from_secs(self.config.backend.request_timeout_secs);
                tokio::time::timeout(timeout, extractor.extract(&image))
                    .await
                    .map_err(|_| {
                        GeoSleuthError::Extraction("feature extraction timed out".into())
                    })??
            }
        };

        let seed = if seed.source.is_none() {
            seed.with_source(self.id.to_string())
        } else {
            seed
        };

        self.progress
            .send(
                ProgressUpdate::new(
                    ProgressPhase::Extracting,
                    format!("Extracted {} features", seed.feature_count()),
                )
                .with_details(seed.features.clone()),
            )
            .await;
        Ok(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("quick".parse::<InvestigationMode>().unwrap(), InvestigationMode::Quick);
        assert_eq!(" DEEP ".parse::<InvestigationMode>().unwrap(), InvestigationMode::Deep);
        assert!("thorough".parse::<InvestigationMode>().is_err());
        assert_eq!(InvestigationMode::Deep.to_string(), "deep");
        assert_eq!(InvestigationMode::default(), InvestigationMode::Quick);
    }
}
