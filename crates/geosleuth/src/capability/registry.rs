//! Name-to-capability registry and fault-isolating dispatch

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;

use super::{
    CaseFileCapability, ClueGuideCapability, Capability, CapabilityError, CapabilityResult,
    FetchPageCapability, GeocodeCapability, ManifestEntry, WebSearchCapability,
};
use crate::{
    config::InvestigationConfig,
    record::{FindingSink, RecordReader},
    GeoSleuthError, Result,
};

const UNKNOWN_CAPABILITY: &str = "unknown capability";

/// Registry of capabilities, in registration order
pub struct CapabilityRegistry {
    capabilities: IndexMap<String, Arc<dyn Capability>>,
    invocation_timeout: Duration,
}

impl CapabilityRegistry {
    pub fn new(invocation_timeout: Duration) -> Self {
        Self {
            capabilities: IndexMap::new(),
            invocation_timeout,
        }
    }

    /// Registry with every bundled capability.
    ///
    /// `web_search` is only registered when a search endpoint is configured and
    /// `clue_guide_search` only when the guide file loads.
    pub fn with_defaults(
        config: &InvestigationConfig,
        reader: RecordReader,
        findings: FindingSink,
    ) -> Self {
        let mut registry = Self::new(Duration::from_secs(config.invocation_timeout_secs));
        let caps = &config.capabilities;

        let mut bundled: Vec<Arc<dyn Capability>> = Vec::new();
        match &caps.search_endpoint {
            Some(endpoint) => bundled.push(Arc::new(WebSearchCapability::new(
                endpoint.clone(),
                caps.default_search_results,
            ))),
            None => {
                tracing::warn!("[CAPABILITY] No search endpoint configured, web_search disabled")
            }
        }
        bundled.push(Arc::new(FetchPageCapability::new(
            caps.user_agent.clone(),
            caps.page_char_limit,
        )));
        bundled.push(Arc::new(GeocodeCapability::new(
            caps.geocode_endpoint.clone(),
            caps.user_agent.clone(),
        )));
        if let Some(path) = &caps.clue_guide_path {
            match ClueGuideCapability::load(path) {
                Ok(guide) => bundled.push(Arc::new(guide)),
                Err(e) => tracing::warn!(
                    "[CAPABILITY] Clue guide at {} unavailable: {}",
                    path.display(),
                    e
                ),
            }
        }
        bundled.push(Arc::new(CaseFileCapability::new(reader, findings)));

        for capability in bundled {
            if let Err(e) = registry.register(capability) {
                tracing::warn!("[CAPABILITY] {}", e);
            }
        }

        tracing::info!(
            "[CAPABILITY] Registered {} capabilities: {}",
            registry.len(),
            registry.names().join(", ")
        );
        registry
    }

    /// Register a capability. Names must be unique.
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<()> {
        let name = capability.name().to_string();
        if self.capabilities.contains_key(&name) {
            return Err(GeoSleuthError::Config(format!(
                "capability '{}' is already registered",
                name
            )));
        }
        self.capabilities.insert(name, capability);
        Ok(())
    }

    pub fn with(mut self, capability: Arc<dyn Capability>) -> Result<Self> {
        self.register(capability)?;
        Ok(self)
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Manifest advertised to the reasoning backend
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.capabilities
            .values()
            .map(|capability| capability.manifest_entry())
            .collect()
    }

    /// Invoke a capability by name.
    ///
    /// Never fails: unknown names, returned errors, panics and timeouts all
    /// become `CapabilityResult { success: false, .. }`.
    pub async fn invoke(&self, name: &str, arguments: Value) -> CapabilityResult {
        let Some(capability) = self.resolve(name) else {
            tracing::warn!("[CAPABILITY] Backend requested unknown capability '{}'", name);
            return CapabilityResult::failure(UNKNOWN_CAPABILITY);
        };

        let call = AssertUnwindSafe(capability.invoke(arguments)).catch_unwind();
        match tokio::time::timeout(self.invocation_timeout, call).await {
            Ok(Ok(Ok(result))) => result.normalized(),
            Ok(Ok(Err(e))) => {
                tracing::warn!("[CAPABILITY] {} failed: {}", name, e);
                CapabilityResult::failure(e.to_string())
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("[CAPABILITY] {} panicked: {}", name, message);
                CapabilityResult::failure(format!("capability panicked: {}", message))
            }
            Err(_) => {
                let e = CapabilityError::Timeout {
                    limit: self.invocation_timeout,
                };
                tracing::warn!("[CAPABILITY] {} {}", name, e);
                CapabilityResult::failure(e.to_string())
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
