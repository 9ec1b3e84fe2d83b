//! Configuration management for the GeoSleuth CLI
//!
//! Handles loading and saving configuration from ~/.geosleuth/config.toml

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geosleuth::InvestigationConfig;
use serde::{Deserialize, Serialize};

/// Configuration for the GeoSleuth CLI
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub investigation: InvestigationConfig,

    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Echo each capability call as it is dispatched
    #[serde(default = "default_true")]
    pub show_terminal_output: bool,

    /// Print key points of intermediate summaries
    #[serde(default)]
    pub show_details: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_terminal_output: true,
            show_details: false,
        }
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))
}

fn optional(value: &str) -> Option<String> {
    match value {
        "" | "none" => None,
        other => Some(other.to_string()),
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".geosleuth")
            .join("config.toml")
    }

    /// Load configuration from file, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.investigation.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get a configuration value by key path (e.g., "backend.model")
    pub fn get(&self, key: &str) -> Option<String> {
        let inv = &self.investigation;
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["backend", "model"] => Some(inv.backend.model.clone()),
            ["backend", "endpoint"] => inv.backend.endpoint.clone(),
            ["backend", "api_key_env"] => Some(inv.backend.api_key_env.clone()),
            ["backend", "temperature"] => Some(inv.backend.temperature.to_string()),
            ["quick", "turn_budget"] => Some(inv.quick.turn_budget.to_string()),
            ["quick", "cycle_budget"] => Some(inv.quick.cycle_budget.to_string()),
            ["deep", "turn_budget"] => Some(inv.deep.turn_budget.to_string()),
            ["deep", "cycle_budget"] => Some(inv.deep.cycle_budget.to_string()),
            ["investigation", "similarity_threshold"] => {
                Some(inv.similarity_threshold.to_string())
            }
            ["investigation", "parallel_invocations"] => {
                Some(inv.parallel_invocations.to_string())
            }
            ["capabilities", "search_endpoint"] => inv.capabilities.search_endpoint.clone(),
            ["capabilities", "geocode_endpoint"] => {
                Some(inv.capabilities.geocode_endpoint.clone())
            }
            ["capabilities", "clue_guide_path"] => inv
                .capabilities
                .clue_guide_path
                .as_ref()
                .map(|p| p.display().to_string()),
            ["display", "show_terminal_output"] => {
                Some(self.display.show_terminal_output.to_string())
            }
            ["display", "show_details"] => Some(self.display.show_details.to_string()),
            _ => None,
        }
    }

    /// Set a configuration value by key path
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let inv = &mut self.investigation;
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["backend", "model"] => inv.backend.model = value.to_string(),
            ["backend", "endpoint"] => inv.backend.endpoint = optional(value),
            ["backend", "api_key_env"] => inv.backend.api_key_env = value.to_string(),
            ["backend", "temperature"] => inv.backend.temperature = parse(key, value)?,
            ["quick", "turn_budget"] => inv.quick.turn_budget = parse(key, value)?,
            ["quick", "cycle_budget"] => inv.quick.cycle_budget = parse(key, value)?,
            ["deep", "turn_budget"] => inv.deep.turn_budget = parse(key, value)?,
            ["deep", "cycle_budget"] => inv.deep.cycle_budget = parse(key, value)?,
            ["investigation", "similarity_threshold"] => {
                inv.similarity_threshold = parse(key, value)?
            }
            ["investigation", "parallel_invocations"] => {
                inv.parallel_invocations = parse(key, value)?
            }
            ["capabilities", "search_endpoint"] => {
                inv.capabilities.search_endpoint = optional(value)
            }
            ["capabilities", "geocode_endpoint"] => {
                inv.capabilities.geocode_endpoint = value.to_string()
            }
            ["capabilities", "clue_guide_path"] => {
                inv.capabilities.clue_guide_path = optional(value).map(PathBuf::from)
            }
            ["display", "show_terminal_output"] => {
                self.display.show_terminal_output = parse(key, value)?
            }
            ["display", "show_details"] => self.display.show_details = parse(key, value)?,
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        }

        self.investigation.validate()?;
        Ok(())
    }
}
