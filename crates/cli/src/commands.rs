//! CLI subcommand handlers

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use colored::Colorize;
use geosleuth::{
    AnthropicBackend, CapabilityRegistry, InvestigationHost, InvestigationMode, SeedFeatures,
    SharedInvestigationRecord,
};
use serde_json::{json, Value};

use crate::{config::Config, output::OutputHandler};

/// Options for a single investigation run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub features: PathBuf,
    pub metadata: Option<PathBuf>,
    pub mode: InvestigationMode,
    pub turns: Option<usize>,
    pub cycles: Option<usize>,
    pub threshold: Option<f64>,
    pub hints: Vec<String>,
    pub corrections: Vec<String>,
    pub json: bool,
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Load seed features from a JSON file
///
/// Accepts either a bare feature object or `{"features": ..., "metadata": ...}`.
/// A separate metadata file takes precedence over embedded metadata.
pub fn load_seed(features: &Path, metadata: Option<&Path>) -> Result<SeedFeatures> {
    let document = read_json(features)?;
    let (features_value, embedded_metadata) = match document {
        Value::Object(mut map) if map.contains_key("features") => {
            let features = map.remove("features").unwrap_or(Value::Null);
            let metadata = map.remove("metadata").unwrap_or_else(|| json!({}));
            (features, metadata)
        }
        Value::Object(map) => (Value::Object(map), json!({})),
        _ => anyhow::bail!("{} must contain a JSON object", features.display()),
    };

    let metadata = match metadata {
        Some(path) => read_json(path)?,
        None => embedded_metadata,
    };

    Ok(SeedFeatures::new(features_value, metadata))
}

/// Split a `guess=correction` pair
pub fn parse_correction(raw: &str) -> Result<(String, String)> {
    let (guess, correction) = raw
        .split_once('=')
        .with_context(|| format!("Invalid correction '{}'. Use: guess=correction", raw))?;
    let (guess, correction) = (guess.trim(), correction.trim());
    if guess.is_empty() || correction.is_empty() {
        anyhow::bail!("Invalid correction '{}'. Use: guess=correction", raw);
    }
    Ok((guess.to_string(), correction.to_string()))
}

/// Apply command line overrides to the budgets of the chosen mode
fn apply_overrides(config: &mut Config, options: &RunOptions) {
    let investigation = &mut config.investigation;
    let budgets = match options.mode {
        InvestigationMode::Quick => &mut investigation.quick,
        InvestigationMode::Deep => &mut investigation.deep,
    };
    if let Some(turns) = options.turns {
        budgets.turn_budget = turns;
    }
    if let Some(cycles) = options.cycles {
        budgets.cycle_budget = cycles;
    }
    if let Some(threshold) = options.threshold {
        investigation.similarity_threshold = threshold;
    }
}

/// Run one investigation to completion, returning whether it succeeded
pub async fn run_investigation(mut config: Config, options: RunOptions) -> Result<bool> {
    let output = OutputHandler::new(
        config.display.show_terminal_output,
        config.display.show_details,
    );

    apply_overrides(&mut config, &options);
    let corrections = options
        .corrections
        .iter()
        .map(String::as_str)
        .map(parse_correction)
        .collect::<Result<Vec<_>>>()?;
    let seed = load_seed(&options.features, options.metadata.as_deref())?;
    let feature_count = seed.feature_count();

    let backend = AnthropicBackend::new(&config.investigation.backend);
    if !backend.is_configured() {
        output.print_warning(&format!(
            "{} is not set; backend calls will fail",
            config.investigation.backend.api_key_env
        ));
    }

    let host = InvestigationHost::new(Arc::new(backend), config.investigation.clone());
    let mut handle = host.submit_features(seed, options.mode)?;
    tracing::debug!("Submitted investigation {}", handle.id);

    for hint in &options.hints {
        handle.feedback.add_context_hint(hint.clone());
    }
    for (guess, correction) in corrections {
        handle.feedback.add_correction(guess, correction);
    }

    if !options.json {
        output.print_banner(&handle.id.to_string(), &options.mode.to_string(), feature_count);
    }

    let mut cancelling = false;
    loop {
        tokio::select! {
            update = handle.progress.recv() => match update {
                Some(update) if options.json => println!("{}", serde_json::to_string(&update)?),
                Some(update) => output.print_progress(&update),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancelling => {
                output.print_warning("Cancelling investigation...");
                handle.cancel();
                cancelling = true;
            }
        }
    }

    let outcome = handle.join().await;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        output.print_outcome(&outcome);
    }
    Ok(outcome.is_success())
}

/// List the capabilities an investigation would get with this configuration
pub fn list_capabilities(config: &Config) -> Result<()> {
    let output = OutputHandler::new(false, false);
    output.print_header("Capabilities");

    let record = SharedInvestigationRecord::new(SeedFeatures::new(json!({}), json!({})));
    let registry = CapabilityRegistry::with_defaults(
        &config.investigation,
        record.reader(),
        record.finding_sink(),
    );
    output.print_manifest(&registry.manifest());

    if config.investigation.capabilities.search_endpoint.is_none() {
        output.print_info("web_search is disabled: set capabilities.search_endpoint to enable it");
    }
    if config.investigation.capabilities.clue_guide_path.is_none() {
        output.print_info(
            "clue_guide_search is disabled: set capabilities.clue_guide_path to enable it",
        );
    }
    Ok(())
}

fn print_value(key: &str, value: Option<String>) {
    match value {
        Some(value) => println!("    {} = \"{}\"", key.dimmed(), value),
        None => println!("    {} = {}", key.dimmed(), "not set".dimmed()),
    }
}

/// Show configuration
pub fn show_config(config: &Config) -> Result<()> {
    let output = OutputHandler::new(false, false);

    output.print_header("Configuration");
    println!("  {} {}", "File:".dimmed(), Config::config_path().display());

    let sections: [(&str, &[&str]); 6] = [
        ("backend", &["model", "endpoint", "api_key_env", "temperature"]),
        (
            "investigation",
            &["similarity_threshold", "parallel_invocations"],
        ),
        ("quick", &["turn_budget", "cycle_budget"]),
        ("deep", &["turn_budget", "cycle_budget"]),
        (
            "capabilities",
            &["search_endpoint", "geocode_endpoint", "clue_guide_path"],
        ),
        ("display", &["show_terminal_output", "show_details"]),
    ];

    for (section, keys) in sections {
        println!();
        println!("  {}", format!("[{}]", section).bright_cyan());
        for key in keys {
            print_value(key, config.get(&format!("{}.{}", section, key)));
        }
    }
    println!();

    Ok(())
}

/// Set a configuration value
pub fn set_config(kv: &str) -> Result<()> {
    let output = OutputHandler::new(false, false);

    let Some((key, value)) = kv.split_once('=') else {
        output.print_error("Invalid format. Use: key=value");
        return Ok(());
    };
    let key = key.trim();
    let value = value.trim().trim_matches('"');

    let mut config = Config::load()?;
    match config.set(key, value).and_then(|()| config.save()) {
        Ok(()) => {
            output.print_success(&format!("Set {} = \"{}\"", key, value));
        }
        Err(e) => {
            output.print_error(&format!("Failed to set config: {}", e));
        }
    }

    Ok(())
}
