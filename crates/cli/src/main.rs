//! GeoSleuth CLI - run geolocation investigations from the terminal
//!
//! Reads clues extracted from an image, runs the plan / execute / summarize
//! cycle against the configured reasoning backend and prints the best lead.

mod commands;
mod config;
mod output;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{Parser, Subcommand};
use geosleuth::InvestigationMode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// GeoSleuth CLI - Agentic Geolocation Investigations
#[derive(Parser)]
#[command(name = "geosleuth")]
#[command(author = "GeoSleuth Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Locate where a photo was taken from its extracted clues")]
#[command(long_about = r#"
GeoSleuth plans an investigation from the clues found in an image, lets the
reasoning backend search, fetch pages and geocode candidates, then summarizes
what it learned until the findings stop changing.

Examples:
  geosleuth run --features clues.json                 # Quick investigation
  geosleuth run --features clues.json --mode deep     # Larger budgets
  geosleuth run --features clues.json --hint "Taken in winter"
  geosleuth capabilities                              # What the backend can call
  geosleuth config --set capabilities.search_endpoint=http://localhost:8888/search
"#)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an investigation from extracted features
    Run {
        /// JSON file with the extracted features
        #[arg(short, long)]
        features: PathBuf,

        /// JSON file with image metadata (EXIF and similar)
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Investigation mode: quick or deep
        #[arg(long, env = "GEOSLEUTH_MODE", default_value = "quick")]
        mode: InvestigationMode,

        /// Override the turn budget of the chosen mode
        #[arg(long)]
        turns: Option<usize>,

        /// Override the cycle budget of the chosen mode
        #[arg(long)]
        cycles: Option<usize>,

        /// Similarity score at which findings count as converged
        #[arg(long)]
        threshold: Option<f64>,

        /// Context hint for the planner (repeatable)
        #[arg(long = "hint")]
        hints: Vec<String>,

        /// Correct an earlier wrong guess, as guess=correction (repeatable)
        #[arg(long = "correct")]
        corrections: Vec<String>,

        /// Print progress and the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the capabilities available to the backend
    Capabilities,

    /// Configuration management
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Set a configuration value (key=value)
        #[arg(long)]
        set: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("geosleuth={},warn", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let config = config::Config::load()?;

    match cli.command {
        Commands::Run {
            features,
            metadata,
            mode,
            turns,
            cycles,
            threshold,
            hints,
            corrections,
            json,
        } => {
            let options = commands::RunOptions {
                features,
                metadata,
                mode,
                turns,
                cycles,
                threshold,
                hints,
                corrections,
                json,
            };
            if !commands::run_investigation(config, options).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Capabilities => {
            commands::list_capabilities(&config)?;
        }
        Commands::Config { show, set } => match set {
            Some(kv) if !show => commands::set_config(&kv)?,
            _ => commands::show_config(&config)?,
        },
    }

    Ok(ExitCode::SUCCESS)
}
