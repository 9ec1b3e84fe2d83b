//! Output formatting and terminal rendering
//!
//! Progress lines while an investigation runs, and the final report.

use colored::Colorize;
use geosleuth::{
    Confidence, InvestigationOutcome, KeyPoint, ManifestEntry, OrchestratorState, ProgressPhase,
    ProgressUpdate, Summary, TerminationReason,
};

/// Output handler for terminal display
pub struct OutputHandler {
    pub show_terminal_output: bool,
    pub show_details: bool,
}

impl OutputHandler {
    pub fn new(show_terminal_output: bool, show_details: bool) -> Self {
        Self {
            show_terminal_output,
            show_details,
        }
    }

    /// Print the run banner
    pub fn print_banner(&self, investigation_id: &str, mode: &str, seed_features: usize) {
        println!();
        println!(
            "{}",
            "╔═══════════════════════════════════════════════════════════════╗".bright_cyan()
        );
        println!(
            "{}",
            "║                  GeoSleuth Investigation                      ║".bright_cyan()
        );
        println!(
            "{}",
            "╚═══════════════════════════════════════════════════════════════╝".bright_cyan()
        );
        println!(
            "  {} {}  {} {}  {} {}",
            "Id:".dimmed(),
            &investigation_id[..8.min(investigation_id.len())],
            "Mode:".dimmed(),
            mode.bright_white(),
            "Features:".dimmed(),
            seed_features
        );
        println!();
    }

    /// Print a section header
    pub fn print_header(&self, text: &str) {
        println!();
        println!("{}", format!("▶ {}", text).bright_yellow().bold());
        println!("{}", "─".repeat(60).dimmed());
    }

    /// Print a success message
    pub fn print_success(&self, text: &str) {
        println!("{} {}", "✓".bright_green(), text.bright_white());
    }

    /// Print an error message
    pub fn print_error(&self, text: &str) {
        println!("{} {}", "✗".bright_red(), text.bright_red());
    }

    /// Print a warning message
    pub fn print_warning(&self, text: &str) {
        println!("{} {}", "⚠".bright_yellow(), text.yellow());
    }

    /// Print an info message
    pub fn print_info(&self, text: &str) {
        println!("{} {}", "ℹ".bright_blue(), text);
    }

    /// Print one progress update
    pub fn print_progress(&self, update: &ProgressUpdate) {
        if update.complete {
            // The final report covers it
            return;
        }

        let label = format!("[{}]", update.phase);
        let label = match update.phase {
            ProgressPhase::Extracting => label.bright_blue(),
            ProgressPhase::Planning => label.bright_magenta(),
            ProgressPhase::Investigating => label.bright_cyan(),
            ProgressPhase::Summarizing => label.bright_green(),
            ProgressPhase::Complete => label.bright_white(),
            ProgressPhase::Error => label.bright_red(),
        };

        match (&update.terminal_output, self.show_terminal_output) {
            (Some(line), true) => println!("{} {}", label, line.dimmed()),
            (Some(_), false) => {}
            (None, _) => println!("{} {}", label, update.message),
        }

        if let Some(lead) = &update.current_lead {
            println!("    {} {}", "Lead:".dimmed(), lead.bright_white().bold());
        }

        if self.show_details && update.phase == ProgressPhase::Summarizing {
            if let Some(points) = update.details.as_ref().and_then(|d| d.get("key_points")) {
                let points: Vec<KeyPoint> =
                    serde_json::from_value(points.clone()).unwrap_or_default();
                for point in &points {
                    self.print_key_point(point);
                }
            }
        }
    }

    fn print_key_point(&self, point: &KeyPoint) {
        let confidence = match point.confidence {
            Some(Confidence::High) => "high".bright_green(),
            Some(Confidence::Medium) => "medium".yellow(),
            Some(Confidence::Low) => "low".red(),
            None => "-".dimmed(),
        };
        println!(
            "    {} {:<10} {:<7} {}",
            "•".bright_cyan(),
            point.category.to_string().dimmed(),
            confidence,
            point.finding
        );
    }

    fn print_summary(&self, summary: &Summary) {
        println!("  {}", summary.overview);

        if !summary.key_points.is_empty() {
            println!();
            println!("  {}", "Key points:".bright_white().bold());
            for point in &summary.key_points {
                self.print_key_point(point);
            }
        }

        if !summary.next_actions.is_empty() {
            println!();
            println!("  {}", "Suggested follow-ups:".bright_white().bold());
            for action in &summary.next_actions {
                println!("    {} {}", "○".dimmed(), action);
            }
        }
    }

    /// Print the final report
    pub fn print_outcome(&self, outcome: &InvestigationOutcome) {
        let headline = match (outcome.state, outcome.reason) {
            (OrchestratorState::Converged, TerminationReason::EmptyPlan) => {
                "Investigation complete: nothing left to check"
            }
            (OrchestratorState::Converged, _) => "Investigation complete: findings converged",
            (OrchestratorState::Exhausted, _) => "Investigation stopped: cycle budget used up",
            (_, TerminationReason::Cancelled) => "Investigation cancelled",
            _ => "Investigation failed",
        };
        self.print_header(headline);

        if let Some(lead) = outcome
            .last_summary
            .as_ref()
            .and_then(Summary::best_location)
        {
            println!("  {} {}", "Best location:".dimmed(), lead.finding.bright_green().bold());
            println!();
        }

        match &outcome.last_summary {
            Some(summary) => self.print_summary(summary),
            None => println!("  {}", "No summary was produced.".dimmed()),
        }

        println!();
        println!(
            "  {} {}  {} {:?}",
            "Cycles:".dimmed(),
            outcome.cycles,
            "Reason:".dimmed(),
            outcome.reason
        );

        if let Some(error) = &outcome.error {
            self.print_error(error);
        }
        println!();
    }

    /// Print the capability manifest
    pub fn print_manifest(&self, manifest: &[ManifestEntry]) {
        println!();
        println!(
            "{}",
            format!("{:<20} {}", "Name", "Description").bright_white().bold()
        );
        println!("{}", "─".repeat(80).dimmed());

        for entry in manifest {
            let description = entry.description.lines().next().unwrap_or_default();
            println!("{:<20} {}", entry.name.bright_cyan(), description);
        }
        println!();
    }
}
