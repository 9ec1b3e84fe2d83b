//! Instructions and message templates sent to the reasoning backend

use std::fmt::Write;

use serde_json::Value;

use crate::{
    executor::{ExecutionTrace, TraceStatus},
    planner::Plan,
    record::RecordSnapshot,
    summarizer::KeyPoint,
};

pub const PLANNER_INSTRUCTION: &str = r#"You plan geolocation investigations for an investigator who has web search, page fetching, map lookup, a country clue guide and the case file at hand.

Look at what is known about the image and decide what has to be found out next to pin down where it was taken. Describe WHAT to investigate, not which tool to use; the investigator chooses the tools.

Answer with a single JSON object:
{
  "state": "short description of where the investigation stands",
  "next_steps": [
    {"step_n": 1, "description": "first thing to investigate"},
    {"step_n": 2, "description": "second thing to investigate"}
  ]
}

Order the steps so that cheap, decisive checks come first. Return an empty "next_steps" list only when the location is established and nothing useful is left to check."#;

pub const REFINE_PLANNER_INSTRUCTION: &str = r#"You plan geolocation investigations for an investigator who has web search, page fetching, map lookup, a country clue guide and the case file at hand.

This investigation is already under way. Read the validated findings, the user's corrections and hints and the previous summaries, then plan the next round.

Do not send the investigator back over ground already covered. A query or angle listed under validated findings has been tried: propose different keywords, different features of the image or different candidate places instead. Drop leads the user has corrected.

Answer with a single JSON object:
{
  "state": "what has been learned and what is still open",
  "next_steps": [
    {"step_n": 1, "description": "next thing to investigate"}
  ]
}

Return an empty "next_steps" list when the location is established or every reasonable angle has been exhausted."#;

pub const EXECUTOR_INSTRUCTION: &str = r#"You are a geolocation investigator working through an investigation plan. You can call tools to search the web, read pages, look up places on the map, search the country clue guide and read the case file.

Work through the plan step by step. Call tools whenever a fact can be checked rather than guessed. When a lookup confirms something about the location, record it in the case file with the add_finding action.

When you have done what the plan asks, or nothing more can be learned, stop calling tools and write your conclusion: the most likely location, how confident you are and which evidence supports it."#;

pub const SUMMARIZER_INSTRUCTION: &str = r#"You summarize one round of a geolocation investigation from its execution log.

Pick out what narrows down the location: place names, addresses, coordinates, unique identifiers, contradictions between sources. Skip generic observations and anything that only repeats the original image description.

Answer with a single JSON object:
{
  "summary": "two or three sentences on where the investigation stands",
  "key_points": [
    {"category": "location|evidence|hypothesis|contradiction", "finding": "specific finding", "confidence": "high|medium|low"}
  ],
  "next_actions": ["follow-up worth doing if the location is not settled"]
}

Rate confidence by the quality of the evidence behind each finding."#;

pub const SIMILARITY_INSTRUCTION: &str = r#"You decide whether a new round of a geolocation investigation learned anything new.

Compare the key points from earlier rounds with the key points from the latest round. Score how much the latest round merely repeats earlier findings:
- 0.7 to 1.0 (high): the same places and evidence, rephrased or re-confirmed
- 0.4 to 0.7 (medium): mostly known findings with a few small additions
- 0.0 to 0.4 (low): new places, new evidence or a changed hypothesis

Answer with a single JSON object:
{
  "similarity_score": 0.0,
  "is_redundant": false,
  "reasoning": "one or two sentences"
}"#;

/// First `max_chars` characters of `text`, with an ellipsis when cut
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Cold-start planning message built from the seed alone
pub fn initial_plan_message(record: &RecordSnapshot) -> String {
    let mut message = String::from("Create an investigation plan for a new image.\n\n");
    let _ = writeln!(message, "EXTRACTED FEATURES:\n{}\n", pretty(&record.seed.features));
    let _ = writeln!(message, "METADATA:\n{}", pretty(&record.seed.metadata));
    message
}

/// Refinement message built from the whole record
pub fn refine_plan_message(record: &RecordSnapshot, cycle_index: usize) -> String {
    let mut message = format!("Plan round {} of this investigation.\n\n", cycle_index + 1);
    let _ = writeln!(message, "EXTRACTED FEATURES:\n{}\n", pretty(&record.seed.features));
    let _ = writeln!(message, "METADATA:\n{}\n", pretty(&record.seed.metadata));

    message.push_str("USER CORRECTIONS:\n");
    if record.corrections.is_empty() {
        message.push_str("(none)\n");
    }
    for correction in &record.corrections {
        let _ = writeln!(message, "- wrong: {} / correction: {}", correction.guess, correction.correction);
    }

    message.push_str("\nUSER CONTEXT HINTS:\n");
    if record.context_hints.is_empty() {
        message.push_str("(none)\n");
    }
    for hint in &record.context_hints {
        let _ = writeln!(message, "- {}", hint);
    }

    message.push_str("\nVALIDATED FINDINGS (already covered, do not repeat):\n");
    if record.validated_findings.is_empty() {
        message.push_str("(none)\n");
    }
    for finding in &record.validated_findings {
        match &finding.source {
            Some(source) => {
                let _ = writeln!(message, "- {} [{}]", finding.description, source);
            }
            None => {
                let _ = writeln!(message, "- {}", finding.description);
            }
        }
    }

    if !record.summaries.is_empty() {
        message.push_str("\nPREVIOUS ROUNDS:\n");
        for (round, summary) in record.summaries.iter().enumerate() {
            let _ = writeln!(message, "Round {}: {}", round + 1, summary.overview);
            for point in &summary.key_points {
                let _ = writeln!(message, "  - [{}] {}", point.category, point.finding);
            }
        }
        if let Some(last) = record.summaries.last() {
            if !last.next_actions.is_empty() {
                message.push_str("\nSUGGESTED FOLLOW-UPS FROM THE LAST ROUND:\n");
                for action in &last.next_actions {
                    let _ = writeln!(message, "- {}", action);
                }
            }
        }
    }

    message
}

/// Opening transcript message for an executor run
pub fn execution_seed(plan: &Plan) -> String {
    let mut message = String::from("INVESTIGATION PLAN\n\n");
    let _ = writeln!(message, "Current state: {}\n", plan.state_summary);
    message.push_str("Steps:\n");
    for step in &plan.steps {
        let _ = writeln!(message, "{}. {}", step.index, step.description);
    }
    message.push_str(
        "\nStart by reading the case file, then work through the steps. \
         Record verified facts with add_finding.",
    );
    message
}

/// Execution log handed to the summarizer
pub fn summary_message(trace: &ExecutionTrace, reasoning_chars: usize, result_chars: usize) -> String {
    let status = match trace.status {
        TraceStatus::Completed => "completed",
        TraceStatus::Partial => "partial (turn budget exhausted)",
        TraceStatus::Error => "error",
    };

    let mut message = String::from("EXECUTION LOG\n\n");
    let _ = writeln!(message, "Status: {}", status);
    let _ = writeln!(message, "Turns: {} of {}", trace.turns.len(), trace.turn_budget);
    if let Some(error) = &trace.error {
        let _ = writeln!(message, "Error: {}", error);
    }
    let _ = writeln!(message, "\nFINAL RESPONSE:\n{}", trace.final_text);

    for turn in &trace.turns {
        let _ = writeln!(message, "\n--- Turn {} ---", turn.turn_index + 1);
        let _ = writeln!(message, "Reasoning: {}", excerpt(&turn.reasoning_text, reasoning_chars));
        for invocation in &turn.invocations {
            let result = &invocation.result;
            if result.success {
                let data = result.data.as_ref().map(Value::to_string).unwrap_or_default();
                let _ = writeln!(
                    message,
                    "  OK {}: {}",
                    invocation.capability_name,
                    excerpt(&data, result_chars)
                );
            } else {
                let _ = writeln!(
                    message,
                    "  FAILED {}: {}",
                    invocation.capability_name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    message
}

fn key_point_lines(points: &[KeyPoint]) -> String {
    if points.is_empty() {
        return "(none)\n".to_string();
    }
    points
        .iter()
        .map(|p| format!("- [{}] {}\n", p.category, p.finding))
        .collect()
}

/// Comparison request between earlier and latest key points
pub fn similarity_message(previous: &[KeyPoint], latest: &[KeyPoint]) -> String {
    format!(
        "KEY POINTS FROM EARLIER ROUNDS:\n{}\nKEY POINTS FROM THE LATEST ROUND:\n{}",
        key_point_lines(previous),
        key_point_lines(latest)
    )
}
