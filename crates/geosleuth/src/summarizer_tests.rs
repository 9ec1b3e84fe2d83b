//! Unit tests for the summarizer

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::{
        backend::ContentBlock,
        capability::CapabilityResult,
        config::InvestigationConfig,
        executor::{ExecutionTrace, ExecutionTurn, Invocation, StopSignal, TraceStatus},
        prompts,
        summarizer::{KeyPoint, KeyPointCategory, Summarizer, Summary},
        test_support::ScriptedBackend,
        GeoSleuthError,
    };

    fn trace() -> ExecutionTrace {
        ExecutionTrace {
            status: TraceStatus::Completed,
            turns: vec![
                ExecutionTurn {
                    turn_index: 0,
                    reasoning_text: "r".repeat(1000),
                    invocations: vec![Invocation {
                        request_id: "call_0".into(),
                        capability_name: "web_search".into(),
                        arguments: json!({"query": "Apotek 1 Storgata"}),
                        result: CapabilityResult::ok(json!({"blob": "d".repeat(1000)})),
                        elapsed_ms: 12,
                        duplicate: false,
                    }],
                    stop_signal: StopSignal::Continue,
                },
                ExecutionTurn {
                    turn_index: 1,
                    reasoning_text: "Tromsø it is.".into(),
                    invocations: Vec::new(),
                    stop_signal: StopSignal::Done,
                },
            ],
            final_text: "Tromsø it is.".into(),
            error: None,
            total_steps: 2,
            turn_budget: 10,
        }
    }

    fn summary_json() -> serde_json::Value {
        json!({
            "summary": "The pharmacy is on Storgata in Tromsø.",
            "key_points": [
                {"category": "location", "finding": "Storgata, Tromsø", "confidence": "high"},
                {"category": "evidence", "finding": "Apotek 1 branch listing"}
            ],
            "next_actions": ["Confirm with street-level imagery"]
        })
    }

    fn previous() -> Vec<Summary> {
        vec![Summary {
            overview: "Norwegian pharmacy chain identified".into(),
            key_points: vec![KeyPoint {
                category: KeyPointCategory::Location,
                finding: "Storgata, Tromsø".into(),
                confidence: None,
            }],
            next_actions: Vec::new(),
            is_redundant: false,
            similarity_score: 0.0,
            similarity_reasoning: None,
        }]
    }

    fn summarizer(backend: &Arc<ScriptedBackend>) -> Summarizer {
        Summarizer::new(backend.clone(), &InvestigationConfig::default())
    }

    /// No earlier summaries: not redundant, score 0 and no similarity call
    #[tokio::test]
    async fn test_first_summary_skips_similarity() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_summary(summary_json());
        backend.always_similarity(json!({"similarity_score": 0.99}));

        let summary = summarizer(&backend).summarize(&trace(), &[]).await.unwrap();

        assert!(!summary.is_redundant);
        assert_eq!(summary.similarity_score, 0.0);
        assert_eq!(backend.summary_calls(), 1);
        assert_eq!(backend.similarity_calls(), 0);
        assert_eq!(summary.key_points.len(), 2);
        assert_eq!(summary.overview, "The pharmacy is on Storgata in Tromsø.");
    }

    /// A high similarity score marks the summary redundant
    #[tokio::test]
    async fn test_high_similarity_is_redundant() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_summary(summary_json());
        backend.push_similarity(json!({
            "similarity_score": 0.95,
            "is_redundant": false,
            "reasoning": "Same street, same shop"
        }));

        let summary = summarizer(&backend)
            .summarize(&trace(), &previous())
            .await
            .unwrap();

        assert!(summary.is_redundant);
        assert_eq!(summary.similarity_score, 0.95);
        assert_eq!(summary.similarity_reasoning.as_deref(), Some("Same street, same shop"));
        assert_eq!(backend.similarity_calls(), 1);

        let requests = backend.requests();
        let request = &requests[1];
        assert_eq!(request.system_instruction, prompts::SIMILARITY_INSTRUCTION);
        assert!(request.manifest.is_empty());
    }

    /// Out-of-range and string scores are normalised before the threshold applies
    #[tokio::test]
    async fn test_scores_are_clamped() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.always_summary(summary_json());
        backend.push_similarity(json!({"similarity_score": 1.7}));
        backend.push_similarity(json!({"similarity_score": "0.3"}));
        backend.push_similarity(json!({"similarity_score": -2}));
        let summarizer = summarizer(&backend);

        let high = summarizer.summarize(&trace(), &previous()).await.unwrap();
        assert_eq!(high.similarity_score, 1.0);
        assert!(high.is_redundant);

        let low = summarizer.summarize(&trace(), &previous()).await.unwrap();
        assert_eq!(low.similarity_score, 0.3);
        assert!(!low.is_redundant);

        let negative = summarizer.summarize(&trace(), &previous()).await.unwrap();
        assert_eq!(negative.similarity_score, 0.0);
    }

    /// The threshold is configurable
    #[tokio::test]
    async fn test_custom_threshold() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_summary(summary_json());
        backend.push_similarity(json!({"similarity_score": 0.5}));
        let config = InvestigationConfig {
            similarity_threshold: 0.8,
            ..InvestigationConfig::default()
        };

        let summary = Summarizer::new(backend.clone(), &config)
            .summarize(&trace(), &previous())
            .await
            .unwrap();
        assert!(!summary.is_redundant);
    }

    /// An unreadable summary is an error for the caller to handle
    #[tokio::test]
    async fn test_unreadable_summary_propagates() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_summary_text("The investigation went well overall.");

        let err = summarizer(&backend).summarize(&trace(), &[]).await.unwrap_err();
        assert!(matches!(err, GeoSleuthError::Parse(_)));
    }

    /// The rendered trace is bounded by the excerpt lengths
    #[tokio::test]
    async fn test_trace_is_truncated_for_the_backend() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_summary(summary_json());

        summarizer(&backend).summarize_trace(&trace()).await.unwrap();

        let requests = backend.requests();
        let request = &requests[0];
        let ContentBlock::Text { text } = &request.transcript[0].content[0] else {
            panic!("summary request should be plain text");
        };
        assert!(text.contains(&format!("Reasoning: {}...", "r".repeat(300))));
        assert!(!text.contains(&"r".repeat(301)));
        assert!(!text.contains(&"d".repeat(200)));
        assert!(text.contains("OK web_search:"));
        assert!(text.contains("Turns: 2 of 10"));
    }
}
