//! Unit tests for the executor loop

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use crate::{
        backend::{BackendError, ContentBlock},
        capability::CapabilityRegistry,
        config::InvestigationConfig,
        executor::{Executor, StopSignal, TraceStatus},
        planner::{Plan, Step},
        progress::{self, ProgressPhase},
        test_support::{
            text_response, EchoCapability, FailingCapability, PanickingCapability, ScriptedBackend,
            SlowCapability,
        },
    };

    fn plan() -> Plan {
        Plan {
            state_summary: "Pharmacy sign in Norwegian".into(),
            steps: vec![Step {
                index: 1,
                description: "Find which town has this pharmacy next to a harbour".into(),
            }],
        }
    }

    fn registry() -> Arc<CapabilityRegistry> {
        let registry = CapabilityRegistry::new(Duration::from_millis(200))
            .with(Arc::new(EchoCapability))
            .and_then(|r| r.with(Arc::new(FailingCapability)))
            .and_then(|r| r.with(Arc::new(PanickingCapability)))
            .and_then(|r| r.with(Arc::new(SlowCapability)))
            .unwrap();
        Arc::new(registry)
    }

    fn executor(backend: &Arc<ScriptedBackend>) -> Executor {
        Executor::new(backend.clone(), registry(), &InvestigationConfig::default())
    }

    /// A capability that always fails never stops the loop; the budget does
    #[tokio::test]
    async fn test_failing_capability_runs_to_budget() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.always_turn(
            backend.invocation_turn("Trying the scraper", &[("always_fails", json!({}))]),
        );

        let trace = executor(&backend).execute(&plan(), 3).await;

        assert_eq!(trace.status, TraceStatus::Partial);
        assert_eq!(trace.turns.len(), 3);
        assert!(trace
            .turns
            .iter()
            .flat_map(|t| &t.invocations)
            .all(|i| !i.result.success && i.result.error.is_some()));
        assert!(trace.turns.iter().all(|t| t.stop_signal == StopSignal::Continue));
        assert_eq!(trace.error, None);
        assert_eq!(trace.final_text, "Trying the scraper");
        assert_eq!(backend.executor_calls(), 3);
    }

    /// No invocation requests on the first turn ends the run immediately
    #[tokio::test]
    async fn test_done_on_first_turn() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_turn(text_response("The sign alone places this in Tromsø."));

        let trace = executor(&backend).execute(&plan(), 5).await;

        assert_eq!(trace.status, TraceStatus::Completed);
        assert_eq!(trace.turns.len(), 1);
        assert_eq!(trace.turns[0].stop_signal, StopSignal::Done);
        assert_eq!(trace.final_text, trace.turns[0].reasoning_text);
        assert_eq!(trace.final_text, "The sign alone places this in Tromsø.");
        assert_eq!(trace.total_steps, 1);
    }

    /// The executor never produces more turns than its budget
    #[tokio::test]
    async fn test_budget_is_a_hard_bound() {
        for budget in 1..=4 {
            let backend = Arc::new(ScriptedBackend::new());
            backend.always_turn(
                backend.invocation_turn("again", &[("echo", json!({"text": "x"}))]),
            );

            let trace = executor(&backend).execute(&plan(), budget).await;
            assert_eq!(trace.turns.len(), budget);
            assert_eq!(trace.status, TraceStatus::Partial);
            assert_eq!(trace.turn_budget, budget);
        }
    }

    /// Unknown names, errors, panics and timeouts all come back as failed results
    #[tokio::test]
    async fn test_faults_are_contained_and_ordered() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_turn(backend.invocation_turn(
            "Checking everything at once",
            &[
                ("slow", json!({})),
                ("echo", json!({"text": "Storgata"})),
                ("panics", json!({})),
                ("teleport", json!({"to": "Tromsø"})),
                ("always_fails", json!({})),
            ],
        ));
        backend.push_turn(text_response("Done checking."));

        let trace = executor(&backend).execute(&plan(), 5).await;

        assert_eq!(trace.status, TraceStatus::Completed);
        let invocations = &trace.turns[0].invocations;
        let names: Vec<_> = invocations.iter().map(|i| i.capability_name.as_str()).collect();
        assert_eq!(names, vec!["slow", "echo", "panics", "teleport", "always_fails"]);

        let successes: Vec<_> = invocations.iter().map(|i| i.result.success).collect();
        assert_eq!(successes, vec![false, true, false, false, false]);
        assert_eq!(invocations[3].result.error.as_deref(), Some("unknown capability"));
        assert_eq!(invocations[0].request_id, "call_0");
    }

    /// Results are fed back to the backend in emission order before the next turn
    #[tokio::test]
    async fn test_results_fed_back_in_order() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_turn(backend.invocation_turn(
            "Two lookups",
            &[("echo", json!({"text": "first"})), ("echo", json!({"text": "second"}))],
        ));
        backend.push_turn(text_response("Both confirmed."));

        executor(&backend).execute(&plan(), 3).await;

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].manifest.is_empty());

        let transcript = &requests[1].transcript;
        assert_eq!(transcript.len(), 3);
        let results: Vec<_> = transcript[2]
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::InvocationResult {
                    request_id,
                    content,
                    is_error,
                } => (request_id.clone(), content.clone(), *is_error),
                other => panic!("unexpected block {:?}", other),
            })
            .collect();
        assert_eq!(results[0].0, "call_0");
        assert!(results[0].1.contains("first"));
        assert_eq!(results[1].0, "call_1");
        assert!(results[1].1.contains("second"));
        assert!(!results[1].2);
    }

    /// Repeating an invocation is flagged but still executed
    #[tokio::test]
    async fn test_duplicates_are_advisory() {
        let backend = Arc::new(ScriptedBackend::new());
        let lookup = json!({"text": "Apotek 1"});
        backend.push_turn(backend.invocation_turn("search", &[("echo", lookup.clone())]));
        backend.push_turn(backend.invocation_turn("search again", &[("echo", lookup)]));
        backend.push_turn(text_response("ok"));

        let trace = executor(&backend).execute(&plan(), 5).await;

        assert!(!trace.turns[0].invocations[0].duplicate);
        let repeated = &trace.turns[1].invocations[0];
        assert!(repeated.duplicate);
        assert!(repeated.result.success);
    }

    /// A backend fault ends the run with its message preserved verbatim
    #[tokio::test]
    async fn test_backend_fault_is_error_status() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_turn(backend.invocation_turn("first look", &[("echo", json!({"text": "a"}))]));
        let fault = BackendError::ApiError {
            status: 500,
            message: "internal error".into(),
        };
        backend.push_turn_error(fault.clone());

        let trace = executor(&backend).execute(&plan(), 5).await;

        assert_eq!(trace.status, TraceStatus::Error);
        assert_eq!(trace.error, Some(fault.to_string()));
        assert_eq!(trace.turns.len(), 1);
        assert_eq!(trace.final_text, "first look");
    }

    /// Sequential dispatch gives the same ordering as concurrent dispatch
    #[tokio::test]
    async fn test_sequential_dispatch() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_turn(backend.invocation_turn(
            "one by one",
            &[("always_fails", json!({})), ("echo", json!({"text": "b"}))],
        ));
        backend.push_turn(text_response("done"));

        let config = InvestigationConfig {
            parallel_invocations: false,
            ..InvestigationConfig::default()
        };
        let trace = Executor::new(backend.clone(), registry(), &config)
            .execute(&plan(), 3)
            .await;

        let names: Vec<_> = trace.turns[0]
            .invocations
            .iter()
            .map(|i| i.capability_name.as_str())
            .collect();
        assert_eq!(names, vec!["always_fails", "echo"]);
    }

    /// Cancellation is honoured before the next turn starts
    #[tokio::test]
    async fn test_cancelled_before_turn() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.always_turn(text_response("never reached"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let trace = executor(&backend)
            .with_cancellation(cancel)
            .execute(&plan(), 3)
            .await;

        assert_eq!(trace.status, TraceStatus::Error);
        assert_eq!(trace.error.as_deref(), Some("investigation cancelled"));
        assert!(trace.turns.is_empty());
        assert_eq!(backend.executor_calls(), 0);
    }

    /// Each invocation produces an investigating progress update
    #[tokio::test]
    async fn test_progress_per_invocation() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_turn(backend.invocation_turn(
            "two calls",
            &[("echo", json!({"text": "a"})), ("echo", json!({"text": "b"}))],
        ));
        backend.push_turn(text_response("done"));
        let (sender, mut rx) = progress::channel(8);

        let trace = executor(&backend).with_progress(sender).execute(&plan(), 3).await;
        tokio_test::assert_ok!(serde_json::to_value(&trace));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.phase, ProgressPhase::Investigating);
        assert_eq!(first.message, "Calling echo");
        assert!(second.terminal_output.unwrap().contains("\"b\""));
    }
}
