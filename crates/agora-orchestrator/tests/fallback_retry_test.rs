//! Retry and provider fallback behaviour.

mod common;

use std::sync::Arc;
use std::time::Duration;

use agora_inference::mock::MockProvider;
use agora_inference::{ProviderError, ProviderRegistry};
use agora_orchestrator::{
    default_model, AttemptOutcome, Content, Error, ErrorKind, InteractionStatus,
    NormalizedResult, OperationKind, OperationRequest, ProviderKind, RetryPolicy, Scope,
};
use common::{drain_event_types, global_config, Harness};

fn tag_request(text: &str) -> OperationRequest {
    OperationRequest::new(OperationKind::Tag, Content::text(text), Scope::college("c1"))
}

#[tokio::test]
async fn test_transient_failures_are_retried_on_same_provider() {
    let harness = Harness::new(vec![global_config()]).await;
    harness
        .openai
        .push_error(ProviderError::transient("503 service unavailable"));
    harness
        .openai
        .push_error(ProviderError::transient("429 slow down"));
    let orchestrator = harness.orchestrator();

    let outcome = orchestrator.submit(tag_request("Graph coloring")).await;
    assert_eq!(outcome.status, InteractionStatus::Completed);
    assert_eq!(outcome.provider, Some(ProviderKind::OpenAi));
    assert_eq!(harness.openai.call_count(), 3);
    assert_eq!(harness.anthropic.call_count(), 0);

    let record = orchestrator
        .interaction(outcome.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.metrics.retry_count, 2);
    assert_eq!(record.attempts.len(), 1);
    assert_eq!(record.attempts[0].calls, 3);
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::Succeeded);
}

#[tokio::test]
async fn test_retries_are_bounded_before_falling_back() {
    let harness = Harness::with_providers(
        vec![global_config()],
        MockProvider::new(ProviderKind::OpenAi)
            .failing_with(ProviderError::transient("upstream overloaded")),
        MockProvider::new(ProviderKind::Anthropic),
        MockProvider::new(ProviderKind::Ollama),
    )
    .await;
    let orchestrator = harness.orchestrator();

    let outcome = orchestrator.submit(tag_request("Hash tables")).await;
    assert_eq!(outcome.status, InteractionStatus::Completed);
    assert_eq!(outcome.provider, Some(ProviderKind::Anthropic));
    assert_eq!(harness.openai.call_count(), 4);
    assert_eq!(harness.anthropic.call_count(), 1);

    let record = orchestrator
        .interaction(outcome.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.metrics.retry_count, 3);
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::Transient);
    assert_eq!(record.attempts[0].calls, 4);
}

#[tokio::test]
async fn test_permanent_failures_fall_through_to_tertiary() {
    let harness = Harness::with_providers(
        vec![global_config()],
        MockProvider::new(ProviderKind::OpenAi)
            .failing_with(ProviderError::permanent("401 invalid api key")),
        MockProvider::new(ProviderKind::Anthropic)
            .failing_with(ProviderError::permanent("400 bad request")),
        MockProvider::new(ProviderKind::Ollama),
    )
    .await;
    let orchestrator = harness.orchestrator();
    let mut rx = harness.events.subscribe();

    let outcome = orchestrator.submit(tag_request("Red-black trees")).await;
    assert_eq!(outcome.status, InteractionStatus::Completed);
    assert_eq!(outcome.provider, Some(ProviderKind::Ollama));
    let fallback_model = default_model(ProviderKind::Ollama, OperationKind::Tag);
    assert_eq!(outcome.model.as_deref(), Some(fallback_model));

    // Permanent failures are not retried.
    assert_eq!(harness.openai.call_count(), 1);
    assert_eq!(harness.anthropic.call_count(), 1);
    assert_eq!(harness.ollama.calls()[0].model, fallback_model);

    let record = orchestrator
        .interaction(outcome.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        record.attempted_providers(),
        vec![
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::Ollama
        ]
    );
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::Permanent);
    assert_eq!(record.attempts[1].outcome, AttemptOutcome::Permanent);
    assert_eq!(record.attempts[2].outcome, AttemptOutcome::Succeeded);
    assert_eq!(record.metrics.retry_count, 0);
    assert_eq!(record.metrics.cost_usd, 0.0);

    let fallbacks = drain_event_types(&mut rx)
        .into_iter()
        .filter(|t| t == "provider.fallback")
        .count();
    assert_eq!(fallbacks, 2);
}

#[tokio::test]
async fn test_exhausted_chain_fails_with_attempt_order() {
    let harness = Harness::with_providers(
        vec![global_config()],
        MockProvider::new(ProviderKind::OpenAi)
            .failing_with(ProviderError::permanent("401 invalid api key")),
        MockProvider::new(ProviderKind::Anthropic)
            .failing_with(ProviderError::permanent("403 forbidden")),
        MockProvider::new(ProviderKind::Ollama).with_unsupported(OperationKind::Tag),
    )
    .await;
    let orchestrator = harness.orchestrator();

    let outcome = orchestrator.submit(tag_request("Tries")).await;
    assert_eq!(outcome.status, InteractionStatus::Failed);
    match &outcome.result {
        Err(Error::AllProvidersExhausted {
            operation,
            attempted,
            ..
        }) => {
            assert_eq!(*operation, OperationKind::Tag);
            assert_eq!(attempted, &vec!["openai", "anthropic", "ollama"]);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }

    let record = orchestrator
        .interaction(outcome.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, InteractionStatus::Failed);
    assert_eq!(record.attempts.len(), 3);
    assert_eq!(record.attempts[2].outcome, AttemptOutcome::Unsupported);
    assert_eq!(
        record.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::AllProvidersExhausted)
    );
    assert!(record.completed_at.is_some());
    assert!(record.output.is_none());
}

#[tokio::test]
async fn test_unregistered_providers_are_skipped() {
    let harness = Harness::new(vec![global_config()]).await;
    let registry = ProviderRegistry::new().with(Arc::new(harness.ollama.clone()));
    let orchestrator = harness.builder_with(registry).build();

    let outcome = orchestrator.submit(tag_request("Heaps")).await;
    assert_eq!(outcome.status, InteractionStatus::Completed);
    assert_eq!(outcome.provider, Some(ProviderKind::Ollama));

    let record = orchestrator
        .interaction(outcome.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.attempted_providers(), vec![ProviderKind::Ollama]);
}

#[tokio::test]
async fn test_empty_registry_exhausts_immediately() {
    let harness = Harness::new(vec![global_config()]).await;
    let orchestrator = harness.builder_with(ProviderRegistry::new()).build();

    let outcome = orchestrator.submit(tag_request("Queues")).await;
    assert_eq!(outcome.status, InteractionStatus::Failed);
    assert!(matches!(
        outcome.result,
        Err(Error::AllProvidersExhausted { ref attempted, .. }) if attempted.is_empty()
    ));
}

#[tokio::test]
async fn test_slow_provider_times_out_and_falls_back() {
    let harness = Harness::with_providers(
        vec![global_config()],
        MockProvider::new(ProviderKind::OpenAi).with_latency_ms(500),
        MockProvider::new(ProviderKind::Anthropic),
        MockProvider::new(ProviderKind::Ollama),
    )
    .await;
    let orchestrator = harness
        .builder_with(harness.registry())
        .with_retry_policy(RetryPolicy::none())
        .with_provider_timeout(Duration::from_millis(25))
        .build();

    let outcome = orchestrator.submit(tag_request("Bloom filters")).await;
    assert_eq!(outcome.status, InteractionStatus::Completed);
    assert_eq!(outcome.provider, Some(ProviderKind::Anthropic));

    let record = orchestrator
        .interaction(outcome.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::Transient);
    assert!(record.attempts[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("timed out"));
}

#[tokio::test]
async fn test_result_of_wrong_shape_is_rejected() {
    let harness = Harness::new(vec![global_config()]).await;
    harness.openai.push_result(NormalizedResult::Tags {
        tags: vec!["wrong".to_string()],
        confidence: 1.0,
    });
    let orchestrator = harness.orchestrator();

    let outcome = orchestrator
        .submit(OperationRequest::new(
            OperationKind::Summarize,
            Content::text("Paging and virtual memory in modern kernels."),
            Scope::college("c1"),
        ))
        .await;
    assert_eq!(outcome.provider, Some(ProviderKind::Anthropic));
    assert!(matches!(
        outcome.result,
        Ok(NormalizedResult::Summary { .. })
    ));

    let record = orchestrator
        .interaction(outcome.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.attempts[0].outcome, AttemptOutcome::Permanent);
    assert_eq!(record.attempts[0].calls, 1);
}
