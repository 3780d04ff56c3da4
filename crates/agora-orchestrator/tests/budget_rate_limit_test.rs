//! Budget accounting and per-scope rate limits through the orchestrator.

mod common;

use futures::future::join_all;

use agora_inference::mock::MockProvider;
use agora_orchestrator::{
    Content, Error, ErrorKind, InteractionStatus, OperationKind, OperationRequest, ProviderKind,
    RateLimits, Scope, ScopedConfig, ScopedConfigRepository,
};
use common::{drain_event_types, unlimited, Harness};

fn chat(scope: &Scope, text: String) -> OperationRequest {
    OperationRequest::new(OperationKind::Chat, Content::text(text), scope.clone())
}

fn global_with_budget(limit: f64) -> ScopedConfig {
    let mut config = ScopedConfig::global_default();
    config.rate_limits = unlimited();
    config.budget.monthly_limit_usd = limit;
    config
}

async fn usage_free_harness(configs: Vec<ScopedConfig>) -> Harness {
    Harness::with_providers(
        configs,
        MockProvider::new(ProviderKind::OpenAi).without_usage(),
        MockProvider::new(ProviderKind::Anthropic).without_usage(),
        MockProvider::new(ProviderKind::Ollama),
    )
    .await
}

async fn spent(harness: &Harness, scope: &Scope) -> f64 {
    harness
        .configs
        .find(scope)
        .await
        .unwrap()
        .unwrap()
        .budget
        .current_month_spent
}

#[tokio::test]
async fn test_concurrent_calls_charge_every_cost() {
    let harness = usage_free_harness(vec![global_with_budget(100.0)]).await;
    let orchestrator = harness.orchestrator_with_call_cost(0.01);
    let scope = Scope::college("c1");

    let outcomes = join_all(
        (0..25).map(|i| orchestrator.submit(chat(&scope, format!("question {}", i)))),
    )
    .await;

    assert!(outcomes
        .iter()
        .all(|o| o.status == InteractionStatus::Completed));
    let total = spent(&harness, &Scope::global()).await;
    assert!((total - 0.25).abs() < 1e-9, "spent {}", total);
}

#[tokio::test]
async fn test_spend_is_charged_to_resolved_config_scope() {
    let department = {
        let mut config = ScopedConfig::for_scope(Scope::department("physics"));
        config.rate_limits = unlimited();
        config
    };
    let harness = usage_free_harness(vec![global_with_budget(100.0), department]).await;
    let orchestrator = harness.orchestrator_with_call_cost(0.02);

    orchestrator
        .submit(chat(&Scope::department("physics"), "entropy".to_string()))
        .await
        .into_result()
        .unwrap();
    orchestrator
        .submit(chat(&Scope::college("c2"), "momentum".to_string()))
        .await
        .into_result()
        .unwrap();

    assert!((spent(&harness, &Scope::department("physics")).await - 0.02).abs() < 1e-12);
    assert!((spent(&harness, &Scope::global()).await - 0.02).abs() < 1e-12);
}

#[tokio::test]
async fn test_exhausted_budget_blocks_further_calls() {
    let harness = usage_free_harness(vec![global_with_budget(0.015)]).await;
    let orchestrator = harness.orchestrator_with_call_cost(0.01);
    let scope = Scope::user("u1");

    for i in 0..2 {
        let outcome = orchestrator.submit(chat(&scope, format!("q{}", i))).await;
        assert_eq!(outcome.status, InteractionStatus::Completed);
    }

    let outcome = orchestrator.submit(chat(&scope, "q2".to_string())).await;
    assert_eq!(outcome.status, InteractionStatus::Failed);
    match &outcome.result {
        Err(Error::OverBudget { scope, spent, limit }) => {
            assert_eq!(scope, "global:global");
            assert!(*spent >= *limit);
        }
        other => panic!("expected over budget, got {:?}", other),
    }
    assert_eq!(harness.openai.call_count(), 2);

    let record = orchestrator
        .interaction(outcome.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        record.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::OverBudget)
    );
}

#[tokio::test]
async fn test_budget_alert_is_published_once() {
    let harness = usage_free_harness(vec![global_with_budget(0.05)]).await;
    let orchestrator = harness.orchestrator_with_call_cost(0.01);
    let mut rx = harness.events.subscribe();
    let scope = Scope::user("u2");

    // Alert level is 0.04 with the default 0.8 threshold.
    for i in 0..3 {
        orchestrator.submit(chat(&scope, format!("q{}", i))).await;
    }
    assert!(!drain_event_types(&mut rx).contains(&"budget.alert".to_string()));

    for i in 3..5 {
        orchestrator.submit(chat(&scope, format!("q{}", i))).await;
    }
    let alerts = drain_event_types(&mut rx)
        .into_iter()
        .filter(|t| t == "budget.alert")
        .count();
    assert_eq!(alerts, 1);

    orchestrator.submit(chat(&scope, "q5".to_string())).await;
    assert!(!drain_event_types(&mut rx).contains(&"budget.alert".to_string()));
}

#[tokio::test]
async fn test_rate_limit_rejects_call_over_minute_limit() {
    let mut config = ScopedConfig::global_default();
    config.rate_limits = RateLimits {
        per_minute: 100,
        per_hour: 0,
        per_day: 0,
        burst: 0,
    };
    let harness = Harness::new(vec![config]).await;
    let orchestrator = harness.orchestrator();
    let mut rx = harness.events.subscribe();
    let scope = Scope::college("c9");

    for i in 0..100 {
        let outcome = orchestrator.submit(chat(&scope, format!("msg {}", i))).await;
        assert_eq!(
            outcome.status,
            InteractionStatus::Completed,
            "call {} should be admitted",
            i + 1
        );
    }

    let outcome = orchestrator.submit(chat(&scope, "msg 100".to_string())).await;
    assert_eq!(outcome.status, InteractionStatus::RateLimited);
    let err = outcome.result.as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert!(err.is_retryable());
    assert!(err.retry_after_secs().is_some_and(|s| s >= 1 && s <= 60));
    assert_eq!(harness.openai.call_count(), 100);

    let record = orchestrator
        .interaction(outcome.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, InteractionStatus::RateLimited);
    assert!(drain_event_types(&mut rx).contains(&"scope.rate_limited".to_string()));

    // Limits are per request scope.
    let other = orchestrator
        .submit(chat(&Scope::college("c10"), "hello".to_string()))
        .await;
    assert_eq!(other.status, InteractionStatus::Completed);
}

#[tokio::test]
async fn test_cache_hits_do_not_consume_rate_limit() {
    let mut config = ScopedConfig::global_default();
    config.rate_limits = RateLimits {
        per_minute: 2,
        per_hour: 0,
        per_day: 0,
        burst: 0,
    };
    let harness = Harness::new(vec![config]).await;
    let orchestrator = harness.orchestrator();
    let scope = Scope::user("u3");
    let tag = || {
        OperationRequest::new(
            OperationKind::Tag,
            Content::text("Fourier series convergence"),
            scope.clone(),
        )
    };

    assert_eq!(
        orchestrator.submit(tag()).await.status,
        InteractionStatus::Completed
    );
    for _ in 0..3 {
        assert_eq!(orchestrator.submit(tag()).await.status, InteractionStatus::Cached);
    }
    assert_eq!(
        orchestrator
            .submit(chat(&scope, "still admitted".to_string()))
            .await
            .status,
        InteractionStatus::Completed
    );
    assert_eq!(
        orchestrator
            .submit(chat(&scope, "now limited".to_string()))
            .await
            .status,
        InteractionStatus::RateLimited
    );
}
