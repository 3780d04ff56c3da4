//! Engine bootstrap without external services.

use std::sync::Arc;

use agora_inference::mock::MockProvider;
use agora_inference::ProviderRegistry;
use agora_orchestrator::{
    Content, Engine, EngineSettings, InteractionStatus, OperationKind, OperationRequest,
    ProviderKind, Scope,
};

#[tokio::test]
async fn test_in_memory_engine_seeds_global_and_serves_calls() {
    let openai = MockProvider::new(ProviderKind::OpenAi);
    let registry = ProviderRegistry::new().with(Arc::new(openai.clone()));

    let engine = Engine::build(EngineSettings::default(), registry)
        .await
        .unwrap();
    assert!(engine.database.is_none());
    assert!(engine.database_health().is_none());

    let resolved = engine
        .orchestrator
        .resolver()
        .resolve(&Scope::user("u1"))
        .await
        .unwrap();
    assert_eq!(resolved.scope(), &Scope::global());
    assert!(resolved.inherited);

    let outcome = engine
        .orchestrator
        .submit(OperationRequest::new(
            OperationKind::Tag,
            Content::text("Monads in category theory"),
            Scope::user("u1"),
        ))
        .await;
    assert_eq!(outcome.status, InteractionStatus::Completed);
    assert_eq!(openai.call_count(), 1);
}

#[test]
fn test_engine_debug_hides_credentials() {
    let settings = EngineSettings {
        database_url: Some("postgres://agora:hunter2@db:5432/agora".to_string()),
        ..EngineSettings::default()
    };
    assert!(!format!("{:?}", settings).contains("hunter2"));
}
