//! Shared wiring for orchestrator scenario tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use agora_db::{InMemoryConfigRepository, InMemoryEmbeddingRepository, InMemoryInteractionRepository};
use agora_inference::mock::MockProvider;
use agora_inference::{PricingTable, ProviderRegistry};
use agora_orchestrator::{
    EventBus, MemoryCacheStore, Orchestrator, OrchestratorBuilder, ProviderKind, RateLimits,
    RetryPolicy, ScopedConfig,
};

pub struct Harness {
    pub configs: Arc<InMemoryConfigRepository>,
    pub interactions: Arc<InMemoryInteractionRepository>,
    pub embeddings: Arc<InMemoryEmbeddingRepository>,
    pub events: EventBus,
    pub openai: MockProvider,
    pub anthropic: MockProvider,
    pub ollama: MockProvider,
}

impl Harness {
    /// Repositories seeded with `configs` and one healthy mock per provider.
    pub async fn new(configs: Vec<ScopedConfig>) -> Self {
        Self::with_providers(
            configs,
            MockProvider::new(ProviderKind::OpenAi),
            MockProvider::new(ProviderKind::Anthropic),
            MockProvider::new(ProviderKind::Ollama),
        )
        .await
    }

    pub async fn with_providers(
        configs: Vec<ScopedConfig>,
        openai: MockProvider,
        anthropic: MockProvider,
        ollama: MockProvider,
    ) -> Self {
        Self {
            configs: Arc::new(
                InMemoryConfigRepository::with_configs(configs)
                    .await
                    .expect("seed configs"),
            ),
            interactions: Arc::new(InMemoryInteractionRepository::new()),
            embeddings: Arc::new(InMemoryEmbeddingRepository::new()),
            events: EventBus::new(1024),
            openai,
            anthropic,
            ollama,
        }
    }

    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::new()
            .with(Arc::new(self.openai.clone()))
            .with(Arc::new(self.anthropic.clone()))
            .with(Arc::new(self.ollama.clone()))
    }

    /// Builder with immediate retries and no resolver caching.
    pub fn builder_with(&self, registry: ProviderRegistry) -> OrchestratorBuilder {
        Orchestrator::builder(
            self.configs.clone(),
            self.interactions.clone(),
            self.embeddings.clone(),
            Arc::new(MemoryCacheStore::new()),
            registry,
        )
        .with_retry_policy(RetryPolicy::immediate(3))
        .with_config_cache_ttl(Duration::ZERO)
        .with_event_bus(self.events.clone())
    }

    pub fn orchestrator(&self) -> Orchestrator {
        self.builder_with(self.registry()).build()
    }

    /// Orchestrator charging a flat `per_call` for calls without token usage.
    pub fn orchestrator_with_call_cost(&self, per_call: f64) -> Orchestrator {
        self.builder_with(self.registry())
            .with_pricing(PricingTable::default().with_fallback_call_cost(per_call))
            .build()
    }
}

/// Rate limits that never trip.
pub fn unlimited() -> RateLimits {
    RateLimits {
        per_minute: 0,
        per_hour: 0,
        per_day: 0,
        burst: 0,
    }
}

pub fn global_config() -> ScopedConfig {
    ScopedConfig::global_default()
}

/// Event types received so far.
pub fn drain_event_types(
    rx: &mut tokio::sync::broadcast::Receiver<agora_orchestrator::EventEnvelope>,
) -> Vec<String> {
    let mut types = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        types.push(envelope.event_type);
    }
    types
}
