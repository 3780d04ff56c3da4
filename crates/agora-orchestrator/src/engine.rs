//! Process wiring: repositories, cache backend and providers from the
//! environment.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use agora_core::defaults::EVENT_BUS_CAPACITY;
use agora_core::{
    CacheStore, EmbeddingRepository, EventBus, InteractionRepository, ScopedConfigRepository,
};
use agora_db::{
    Database, InMemoryConfigRepository, InMemoryEmbeddingRepository,
    InMemoryInteractionRepository, PgEmbeddingRepository, PgInteractionRepository,
    PgScopedConfigRepository, PoolConfig, PoolHealth,
};
use agora_inference::ProviderRegistry;

use crate::cache::{MemoryCacheStore, RedisCacheStore};
use crate::orchestrator::Orchestrator;
use crate::settings::EngineSettings;

/// A fully wired orchestrator plus the handles it was built from.
pub struct Engine {
    pub orchestrator: Arc<Orchestrator>,
    pub events: EventBus,
    /// Present when backed by PostgreSQL.
    pub database: Option<Database>,
    pub settings: EngineSettings,
}

impl Engine {
    /// Build from [`EngineSettings::from_env`] and the provider environment.
    pub async fn from_env() -> anyhow::Result<Self> {
        let settings = EngineSettings::from_env();
        let providers =
            ProviderRegistry::from_env().context("failed to configure AI providers")?;
        Self::build(settings, providers).await
    }

    /// Build with explicit settings and providers.
    ///
    /// Without `database_url` the repositories are in-memory. A Redis
    /// connection failure falls back to the in-memory cache store.
    pub async fn build(settings: EngineSettings, providers: ProviderRegistry) -> anyhow::Result<Self> {
        let (configs, interactions, embeddings, database): (
            Arc<dyn ScopedConfigRepository>,
            Arc<dyn InteractionRepository>,
            Arc<dyn EmbeddingRepository>,
            Option<Database>,
        ) = match settings.database_url.as_deref() {
            Some(url) => {
                let pool_config =
                    PoolConfig::new().max_connections(settings.database_max_connections);
                let db = Database::connect_with_config(url, pool_config)
                    .await
                    .context("failed to connect to database")?;
                db.migrate().await.context("failed to run migrations")?;
                (
                    Arc::new(PgScopedConfigRepository::new(db.pool.clone())),
                    Arc::new(PgInteractionRepository::new(db.pool.clone())),
                    Arc::new(PgEmbeddingRepository::new(db.pool.clone())),
                    Some(db),
                )
            }
            None => {
                warn!(
                    subsystem = "orchestrator",
                    "DATABASE_URL not set, using in-memory repositories"
                );
                (
                    Arc::new(InMemoryConfigRepository::new()),
                    Arc::new(InMemoryInteractionRepository::new()),
                    Arc::new(InMemoryEmbeddingRepository::new()),
                    None,
                )
            }
        };

        let cache_store = Self::cache_store(&settings).await;
        let events = EventBus::new(EVENT_BUS_CAPACITY);

        let orchestrator = Orchestrator::builder(
            configs,
            interactions,
            embeddings,
            cache_store,
            providers,
        )
        .with_retry_policy(settings.retry)
        .with_provider_timeout(settings.provider_timeout)
        .with_config_cache_ttl(settings.config_cache_ttl)
        .with_cache_prefix(settings.cache_prefix.clone())
        .with_event_bus(events.clone())
        .build();

        if orchestrator
            .resolver()
            .seed_global_if_missing()
            .await
            .context("failed to seed global configuration")?
        {
            info!(subsystem = "orchestrator", "Seeded default global configuration");
        }

        info!(
            subsystem = "orchestrator",
            persistence = if database.is_some() { "postgres" } else { "memory" },
            providers = ?orchestrator.providers().kinds(),
            "Engine ready"
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            events,
            database,
            settings,
        })
    }

    /// Pool occupancy, or `None` when running on in-memory repositories.
    pub fn database_health(&self) -> Option<PoolHealth> {
        self.database.as_ref().map(Database::health)
    }

    async fn cache_store(settings: &EngineSettings) -> Arc<dyn CacheStore> {
        if !settings.redis_enabled {
            info!(subsystem = "cache", "Redis disabled, using in-memory result cache");
            return Arc::new(MemoryCacheStore::new());
        }
        match RedisCacheStore::connect(&settings.redis_url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!(
                    subsystem = "cache",
                    redis_url = %settings.masked_redis_url(),
                    error = %e,
                    "Redis unavailable, falling back to in-memory result cache"
                );
                Arc::new(MemoryCacheStore::new())
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("orchestrator", &self.orchestrator)
            .field("postgres", &self.database.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}
