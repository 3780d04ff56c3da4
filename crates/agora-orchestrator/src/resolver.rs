//! Scoped configuration resolution.
//!
//! Every request resolves the config for its scope: an active exact match
//! wins, otherwise the Global config is used. Lookups are cached for a short
//! TTL since every orchestrator call performs one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use agora_core::defaults::CONFIG_CACHE_SECS;
use agora_core::{Error, OperationKind, Result, Scope, ScopedConfig, ScopedConfigRepository};

/// A resolved config and whether it was inherited from Global.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub config: ScopedConfig,
    /// True when the request scope had no active config of its own.
    pub inherited: bool,
}

impl ResolvedConfig {
    /// Scope of the config that serves the request.
    pub fn scope(&self) -> &Scope {
        &self.config.scope
    }
}

struct CachedLookup {
    fetched_at: Instant,
    config: Option<ScopedConfig>,
}

/// Resolver with a TTL cache in front of the config repository.
pub struct ConfigResolver {
    repo: Arc<dyn ScopedConfigRepository>,
    cache: RwLock<HashMap<Scope, CachedLookup>>,
    ttl: Duration,
}

impl ConfigResolver {
    pub fn new(repo: Arc<dyn ScopedConfigRepository>) -> Self {
        Self::with_ttl(repo, Duration::from_secs(CONFIG_CACHE_SECS))
    }

    /// A zero TTL disables caching.
    pub fn with_ttl(repo: Arc<dyn ScopedConfigRepository>, ttl: Duration) -> Self {
        Self {
            repo,
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn repository(&self) -> &Arc<dyn ScopedConfigRepository> {
        &self.repo
    }

    /// Resolve the config for `scope`.
    ///
    /// Fails with [`Error::ConfigurationMissing`] when neither an active
    /// exact match nor a Global config exists.
    pub async fn resolve(&self, scope: &Scope) -> Result<ResolvedConfig> {
        if !scope.is_global() {
            if let Some(config) = self.lookup(scope).await? {
                if config.active {
                    debug!(scope = %scope, "Resolved scope-specific config");
                    return Ok(ResolvedConfig {
                        config,
                        inherited: false,
                    });
                }
                debug!(scope = %scope, "Scope config inactive, using global");
            }
        }

        match self.lookup(&Scope::global()).await? {
            Some(config) => {
                debug!(scope = %scope, "Resolved global config");
                Ok(ResolvedConfig {
                    config,
                    inherited: !scope.is_global(),
                })
            }
            None => Err(Error::ConfigurationMissing(
                "no global scoped config exists".to_string(),
            )),
        }
    }

    async fn lookup(&self, scope: &Scope) -> Result<Option<ScopedConfig>> {
        if !self.ttl.is_zero() {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(scope) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok(entry.config.clone());
                }
            }
        }

        let config = self.repo.find(scope).await?;
        if !self.ttl.is_zero() {
            self.cache.write().await.insert(
                scope.clone(),
                CachedLookup {
                    fetched_at: Instant::now(),
                    config: config.clone(),
                },
            );
        }
        Ok(config)
    }

    /// Drop cached lookups for `scope`.
    pub async fn invalidate(&self, scope: &Scope) {
        self.cache.write().await.remove(scope);
    }

    pub async fn invalidate_all(&self) {
        self.cache.write().await.clear();
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    /// Validate and store a config. Last writer wins.
    pub async fn upsert(&self, config: &ScopedConfig) -> Result<()> {
        config.validate()?;
        self.repo.upsert(config).await?;
        self.invalidate(&config.scope).await;
        info!(scope = %config.scope, active = config.active, "Scoped config saved");
        Ok(())
    }

    /// Deactivate a scope's config. Configs are never deleted.
    pub async fn deactivate(&self, scope: &Scope) -> Result<bool> {
        if scope.is_global() {
            return Err(Error::InvalidInput(
                "the global config cannot be deactivated".to_string(),
            ));
        }
        let changed = self.repo.deactivate(scope).await?;
        self.invalidate(scope).await;
        if changed {
            info!(scope = %scope, "Scoped config deactivated");
        }
        Ok(changed)
    }

    /// Toggle one operation on a scope's own config.
    pub async fn set_operation_enabled(
        &self,
        scope: &Scope,
        op: OperationKind,
        enabled: bool,
    ) -> Result<()> {
        let mut config = self
            .repo
            .find(scope)
            .await?
            .ok_or_else(|| Error::NotFound(format!("scoped config {}", scope)))?;
        let mut settings = config.operation(op);
        settings.enabled = enabled;
        config.operations.insert(op, settings);
        self.upsert(&config).await
    }

    /// Store the default Global config when none exists. Returns true when seeded.
    pub async fn seed_global_if_missing(&self) -> Result<bool> {
        if self.repo.find(&Scope::global()).await?.is_some() {
            return Ok(false);
        }
        warn!("No global scoped config found, seeding defaults");
        self.upsert(&ScopedConfig::global_default()).await?;
        Ok(true)
    }
}

impl std::fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
