//! The per-request state machine.
//!
//! ```text
//! Pending ──► Processing ──► Completed
//!    │             └───────► Failed
//!    ├──► Cached
//!    ├──► RateLimited
//!    └──► Failed   (disabled, over budget, missing config)
//! ```
//!
//! Every call produces exactly one ledger record, whatever its outcome.
//! Providers are tried one at a time along the fallback chain; transient
//! failures are retried on the same provider, permanent and unsupported
//! failures move straight on to the next one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use agora_core::defaults::{
    CACHE_KEY_PREFIX, CONFIG_CACHE_SECS, EMBED_EXCERPT_LEN, PROVIDER_TIMEOUT_SECS,
};
use agora_core::{
    AiEvent, AttemptOutcome, CacheStore, Content, ContentRef, EmbeddingRecord,
    EmbeddingRepository, Error, EventBus, Feedback, Interaction, InteractionError,
    InteractionRepository, InteractionStatus, NormalizedResult, OperationKind,
    OperationRequest, OperationSettings, OutputDescriptor, ProviderAttempt, ProviderKind,
    Result, Scope, ScopedConfig, ScopedConfigRepository, UsageSummary,
};
use agora_inference::{
    ExecuteOptions, PricingTable, Provider, ProviderError, ProviderOutput, ProviderRegistry,
};
use agora_search::{SimilarityHit, SimilarityQuery, SimilaritySearch};

use crate::budget::BudgetGuard;
use crate::cache::{fingerprint, CachedResult, ResultCache};
use crate::ledger::InteractionLedger;
use crate::rate_limit::RateLimiter;
use crate::resolver::ConfigResolver;
use crate::retry::RetryPolicy;

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// What a caller gets back from [`Orchestrator::submit`].
#[derive(Debug)]
pub struct SubmitOutcome {
    pub request_id: Uuid,
    pub status: InteractionStatus,
    /// Provider that served the result (or the cached entry's producer).
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub result: Result<NormalizedResult>,
    /// False when the final ledger record could not be persisted.
    pub recorded: bool,
}

impl SubmitOutcome {
    pub fn into_result(self) -> Result<NormalizedResult> {
        self.result
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Wires collaborators into an [`Orchestrator`].
pub struct OrchestratorBuilder {
    configs: Arc<dyn ScopedConfigRepository>,
    interactions: Arc<dyn InteractionRepository>,
    embeddings: Arc<dyn EmbeddingRepository>,
    cache_store: Arc<dyn CacheStore>,
    providers: ProviderRegistry,
    pricing: PricingTable,
    retry: RetryPolicy,
    provider_timeout: Duration,
    config_cache_ttl: Duration,
    cache_prefix: String,
    events: EventBus,
}

impl OrchestratorBuilder {
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_config_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config_cache_ttl = ttl;
        self
    }

    pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_prefix = prefix.into();
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> Orchestrator {
        info!(
            subsystem = "orchestrator",
            providers = ?self.providers.kinds(),
            cache_backend = self.cache_store.backend(),
            max_retries = self.retry.max_retries,
            provider_timeout_secs = self.provider_timeout.as_secs(),
            "Orchestrator initialized"
        );
        Orchestrator {
            resolver: Arc::new(ConfigResolver::with_ttl(
                self.configs.clone(),
                self.config_cache_ttl,
            )),
            cache: ResultCache::with_prefix(self.cache_store, self.cache_prefix),
            rate_limiter: RateLimiter::new(),
            budget: BudgetGuard::new(self.configs, self.events.clone()),
            ledger: InteractionLedger::new(self.interactions),
            search: SimilaritySearch::new(self.embeddings.clone()),
            embeddings: self.embeddings,
            providers: self.providers,
            pricing: self.pricing,
            retry: self.retry,
            provider_timeout: self.provider_timeout,
            events: self.events,
        }
    }
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Single entry point for AI operations.
pub struct Orchestrator {
    resolver: Arc<ConfigResolver>,
    cache: ResultCache,
    rate_limiter: RateLimiter,
    budget: BudgetGuard,
    ledger: InteractionLedger,
    embeddings: Arc<dyn EmbeddingRepository>,
    search: SimilaritySearch,
    providers: ProviderRegistry,
    pricing: PricingTable,
    retry: RetryPolicy,
    provider_timeout: Duration,
    events: EventBus,
}

impl Orchestrator {
    pub fn builder(
        configs: Arc<dyn ScopedConfigRepository>,
        interactions: Arc<dyn InteractionRepository>,
        embeddings: Arc<dyn EmbeddingRepository>,
        cache_store: Arc<dyn CacheStore>,
        providers: ProviderRegistry,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            configs,
            interactions,
            embeddings,
            cache_store,
            providers,
            pricing: PricingTable::default(),
            retry: RetryPolicy::default(),
            provider_timeout: Duration::from_secs(PROVIDER_TIMEOUT_SECS),
            config_cache_ttl: Duration::from_secs(CONFIG_CACHE_SECS),
            cache_prefix: CACHE_KEY_PREFIX.to_string(),
            events: EventBus::default(),
        }
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Calls whose ledger record could not be persisted since startup.
    pub fn unrecorded_interactions(&self) -> u64 {
        self.ledger.unrecorded()
    }

    /// Run one AI operation through the full state machine.
    #[instrument(
        skip(self, request),
        fields(subsystem = "orchestrator", op = %request.operation, scope = %request.scope)
    )]
    pub async fn submit(&self, request: OperationRequest) -> SubmitOutcome {
        let started = Instant::now();
        let mut interaction = Interaction::pending(&request);
        let request_id = interaction.request_id;

        if let Err(e) = self.ledger.open(&interaction).await {
            error!(request_id = %request_id, error = %e, "Failed to open interaction");
            self.ledger.note_unrecorded();
            return SubmitOutcome {
                request_id,
                status: interaction.status,
                provider: None,
                model: None,
                result: Err(e),
                recorded: false,
            };
        }

        let result = self.run(&request, &mut interaction).await;

        if let Err(err) = &result {
            interaction.error = Some(InteractionError::from(err));
            if !interaction.status.is_terminal() {
                if let Err(e) = interaction.advance(InteractionStatus::Failed) {
                    error!(request_id = %request_id, error = %e, "Could not mark interaction failed");
                }
            }
        }
        interaction.metrics.latency.total_ms = elapsed_ms(started);
        let recorded = self.ledger.save_final(&interaction).await;

        self.events.emit(AiEvent::InteractionFinished {
            request_id,
            scope: interaction.scope.key(),
            operation: interaction.operation,
            status: interaction.status,
            cost_usd: interaction.metrics.cost_usd,
        });

        match &result {
            Ok(_) => info!(
                request_id = %request_id,
                status = %interaction.status,
                provider = ?interaction.provider,
                model = interaction.model.as_deref().unwrap_or(""),
                cost = interaction.metrics.cost_usd,
                cache_hit = interaction.metrics.cache_hit,
                duration_ms = interaction.metrics.latency.total_ms,
                "Interaction finished"
            ),
            Err(e @ Error::ConfigurationMissing(_)) => error!(
                request_id = %request_id,
                error = %e,
                "AI subsystem has no global configuration"
            ),
            Err(e) => warn!(
                request_id = %request_id,
                status = %interaction.status,
                kind = %e.kind(),
                error = %e,
                duration_ms = interaction.metrics.latency.total_ms,
                "Interaction did not complete"
            ),
        }

        SubmitOutcome {
            request_id,
            status: interaction.status,
            provider: interaction.provider,
            model: interaction.model.clone(),
            result,
            recorded,
        }
    }

    async fn run(
        &self,
        request: &OperationRequest,
        interaction: &mut Interaction,
    ) -> Result<NormalizedResult> {
        let op = request.operation;
        if request.content.is_empty() {
            return Err(Error::InvalidInput("content is empty".to_string()));
        }

        let t = Instant::now();
        let resolved = self.resolver.resolve(&request.scope).await?;
        interaction.metrics.latency.config_ms = elapsed_ms(t);
        interaction.config_scope = Some(resolved.scope().clone());

        let config = &resolved.config;
        let settings = config.operation(op);
        interaction.provider = Some(settings.provider);
        interaction.model = Some(settings.model.clone());

        if !config.is_enabled(op) {
            return Err(Error::Disabled {
                operation: op,
                scope: resolved.scope().key(),
            });
        }
        self.budget.check(config, Utc::now()).await?;

        let options = ExecuteOptions::resolve(&settings, &request.options);
        let fp = fingerprint(op, &request.content, &settings.model, &options);
        interaction.fingerprint = Some(fp.clone());

        let ttl = config.cache.ttl_for(op);
        if ttl > 0 {
            let t = Instant::now();
            let hit = self.cache.get(op, &request.scope, &fp).await;
            interaction.metrics.latency.cache_ms = elapsed_ms(t);
            if let Some(entry) = hit {
                interaction.provider = Some(entry.provider);
                interaction.model = Some(entry.model);
                interaction.metrics.cache_hit = true;
                interaction.output = Some(OutputDescriptor::describe(&entry.result));
                interaction.quality.confidence = entry.result.confidence();
                interaction.advance(InteractionStatus::Cached)?;
                return Ok(entry.result);
            }
        }

        if let Err(err) = self
            .rate_limiter
            .check_and_admit(&request.scope, &config.rate_limits)
        {
            interaction.advance(InteractionStatus::RateLimited)?;
            if let Error::RateLimited {
                window,
                retry_after_secs,
                ..
            } = &err
            {
                self.events.emit(AiEvent::RateLimited {
                    request_id: interaction.request_id,
                    scope: request.scope.key(),
                    window: window.clone(),
                    retry_after_secs: *retry_after_secs,
                });
            }
            return Err(err);
        }

        self.ledger
            .transition(interaction, InteractionStatus::Processing)
            .await?;

        let t = Instant::now();
        let dispatched = self
            .dispatch(op, &request.content, config, &settings, &options, interaction)
            .await;
        interaction.metrics.latency.provider_ms = elapsed_ms(t);
        let (kind, output) = dispatched?;

        let cost = self.pricing.cost(kind, &output.model, output.usage);
        interaction.provider = Some(kind);
        interaction.model = Some(output.model.clone());
        if let Some(usage) = output.usage {
            interaction.metrics.tokens_in = usage.input_tokens;
            interaction.metrics.tokens_out = usage.output_tokens;
        }
        interaction.metrics.cost_usd = cost;
        interaction.output = Some(OutputDescriptor::describe(&output.result));
        interaction.quality.confidence = output.result.confidence();
        interaction.advance(InteractionStatus::Completed)?;

        let entry = CachedResult {
            result: output.result,
            provider: kind,
            model: output.model,
        };
        self.cache
            .put(op, &request.scope, &fp, &entry, ttl, config.cache.max_entries)
            .await;

        if let Err(e) = self.budget.charge(config, cost, Utc::now()).await {
            error!(
                request_id = %interaction.request_id,
                scope = %config.scope,
                cost,
                error = %e,
                "Failed to record spend"
            );
        }
        Ok(entry.result)
    }

    /// Walk the provider chain until one succeeds.
    async fn dispatch(
        &self,
        op: OperationKind,
        content: &Content,
        config: &ScopedConfig,
        settings: &OperationSettings,
        options: &ExecuteOptions,
        interaction: &mut Interaction,
    ) -> Result<(ProviderKind, ProviderOutput)> {
        let chain: Vec<(ProviderKind, Arc<dyn Provider>)> = config
            .provider_chain(op)
            .into_iter()
            .filter_map(|kind| match self.providers.get(kind) {
                Some(provider) => Some((kind, provider)),
                None => {
                    debug!(provider = %kind, "Provider not registered, skipping");
                    None
                }
            })
            .collect();

        let mut last_error = None;
        for (index, (kind, provider)) in chain.iter().enumerate() {
            let kind = *kind;
            let model = if kind == settings.provider {
                settings.model.clone()
            } else {
                provider.default_model(op)
            };
            debug!(provider = %kind, model = %model, "Dispatching to provider");

            let mut calls = 0u32;
            let failure = loop {
                calls += 1;
                match self
                    .call_provider(provider.as_ref(), op, content, &model, options)
                    .await
                {
                    Ok(output) => {
                        interaction.attempts.push(ProviderAttempt {
                            provider: kind,
                            model,
                            calls,
                            outcome: AttemptOutcome::Succeeded,
                            error: None,
                        });
                        return Ok((kind, output));
                    }
                    Err(err) if err.is_retryable() && self.retry.allows(calls - 1) => {
                        let delay = self.retry.delay_for(calls - 1, err.retry_after_secs());
                        interaction.metrics.retry_count += 1;
                        warn!(
                            provider = %kind,
                            attempt = calls,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Transient provider failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(err) => break err,
                }
            };

            let next = chain.get(index + 1).map(|(k, _)| *k);
            warn!(
                provider = %kind,
                calls,
                failure = ?failure.outcome(),
                next = ?next,
                error = %failure,
                "Provider failed, falling back"
            );
            self.events.emit(AiEvent::ProviderFallback {
                request_id: interaction.request_id,
                operation: op,
                from: kind,
                to: next,
                reason: failure.to_string(),
            });
            interaction.attempts.push(ProviderAttempt {
                provider: kind,
                model,
                calls,
                outcome: failure.outcome(),
                error: Some(failure.to_string()),
            });
            last_error = Some(failure.to_string());
        }

        Err(Error::AllProvidersExhausted {
            operation: op,
            attempted: interaction
                .attempts
                .iter()
                .map(|a| a.provider.to_string())
                .collect(),
            last_error: last_error
                .unwrap_or_else(|| "no registered provider for this operation".to_string()),
        })
    }

    /// One bounded call. Timeouts are transient; a result of the wrong
    /// shape is permanent.
    async fn call_provider(
        &self,
        provider: &dyn Provider,
        op: OperationKind,
        content: &Content,
        model: &str,
        options: &ExecuteOptions,
    ) -> std::result::Result<ProviderOutput, ProviderError> {
        let call = provider.execute(op, content, model, options);
        match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(Ok(output)) if output.result.matches_operation(op) => Ok(output),
            Ok(Ok(output)) => Err(ProviderError::permanent(format!(
                "{} returned a {} result for {}",
                provider.kind(),
                output.result.kind_str(),
                op
            ))),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ProviderError::transient(format!(
                "{} timed out after {}ms",
                provider.kind(),
                self.provider_timeout.as_millis()
            ))),
        }
    }

    // =========================================================================
    // LEDGER QUERIES
    // =========================================================================

    /// Attach human feedback to a finished interaction.
    pub async fn attach_feedback(
        &self,
        request_id: Uuid,
        rating: u8,
        helpful: Option<bool>,
        corrections: Option<String>,
    ) -> Result<()> {
        let feedback = Feedback::new(rating, helpful, corrections)?;
        self.ledger.attach_feedback(request_id, &feedback).await
    }

    pub async fn interaction(&self, request_id: Uuid) -> Result<Option<Interaction>> {
        self.ledger.get(request_id).await
    }

    pub async fn recent_interactions(&self, scope: &Scope, limit: i64) -> Result<Vec<Interaction>> {
        self.ledger.recent(scope, limit).await
    }

    pub async fn usage_summary(&self, scope: &Scope, since: DateTime<Utc>) -> Result<UsageSummary> {
        self.ledger.usage_summary(scope, since).await
    }

    // =========================================================================
    // EMBEDDINGS
    // =========================================================================

    /// Embed `text` for `content` and store the vector.
    ///
    /// Embeddings are immutable: an existing record is returned without a
    /// provider call.
    pub async fn embed_content(
        &self,
        content: ContentRef,
        text: &str,
        scope: Scope,
    ) -> Result<EmbeddingRecord> {
        if let Some(existing) = self.embeddings.get(&content).await? {
            debug!(content = %content, "Embedding already stored");
            return Ok(existing);
        }

        let request =
            OperationRequest::new(OperationKind::Embed, Content::text(text), scope.clone());
        let outcome = self.submit(request).await;
        let model = outcome.model.clone().unwrap_or_default();
        match outcome.result? {
            NormalizedResult::Embedding { vector, dimensions } => {
                let record = EmbeddingRecord::new(
                    content,
                    scope,
                    model,
                    vector,
                    dimensions,
                    text,
                    EMBED_EXCERPT_LEN,
                )?;
                self.embeddings.insert(&record).await
            }
            other => Err(Error::Internal(format!(
                "embed produced a {} result",
                other.kind_str()
            ))),
        }
    }

    pub async fn mark_indexed(&self, content: &ContentRef) -> Result<bool> {
        self.embeddings.mark_indexed(content).await
    }

    pub async fn find_similar(
        &self,
        vector: &[f32],
        query: &SimilarityQuery,
    ) -> Result<Vec<SimilarityHit>> {
        self.search.find_similar(vector, query).await
    }

    /// Embed `text` under `scope` and search for its nearest neighbours.
    pub async fn find_similar_to_text(
        &self,
        text: &str,
        scope: Scope,
        query: &SimilarityQuery,
    ) -> Result<Vec<SimilarityHit>> {
        let request = OperationRequest::new(OperationKind::Embed, Content::text(text), scope);
        match self.submit(request).await.into_result()? {
            NormalizedResult::Embedding { vector, .. } => {
                self.search.find_similar(&vector, query).await
            }
            other => Err(Error::Internal(format!(
                "embed produced a {} result",
                other.kind_str()
            ))),
        }
    }

    // =========================================================================
    // DIAGNOSTICS
    // =========================================================================

    /// Health of every registered provider, in canonical order.
    pub async fn provider_health(&self) -> Vec<(ProviderKind, bool)> {
        let mut health = Vec::new();
        for kind in self.providers.kinds() {
            if let Some(provider) = self.providers.get(kind) {
                let healthy = provider.health_check().await;
                if !healthy {
                    warn!(provider = %kind, "Provider unhealthy");
                }
                health.push((kind, healthy));
            }
        }
        health
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.providers)
            .field("cache", &self.cache)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
