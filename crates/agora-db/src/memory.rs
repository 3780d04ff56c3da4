//! In-memory repositories.
//!
//! Used when no `DATABASE_URL` is configured and by tests. Each repository
//! guards its map with a single lock, so read-modify-write operations such as
//! [`ScopedConfigRepository::record_spend`] are atomic per process.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use agora_core::{
    budget_period, ContentRef, EmbeddingFilter, EmbeddingRecord, EmbeddingRepository, Error,
    Feedback, Interaction, InteractionRepository, Result, Scope, ScopedConfig,
    ScopedConfigRepository, SpendUpdate, UsageSummary,
};

// =============================================================================
// SCOPED CONFIG
// =============================================================================

#[derive(Default)]
pub struct InMemoryConfigRepository {
    configs: RwLock<BTreeMap<Scope, ScopedConfig>>,
}

impl InMemoryConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated with `configs` (validated).
    pub async fn with_configs(configs: impl IntoIterator<Item = ScopedConfig>) -> Result<Self> {
        let repo = Self::new();
        for config in configs {
            repo.upsert(&config).await?;
        }
        Ok(repo)
    }
}

#[async_trait]
impl ScopedConfigRepository for InMemoryConfigRepository {
    async fn find(&self, scope: &Scope) -> Result<Option<ScopedConfig>> {
        Ok(self.configs.read().await.get(scope).cloned())
    }

    async fn upsert(&self, config: &ScopedConfig) -> Result<()> {
        config.validate()?;
        let mut configs = self.configs.write().await;
        let mut next = config.clone();
        next.updated_at = Utc::now();
        if let Some(existing) = configs.get(&config.scope) {
            next.id = existing.id;
            next.created_at = existing.created_at;
            next.budget.current_month_spent = existing.budget.current_month_spent;
            next.budget.period = existing.budget.period.clone();
            next.budget.alert_sent_for_period = existing.budget.alert_sent_for_period;
        }
        configs.insert(config.scope.clone(), next);
        Ok(())
    }

    async fn deactivate(&self, scope: &Scope) -> Result<bool> {
        let mut configs = self.configs.write().await;
        match configs.get_mut(scope) {
            Some(config) => {
                config.active = false;
                config.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<ScopedConfig>> {
        Ok(self.configs.read().await.values().cloned().collect())
    }

    async fn record_spend(
        &self,
        scope: &Scope,
        amount: f64,
        at: DateTime<Utc>,
    ) -> Result<SpendUpdate> {
        let period = budget_period(at);
        let mut configs = self.configs.write().await;
        let config = configs
            .get_mut(scope)
            .ok_or_else(|| Error::NotFound(format!("scoped config {}", scope)))?;

        let budget = &mut config.budget;
        if budget.period != period {
            budget.period = period.clone();
            budget.current_month_spent = 0.0;
            budget.alert_sent_for_period = false;
        }
        let before = budget.current_month_spent;
        budget.current_month_spent += amount;
        config.updated_at = Utc::now();

        Ok(SpendUpdate {
            before,
            after: config.budget.current_month_spent,
            limit: config.budget.monthly_limit_usd,
            alert_threshold: config.budget.alert_threshold,
            period,
            alert_sent_for_period: config.budget.alert_sent_for_period,
        })
    }

    async fn mark_alert_sent(&self, scope: &Scope, period: &str) -> Result<bool> {
        let mut configs = self.configs.write().await;
        match configs.get_mut(scope) {
            Some(config)
                if config.budget.period == period && !config.budget.alert_sent_for_period =>
            {
                config.budget.alert_sent_for_period = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// =============================================================================
// INTERACTIONS
// =============================================================================

#[derive(Default)]
pub struct InMemoryInteractionRepository {
    interactions: RwLock<HashMap<Uuid, Interaction>>,
}

impl InMemoryInteractionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.interactions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.interactions.read().await.is_empty()
    }
}

#[async_trait]
impl InteractionRepository for InMemoryInteractionRepository {
    async fn insert(&self, interaction: &Interaction) -> Result<()> {
        let mut map = self.interactions.write().await;
        if map.contains_key(&interaction.request_id) {
            return Err(Error::InvalidInput(format!(
                "interaction {} already exists",
                interaction.request_id
            )));
        }
        map.insert(interaction.request_id, interaction.clone());
        Ok(())
    }

    async fn update(&self, interaction: &Interaction) -> Result<()> {
        let mut map = self.interactions.write().await;
        let stored = map
            .get_mut(&interaction.request_id)
            .ok_or_else(|| Error::NotFound(format!("interaction {}", interaction.request_id)))?;
        let feedback = stored.quality.feedback.take();
        *stored = interaction.clone();
        if feedback.is_some() {
            stored.quality.feedback = feedback;
        }
        Ok(())
    }

    async fn get(&self, request_id: Uuid) -> Result<Option<Interaction>> {
        Ok(self.interactions.read().await.get(&request_id).cloned())
    }

    async fn attach_feedback(&self, request_id: Uuid, feedback: &Feedback) -> Result<()> {
        let mut map = self.interactions.write().await;
        let stored = map
            .get_mut(&request_id)
            .ok_or_else(|| Error::NotFound(format!("interaction {}", request_id)))?;
        stored.quality.feedback = Some(feedback.clone());
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn list_for_scope(&self, scope: &Scope, limit: i64) -> Result<Vec<Interaction>> {
        let map = self.interactions.read().await;
        let mut matches: Vec<Interaction> =
            map.values().filter(|i| i.scope == *scope).cloned().collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(limit.max(0) as usize);
        Ok(matches)
    }

    async fn usage_summary(&self, scope: &Scope, since: DateTime<Utc>) -> Result<UsageSummary> {
        let map = self.interactions.read().await;
        Ok(UsageSummary::from_interactions(
            scope,
            map.values()
                .filter(|i| i.scope == *scope && i.created_at >= since),
        ))
    }
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

#[derive(Default)]
pub struct InMemoryEmbeddingRepository {
    records: RwLock<BTreeMap<ContentRef, EmbeddingRecord>>,
}

impl InMemoryEmbeddingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingRepository for InMemoryEmbeddingRepository {
    async fn insert(&self, record: &EmbeddingRecord) -> Result<EmbeddingRecord> {
        record.validate()?;
        let mut records = self.records.write().await;
        let stored = records
            .entry(record.content.clone())
            .or_insert_with(|| record.clone());
        Ok(stored.clone())
    }

    async fn get(&self, content: &ContentRef) -> Result<Option<EmbeddingRecord>> {
        Ok(self.records.read().await.get(content).cloned())
    }

    async fn mark_indexed(&self, content: &ContentRef) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(content) {
            Some(record) => {
                if !record.indexed {
                    record.indexed = true;
                    record.indexed_at = Some(Utc::now());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, content: &ContentRef) -> Result<bool> {
        Ok(self.records.write().await.remove(content).is_some())
    }

    async fn candidates(&self, filter: &EmbeddingFilter) -> Result<Vec<EmbeddingRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}
