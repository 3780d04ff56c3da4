//! Core traits for agora's persistence and cache collaborators.
//!
//! These traits define the interfaces that concrete backends must satisfy,
//! so the orchestrator can run against Postgres and Redis in production and
//! in-memory stores in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::scoped_config::ScopedConfig;

// =============================================================================
// SCOPED CONFIG REPOSITORY
// =============================================================================

/// Outcome of an atomic spend increment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendUpdate {
    /// Spend in `period` before this increment (zero after a rollover).
    pub before: f64,
    /// Spend in `period` after this increment.
    pub after: f64,
    pub limit: f64,
    pub alert_threshold: f64,
    pub period: String,
    pub alert_sent_for_period: bool,
}

impl SpendUpdate {
    /// Spend level at which the alert fires.
    pub fn alert_level(&self) -> f64 {
        self.limit * self.alert_threshold
    }

    /// True when spend has reached the alert level and no alert has been
    /// sent for this period yet.
    pub fn alert_due(&self) -> bool {
        !self.alert_sent_for_period && self.after >= self.alert_level()
    }
}

/// Repository for tenant configuration records.
#[async_trait]
pub trait ScopedConfigRepository: Send + Sync {
    /// Exact lookup by scope, including deactivated configs.
    async fn find(&self, scope: &Scope) -> Result<Option<ScopedConfig>>;

    /// Insert or replace a config (last writer wins).
    ///
    /// The stored spend accumulator (spent, period, alert flag) is kept; it
    /// only changes through [`record_spend`](Self::record_spend).
    async fn upsert(&self, config: &ScopedConfig) -> Result<()>;

    /// Mark a config inactive. Returns false when no config exists.
    async fn deactivate(&self, scope: &Scope) -> Result<bool>;

    /// All configs, ordered by scope.
    async fn list(&self) -> Result<Vec<ScopedConfig>>;

    /// Atomically add `amount` to the scope's monthly spend.
    ///
    /// When the stored period differs from `at`'s period the accumulator is
    /// reset (and the alert flag cleared) before adding.
    async fn record_spend(
        &self,
        scope: &Scope,
        amount: f64,
        at: DateTime<Utc>,
    ) -> Result<SpendUpdate>;

    /// Set the alert flag for `period`. Returns true only for the call that
    /// flipped it.
    async fn mark_alert_sent(&self, scope: &Scope, period: &str) -> Result<bool>;
}

// =============================================================================
// INTERACTION REPOSITORY
// =============================================================================

/// Durable storage for the interaction ledger.
#[async_trait]
pub trait InteractionRepository: Send + Sync {
    async fn insert(&self, interaction: &Interaction) -> Result<()>;

    /// Overwrite the stored record with `interaction`'s current fields.
    async fn update(&self, interaction: &Interaction) -> Result<()>;

    async fn get(&self, request_id: Uuid) -> Result<Option<Interaction>>;

    /// Replace only the feedback sub-object.
    async fn attach_feedback(&self, request_id: Uuid, feedback: &Feedback) -> Result<()>;

    /// Most recent interactions for a request scope.
    async fn list_for_scope(&self, scope: &Scope, limit: i64) -> Result<Vec<Interaction>>;

    /// Aggregate usage for a request scope since `since`.
    async fn usage_summary(&self, scope: &Scope, since: DateTime<Utc>) -> Result<UsageSummary>;
}

// =============================================================================
// EMBEDDING REPOSITORY
// =============================================================================

/// Storage for content embeddings. One record per [`ContentRef`].
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Store a record after validating the dimension invariant.
    ///
    /// Records are immutable: if one already exists for the content, it is
    /// returned unchanged.
    async fn insert(&self, record: &EmbeddingRecord) -> Result<EmbeddingRecord>;

    async fn get(&self, content: &ContentRef) -> Result<Option<EmbeddingRecord>>;

    /// Flip the indexing marker. Returns false when no record exists.
    async fn mark_indexed(&self, content: &ContentRef) -> Result<bool>;

    /// Remove a record so the content can be embedded again.
    async fn delete(&self, content: &ContentRef) -> Result<bool>;

    /// Records matching every provided filter field.
    async fn candidates(&self, filter: &EmbeddingFilter) -> Result<Vec<EmbeddingRecord>>;
}

// =============================================================================
// CACHE BACKING STORE
// =============================================================================

/// Key/value store with TTL expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Short backend name for logs ("redis", "memory").
    fn backend(&self) -> &'static str;
}
