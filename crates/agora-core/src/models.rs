//! Core data models for the agora AI engine.
//!
//! These types are shared across all agora crates: request shapes, normalized
//! provider results, the interaction ledger record, embeddings and the
//! engagement snapshots consumed by ranking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::error::{Error, ErrorKind, Result};
use crate::tokenizer::estimate_tokens;
use crate::uuid_utils::new_v7;

// =============================================================================
// SCOPE
// =============================================================================

/// Identifier used by the single Global scope.
pub const GLOBAL_SCOPE_ID: &str = "global";

/// Tenancy level a configuration and budget apply to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Global,
    College,
    Department,
    User,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::College => "college",
            Self::Department => "department",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScopeKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "college" => Ok(Self::College),
            "department" => Ok(Self::Department),
            "user" => Ok(Self::User),
            _ => Err(format!("Invalid scope kind: {}", s)),
        }
    }
}

/// A tenancy boundary: `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: String,
}

impl Scope {
    pub fn new(kind: ScopeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn global() -> Self {
        Self::new(ScopeKind::Global, GLOBAL_SCOPE_ID)
    }

    pub fn college(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::College, id)
    }

    pub fn department(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Department, id)
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(ScopeKind::User, id)
    }

    pub fn is_global(&self) -> bool {
        self.kind == ScopeKind::Global
    }

    /// Stable `kind:id` key used for cache keys, rate limit buckets and logs.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Kind of content-intelligence request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Moderate,
    Tag,
    Summarize,
    Embed,
    Chat,
    StudyAssist,
    CodeHelp,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        Self::Moderate,
        Self::Tag,
        Self::Summarize,
        Self::Embed,
        Self::Chat,
        Self::StudyAssist,
        Self::CodeHelp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moderate => "moderate",
            Self::Tag => "tag",
            Self::Summarize => "summarize",
            Self::Embed => "embed",
            Self::Chat => "chat",
            Self::StudyAssist => "study_assist",
            Self::CodeHelp => "code_help",
        }
    }

    /// Operations that produce free-form text.
    pub fn is_conversational(&self) -> bool {
        matches!(self, Self::Chat | Self::StudyAssist | Self::CodeHelp)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "moderate" => Ok(Self::Moderate),
            "tag" => Ok(Self::Tag),
            "summarize" => Ok(Self::Summarize),
            "embed" => Ok(Self::Embed),
            "chat" => Ok(Self::Chat),
            "study_assist" => Ok(Self::StudyAssist),
            "code_help" => Ok(Self::CodeHelp),
            _ => Err(format!("Invalid operation kind: {}", s)),
        }
    }
}

/// Request payload: plain text or a structured document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Content {
    Text(String),
    Structured(JsonValue),
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Structured(_) => "structured",
        }
    }

    /// Text sent to providers. Structured payloads are rendered as JSON.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Structured(v) => v.to_string(),
        }
    }

    /// Whitespace-normalized form used for fingerprinting.
    ///
    /// Text is trimmed with internal whitespace runs collapsed to one space.
    /// Structured values serialize with sorted object keys.
    pub fn normalized(&self) -> String {
        match self {
            Self::Text(s) => s.split_whitespace().collect::<Vec<_>>().join(" "),
            Self::Structured(v) => v.to_string(),
        }
    }

    pub fn char_len(&self) -> usize {
        match self {
            Self::Text(s) => s.chars().count(),
            Self::Structured(v) => v.to_string().chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Structured(v) => v.is_null(),
        }
    }
}

/// Optional behavioral knobs a caller may pass with a request.
///
/// Unset fields fall back to the resolved `OperationSettings`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tags: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, JsonValue>,
}

/// Transient per-call request. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation: OperationKind,
    pub content: Content,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    #[serde(default)]
    pub options: OperationOptions,
}

impl OperationRequest {
    pub fn new(operation: OperationKind, content: Content, scope: Scope) -> Self {
        Self {
            operation,
            content,
            scope,
            caller_id: None,
            options: OperationOptions::default(),
        }
    }

    pub fn with_caller(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    pub fn with_options(mut self, options: OperationOptions) -> Self {
        self.options = options;
        self
    }
}

// =============================================================================
// NORMALIZED RESULTS
// =============================================================================

/// Provider-independent result shape, one variant per operation family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedResult {
    Moderation {
        flagged: bool,
        categories: BTreeSet<String>,
        scores: BTreeMap<String, f64>,
        confidence: f64,
    },
    Tags {
        tags: Vec<String>,
        confidence: f64,
    },
    Summary {
        summary: String,
        original_length: usize,
        summary_length: usize,
    },
    Embedding {
        vector: Vec<f32>,
        dimensions: usize,
    },
    Text {
        text: String,
        #[serde(default)]
        structured_fields: BTreeMap<String, JsonValue>,
    },
}

impl NormalizedResult {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Moderation { .. } => "moderation",
            Self::Tags { .. } => "tags",
            Self::Summary { .. } => "summary",
            Self::Embedding { .. } => "embedding",
            Self::Text { .. } => "text",
        }
    }

    /// Whether this shape is the one `op` must produce.
    pub fn matches_operation(&self, op: OperationKind) -> bool {
        matches!(
            (self, op),
            (Self::Moderation { .. }, OperationKind::Moderate)
                | (Self::Tags { .. }, OperationKind::Tag)
                | (Self::Summary { .. }, OperationKind::Summarize)
                | (Self::Embedding { .. }, OperationKind::Embed)
                | (
                    Self::Text { .. },
                    OperationKind::Chat | OperationKind::StudyAssist | OperationKind::CodeHelp
                )
        )
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            Self::Moderation { confidence, .. } | Self::Tags { confidence, .. } => {
                Some(*confidence)
            }
            _ => None,
        }
    }

    /// Size of the output in its natural unit (items, chars or dimensions).
    pub fn output_size(&self) -> usize {
        match self {
            Self::Moderation { categories, .. } => categories.len(),
            Self::Tags { tags, .. } => tags.len(),
            Self::Summary { summary_length, .. } => *summary_length,
            Self::Embedding { dimensions, .. } => *dimensions,
            Self::Text { text, .. } => text.chars().count(),
        }
    }
}

/// Provider backends known to the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "ollama")]
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::OpenAi, Self::Anthropic, Self::Ollama];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            _ => Err(format!("Invalid provider: {}", s)),
        }
    }
}

// =============================================================================
// INTERACTION LEDGER
// =============================================================================

/// Lifecycle state of one AI call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    RateLimited,
    Cached,
}

impl InteractionStatus {
    pub const ALL: [InteractionStatus; 6] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::RateLimited,
        Self::Cached,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RateLimited => "rate_limited",
            Self::Cached => "cached",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::RateLimited | Self::Cached
        )
    }

    /// Legal forward transitions. No state is ever revisited.
    pub fn can_transition_to(&self, next: InteractionStatus) -> bool {
        use InteractionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing | Failed | Cached | RateLimited) | (Processing, Completed | Failed)
        )
    }
}

impl std::fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InteractionStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "rate_limited" => Ok(Self::RateLimited),
            "cached" => Ok(Self::Cached),
            _ => Err(format!("Invalid interaction status: {}", s)),
        }
    }
}

/// Shape of the request input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub content_type: String,
    pub size_chars: usize,
    pub token_estimate: usize,
}

impl InputDescriptor {
    pub fn describe(content: &Content) -> Self {
        let text = content.as_text();
        Self {
            content_type: content.content_type().to_string(),
            size_chars: text.chars().count(),
            token_estimate: estimate_tokens(&text),
        }
    }
}

/// Shape of the produced output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub result_kind: String,
    pub size: usize,
}

impl OutputDescriptor {
    pub fn describe(result: &NormalizedResult) -> Self {
        Self {
            result_kind: result.kind_str().to_string(),
            size: result.output_size(),
        }
    }
}

/// Where time went during one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyBreakdown {
    pub config_ms: u64,
    pub cache_ms: u64,
    pub provider_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionMetrics {
    pub latency: LatencyBreakdown,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: f64,
    pub cache_hit: bool,
    pub retry_count: u32,
}

/// Outcome of dispatching to one provider in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Transient,
    Permanent,
    Unsupported,
}

/// One provider tried for an interaction, in chain order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider: ProviderKind,
    pub model: String,
    /// Calls made to this provider (1 + retries).
    pub calls: u32,
    pub outcome: AttemptOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Human feedback on an interaction's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helpful: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrections: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(rating: u8, helpful: Option<bool>, corrections: Option<String>) -> Result<Self> {
        if !(1..=5).contains(&rating) {
            return Err(Error::InvalidInput(format!(
                "rating must be between 1 and 5, got {}",
                rating
            )));
        }
        Ok(Self {
            rating,
            helpful,
            corrections,
            submitted_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualitySignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

/// Error detail stored on a failed interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for InteractionError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Durable record of one AI call, independent of its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub request_id: Uuid,
    /// Scope the request was made under.
    pub scope: Scope,
    /// Scope of the config that served the request (Global when inherited).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    pub operation: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub input: InputDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputDescriptor>,
    pub metrics: InteractionMetrics,
    #[serde(default)]
    pub attempts: Vec<ProviderAttempt>,
    pub quality: QualitySignals,
    pub status: InteractionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<InteractionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Interaction {
    /// New record in `Pending` for the given request.
    pub fn pending(request: &OperationRequest) -> Self {
        let now = Utc::now();
        Self {
            request_id: new_v7(),
            scope: request.scope.clone(),
            config_scope: None,
            caller_id: request.caller_id.clone(),
            operation: request.operation,
            provider: None,
            model: None,
            input: InputDescriptor::describe(&request.content),
            output: None,
            metrics: InteractionMetrics::default(),
            attempts: Vec::new(),
            quality: QualitySignals::default(),
            status: InteractionStatus::Pending,
            error: None,
            fingerprint: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Move to `next`, rejecting anything outside the state machine.
    pub fn advance(&mut self, next: InteractionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Providers attempted, in order.
    pub fn attempted_providers(&self) -> Vec<ProviderKind> {
        self.attempts.iter().map(|a| a.provider).collect()
    }
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// Reference to a content entity owned outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentRef {
    pub content_type: String,
    pub content_id: String,
}

impl ContentRef {
    pub fn new(content_type: impl Into<String>, content_id: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            content_id: content_id.into(),
        }
    }
}

impl std::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.content_type, self.content_id)
    }
}

/// Stored vector for one content item. Unique by `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: Uuid,
    pub content: ContentRef,
    pub scope: Scope,
    pub model: String,
    pub vector: Vec<f32>,
    pub dimensions: usize,
    pub excerpt: String,
    pub indexed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    /// Build a record, enforcing `vector.len() == dimensions`.
    pub fn new(
        content: ContentRef,
        scope: Scope,
        model: impl Into<String>,
        vector: Vec<f32>,
        dimensions: usize,
        source_text: &str,
        excerpt_len: usize,
    ) -> Result<Self> {
        let record = Self {
            id: new_v7(),
            content,
            scope,
            model: model.into(),
            vector,
            dimensions,
            excerpt: source_text.chars().take(excerpt_len).collect(),
            indexed: false,
            indexed_at: None,
            created_at: Utc::now(),
        };
        record.validate()?;
        Ok(record)
    }

    /// Check the dimension invariant. Called again by every repository on write.
    pub fn validate(&self) -> Result<()> {
        if self.vector.len() != self.dimensions {
            return Err(Error::InvalidVector {
                expected: self.dimensions,
                actual: self.vector.len(),
            });
        }
        if self.dimensions == 0 {
            return Err(Error::InvalidInput("embedding vector is empty".to_string()));
        }
        if self.vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(
                "embedding vector contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }
}

/// Candidate filter for similarity search. All provided fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl EmbeddingFilter {
    pub fn matches(&self, record: &EmbeddingRecord) -> bool {
        self.content_type
            .as_ref()
            .map_or(true, |t| *t == record.content.content_type)
            && self.scope.as_ref().map_or(true, |s| *s == record.scope)
            && self.model.as_ref().map_or(true, |m| *m == record.model)
    }
}

// =============================================================================
// RANKING INPUT
// =============================================================================

/// Engagement counters for one content item, read by the ranking engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementSnapshot {
    pub content_id: String,
    pub like_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
    pub view_count: u64,
    pub created_at: DateTime<Utc>,
}

impl EngagementSnapshot {
    pub fn new(content_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            content_id: content_id.into(),
            like_count: 0,
            comment_count: 0,
            share_count: 0,
            view_count: 0,
            created_at,
        }
    }
}

// =============================================================================
// USAGE
// =============================================================================

/// Aggregate usage for one scope since a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub scope: String,
    pub total: u64,
    pub by_status: BTreeMap<InteractionStatus, u64>,
    pub total_cost_usd: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cache_hit_rate: f64,
    pub avg_latency_ms: f64,
}

impl UsageSummary {
    /// Fold interaction records into a summary.
    pub fn from_interactions<'a>(
        scope: &Scope,
        interactions: impl IntoIterator<Item = &'a Interaction>,
    ) -> Self {
        let mut summary = UsageSummary {
            scope: scope.key(),
            ..Default::default()
        };
        let mut hits = 0u64;
        let mut latency_sum = 0u64;
        for i in interactions {
            summary.total += 1;
            *summary.by_status.entry(i.status).or_insert(0) += 1;
            summary.total_cost_usd += i.metrics.cost_usd;
            summary.tokens_in += u64::from(i.metrics.tokens_in);
            summary.tokens_out += u64::from(i.metrics.tokens_out);
            latency_sum += i.metrics.latency.total_ms;
            if i.metrics.cache_hit {
                hits += 1;
            }
        }
        if summary.total > 0 {
            summary.cache_hit_rate = hits as f64 / summary.total as f64;
            summary.avg_latency_ms = latency_sum as f64 / summary.total as f64;
        }
        summary
    }
}
