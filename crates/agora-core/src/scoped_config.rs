//! Tenant-scoped AI configuration.
//!
//! One [`ScopedConfig`] exists per `(scope kind, scope id)`. Every
//! per-operation default (provider, model, token cap, temperature, tag count,
//! summary length, cache TTL) is defined here and nowhere else.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::{OperationKind, ProviderKind, Scope, GLOBAL_SCOPE_ID};
use crate::uuid_utils::new_v7;

/// Default model a provider uses for an operation.
pub fn default_model(provider: ProviderKind, op: OperationKind) -> &'static str {
    match (provider, op) {
        (ProviderKind::OpenAi, OperationKind::Moderate) => defaults::OPENAI_MODERATION_MODEL,
        (ProviderKind::OpenAi, OperationKind::Embed) => defaults::OPENAI_EMBED_MODEL,
        (ProviderKind::OpenAi, _) => defaults::OPENAI_CHAT_MODEL,
        (ProviderKind::Anthropic, _) => defaults::ANTHROPIC_CHAT_MODEL,
        (ProviderKind::Ollama, OperationKind::Embed) => defaults::OLLAMA_EMBED_MODEL,
        (ProviderKind::Ollama, _) => defaults::OLLAMA_CHAT_MODEL,
    }
}

/// Default cache TTL for an operation, in seconds. Zero means "do not cache".
pub fn default_cache_ttl(op: OperationKind) -> u64 {
    match op {
        OperationKind::Moderate => defaults::CACHE_TTL_MODERATE_SECS,
        OperationKind::Summarize => defaults::CACHE_TTL_SUMMARIZE_SECS,
        OperationKind::Tag => defaults::CACHE_TTL_TAG_SECS,
        OperationKind::Embed => defaults::CACHE_TTL_EMBED_SECS,
        OperationKind::StudyAssist | OperationKind::CodeHelp => defaults::CACHE_TTL_ASSIST_SECS,
        OperationKind::Chat => defaults::CACHE_TTL_CHAT_SECS,
    }
}

/// Budget period label (`YYYY-MM`, UTC) for a timestamp.
pub fn budget_period(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

// =============================================================================
// SECTIONS
// =============================================================================

/// Provider, model and behavior for one operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSettings {
    pub enabled: bool,
    pub provider: ProviderKind,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_tags: usize,
    pub max_length: usize,
    /// Any category score at or above this flags the content.
    pub moderation_threshold: f64,
}

impl OperationSettings {
    pub fn defaults_for(op: OperationKind) -> Self {
        let provider = ProviderKind::OpenAi;
        let (max_tokens, temperature) = if op.is_conversational() {
            (defaults::MAX_TOKENS_CHAT, defaults::TEMPERATURE_CHAT)
        } else {
            (defaults::MAX_TOKENS_SHORT, defaults::TEMPERATURE_PRECISE)
        };
        Self {
            enabled: true,
            provider,
            model: default_model(provider, op).to_string(),
            max_tokens,
            temperature,
            max_tags: defaults::MAX_TAGS,
            max_length: defaults::SUMMARY_MAX_LENGTH,
            moderation_threshold: defaults::MODERATION_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
    pub burst: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: defaults::RATE_LIMIT_PER_MINUTE,
            per_hour: defaults::RATE_LIMIT_PER_HOUR,
            per_day: defaults::RATE_LIMIT_PER_DAY,
            burst: defaults::RATE_LIMIT_BURST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub enabled: bool,
    /// Per-operation TTL overrides in seconds. Missing entries use the defaults.
    #[serde(default)]
    pub ttl_secs: BTreeMap<OperationKind, u64>,
    pub max_entries: usize,
}

impl CachePolicy {
    /// Effective TTL for `op`; zero when caching is off.
    pub fn ttl_for(&self, op: OperationKind) -> u64 {
        if !self.enabled {
            return 0;
        }
        self.ttl_secs
            .get(&op)
            .copied()
            .unwrap_or_else(|| default_cache_ttl(op))
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: OperationKind::ALL
                .iter()
                .map(|op| (*op, default_cache_ttl(*op)))
                .collect(),
            max_entries: defaults::CACHE_MAX_ENTRIES,
        }
    }
}

/// Monthly spend accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub monthly_limit_usd: f64,
    pub current_month_spent: f64,
    /// Fraction of the limit at which an alert fires, in `(0, 1]`.
    pub alert_threshold: f64,
    /// Period (`YYYY-MM`) the accumulator belongs to.
    pub period: String,
    pub alert_sent_for_period: bool,
}

impl Budget {
    pub fn new(monthly_limit_usd: f64) -> Self {
        Self {
            monthly_limit_usd,
            current_month_spent: 0.0,
            alert_threshold: defaults::BUDGET_ALERT_THRESHOLD,
            period: budget_period(Utc::now()),
            alert_sent_for_period: false,
        }
    }

    /// Spend that counts against `period`; a stale accumulator counts as zero.
    pub fn spent_in(&self, period: &str) -> f64 {
        if self.period == period {
            self.current_month_spent
        } else {
            0.0
        }
    }

    pub fn is_exhausted(&self, period: &str) -> bool {
        self.spent_in(period) >= self.monthly_limit_usd
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::new(defaults::MONTHLY_BUDGET_USD)
    }
}

/// Providers tried after the operation's own provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackOrder {
    pub primary: Option<ProviderKind>,
    pub secondary: Option<ProviderKind>,
    pub tertiary: Option<ProviderKind>,
}

impl FallbackOrder {
    pub fn iter(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        [self.primary, self.secondary, self.tertiary]
            .into_iter()
            .flatten()
    }
}

// =============================================================================
// SCOPED CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedConfig {
    pub id: Uuid,
    pub scope: Scope,
    pub active: bool,
    /// Per-operation settings. Missing operations use `OperationSettings::defaults_for`.
    #[serde(default)]
    pub operations: BTreeMap<OperationKind, OperationSettings>,
    pub rate_limits: RateLimits,
    pub cache: CachePolicy,
    pub budget: Budget,
    pub fallback: FallbackOrder,
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScopedConfig {
    /// The default Global configuration.
    pub fn global_default() -> Self {
        Self::for_scope(Scope::global())
    }

    /// A config for `scope` carrying every default.
    pub fn for_scope(scope: Scope) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            scope,
            active: true,
            operations: OperationKind::ALL
                .iter()
                .map(|op| (*op, OperationSettings::defaults_for(*op)))
                .collect(),
            rate_limits: RateLimits::default(),
            cache: CachePolicy::default(),
            budget: Budget::default(),
            fallback: FallbackOrder {
                primary: Some(ProviderKind::Anthropic),
                secondary: Some(ProviderKind::Ollama),
                tertiary: None,
            },
            features: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Effective settings for `op`.
    pub fn operation(&self, op: OperationKind) -> OperationSettings {
        self.operations
            .get(&op)
            .cloned()
            .unwrap_or_else(|| OperationSettings::defaults_for(op))
    }

    pub fn is_enabled(&self, op: OperationKind) -> bool {
        self.active && self.operation(op).enabled
    }

    pub fn feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    /// Deduplicated provider order for `op`: its own provider first, then the
    /// fallback order.
    pub fn provider_chain(&self, op: OperationKind) -> Vec<ProviderKind> {
        let mut chain = vec![self.operation(op).provider];
        for p in self.fallback.iter() {
            if !chain.contains(&p) {
                chain.push(p);
            }
        }
        chain
    }

    pub fn validate(&self) -> Result<()> {
        if self.scope.is_global() {
            if self.scope.id != GLOBAL_SCOPE_ID {
                return Err(Error::Config(format!(
                    "global scope id must be '{}', got '{}'",
                    GLOBAL_SCOPE_ID, self.scope.id
                )));
            }
            if !self.active {
                return Err(Error::Config(
                    "global config cannot be deactivated".to_string(),
                ));
            }
        } else if self.scope.id.trim().is_empty() {
            return Err(Error::Config("scope id must not be empty".to_string()));
        }

        let b = &self.budget;
        if !(b.monthly_limit_usd.is_finite() && b.monthly_limit_usd >= 0.0) {
            return Err(Error::Config(format!(
                "monthly limit must be non-negative, got {}",
                b.monthly_limit_usd
            )));
        }
        if !(b.current_month_spent.is_finite() && b.current_month_spent >= 0.0) {
            return Err(Error::Config("current spend must be non-negative".to_string()));
        }
        if !(b.alert_threshold > 0.0 && b.alert_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "alert threshold must be in (0, 1], got {}",
                b.alert_threshold
            )));
        }

        for (op, s) in &self.operations {
            if s.model.trim().is_empty() {
                return Err(Error::Config(format!("{}: model must not be empty", op)));
            }
            if !(0.0..=2.0).contains(&s.temperature) {
                return Err(Error::Config(format!(
                    "{}: temperature must be in [0, 2], got {}",
                    op, s.temperature
                )));
            }
            if !(0.0..=1.0).contains(&s.moderation_threshold) {
                return Err(Error::Config(format!(
                    "{}: moderation threshold must be in [0, 1]",
                    op
                )));
            }
            if *op == OperationKind::Tag && s.max_tags == 0 {
                return Err(Error::Config("tag: max_tags must be positive".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_global_default_is_valid() {
        let cfg = ScopedConfig::global_default();
        cfg.validate().unwrap();
        assert!(cfg.scope.is_global());
        for op in OperationKind::ALL {
            assert!(cfg.is_enabled(op));
        }
    }

    #[test]
    fn test_defaults_for_operation() {
        let tag = OperationSettings::defaults_for(OperationKind::Tag);
        assert_eq!(tag.max_tags, defaults::MAX_TAGS);
        assert_eq!(tag.model, defaults::OPENAI_CHAT_MODEL);

        let embed = OperationSettings::defaults_for(OperationKind::Embed);
        assert_eq!(embed.model, defaults::OPENAI_EMBED_MODEL);

        let chat = OperationSettings::defaults_for(OperationKind::Chat);
        assert_eq!(chat.max_tokens, defaults::MAX_TOKENS_CHAT);
    }

    #[test]
    fn test_cache_ttl_defaults_and_disable() {
        let mut policy = CachePolicy::default();
        assert_eq!(policy.ttl_for(OperationKind::Moderate), 86_400);
        assert_eq!(policy.ttl_for(OperationKind::Tag), 43_200);
        assert_eq!(policy.ttl_for(OperationKind::Embed), 604_800);
        assert_eq!(policy.ttl_for(OperationKind::Chat), 0);

        policy.ttl_secs.insert(OperationKind::Tag, 60);
        assert_eq!(policy.ttl_for(OperationKind::Tag), 60);

        policy.enabled = false;
        assert_eq!(policy.ttl_for(OperationKind::Embed), 0);
    }

    #[test]
    fn test_provider_chain_dedups() {
        let mut cfg = ScopedConfig::global_default();
        cfg.fallback = FallbackOrder {
            primary: Some(ProviderKind::OpenAi),
            secondary: Some(ProviderKind::Anthropic),
            tertiary: Some(ProviderKind::Ollama),
        };
        assert_eq!(
            cfg.provider_chain(OperationKind::Summarize),
            vec![
                ProviderKind::OpenAi,
                ProviderKind::Anthropic,
                ProviderKind::Ollama
            ]
        );
    }

    #[test]
    fn test_validate_rejects_bad_global() {
        let mut cfg = ScopedConfig::global_default();
        cfg.scope.id = "other".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = ScopedConfig::global_default();
        cfg.active = false;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_budget() {
        let mut cfg = ScopedConfig::for_scope(Scope::college("c1"));
        cfg.budget.monthly_limit_usd = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = ScopedConfig::for_scope(Scope::college("c1"));
        cfg.budget.alert_threshold = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = ScopedConfig::for_scope(Scope::college("c1"));
        cfg.budget.alert_threshold = 1.0;
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validate_allows_zero_ttl() {
        let mut cfg = ScopedConfig::for_scope(Scope::user("u1"));
        cfg.cache.ttl_secs.insert(OperationKind::Summarize, 0);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_budget_period_rollover() {
        let mut budget = Budget::new(100.0);
        budget.period = "2026-09".to_string();
        budget.current_month_spent = 100.0;
        assert!(budget.is_exhausted("2026-09"));
        assert!(!budget.is_exhausted("2026-10"));
        assert_eq!(budget.spent_in("2026-10"), 0.0);
    }

    #[test]
    fn test_spend_update_alert_due() {
        let update = |after: f64, sent: bool| crate::SpendUpdate {
            before: 0.0,
            after,
            limit: 100.0,
            alert_threshold: 0.8,
            period: "2026-10".to_string(),
            alert_sent_for_period: sent,
        };
        assert!(update(80.0, false).alert_due());
        assert!(update(95.0, false).alert_due());
        assert!(!update(79.0, false).alert_due());
        assert!(!update(95.0, true).alert_due());
    }

    #[test]
    fn test_budget_period_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(budget_period(at), "2026-03");
    }

    #[test]
    fn test_config_serde_roundtrip_keeps_operation_keys() {
        let cfg = ScopedConfig::global_default();
        let json = serde_json::to_value(&cfg).unwrap();
        assert!(json["operations"]["study_assist"].is_object());
        let back: ScopedConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }
}
