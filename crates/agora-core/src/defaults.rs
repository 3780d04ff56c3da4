//! Centralized default constants for the agora AI engine.
//!
//! **This module is the single source of truth** for shared default values.
//! `ScopedConfig::global_default()` and `OperationSettings::defaults_for()`
//! read from here; adapters never carry their own defaults.

// =============================================================================
// CACHE
// =============================================================================

/// Cache TTL for moderation results (one day).
pub const CACHE_TTL_MODERATE_SECS: u64 = 86_400;

/// Cache TTL for summaries (one day).
pub const CACHE_TTL_SUMMARIZE_SECS: u64 = 86_400;

/// Cache TTL for tag suggestions (half a day).
pub const CACHE_TTL_TAG_SECS: u64 = 43_200;

/// Cache TTL for embeddings (one week).
pub const CACHE_TTL_EMBED_SECS: u64 = 604_800;

/// Cache TTL for study-assist and code-help answers (one hour).
pub const CACHE_TTL_ASSIST_SECS: u64 = 3_600;

/// Chat is conversational and never cached.
pub const CACHE_TTL_CHAT_SECS: u64 = 0;

/// Upper bound on entries kept by the in-memory cache store.
pub const CACHE_MAX_ENTRIES: usize = 10_000;

/// Redis key prefix for cached AI results.
pub const CACHE_KEY_PREFIX: &str = "agora:ai";

/// How long a resolved ScopedConfig stays in the resolver cache.
pub const CONFIG_CACHE_SECS: u64 = 30;

// =============================================================================
// RETRY / TIMEOUT
// =============================================================================

/// Retries on the same provider after the first attempt (transient failures).
pub const MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const RETRY_BASE_MS: u64 = 250;

/// Maximum backoff delay in milliseconds (also caps provider retry-after hints).
pub const RETRY_MAX_MS: u64 = 4_000;

/// Per-call provider timeout in seconds.
pub const PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Timeout for provider health checks in seconds.
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// RATE LIMITS
// =============================================================================

/// Default admitted calls per minute per scope.
pub const RATE_LIMIT_PER_MINUTE: u32 = 100;

/// Default admitted calls per hour per scope.
pub const RATE_LIMIT_PER_HOUR: u32 = 2_000;

/// Default admitted calls per day per scope.
pub const RATE_LIMIT_PER_DAY: u32 = 20_000;

/// Default admitted calls in any one-second window per scope.
pub const RATE_LIMIT_BURST: u32 = 20;

// =============================================================================
// BUDGET
// =============================================================================

/// Default monthly budget for the Global scope (USD).
pub const MONTHLY_BUDGET_USD: f64 = 500.0;

/// Fraction of the monthly limit at which a budget alert is emitted.
pub const BUDGET_ALERT_THRESHOLD: f64 = 0.8;

/// Cost charged per call when the provider reports no token counts (USD).
pub const FALLBACK_CALL_COST_USD: f64 = 0.001;

// =============================================================================
// OPERATIONS
// =============================================================================

/// Maximum tags returned by a Tag operation.
pub const MAX_TAGS: usize = 5;

/// Target summary length in characters.
pub const SUMMARY_MAX_LENGTH: usize = 200;

/// Score at or above which a moderation category flags content.
pub const MODERATION_THRESHOLD: f64 = 0.5;

/// Default sampling temperature for classification-like operations.
pub const TEMPERATURE_PRECISE: f32 = 0.2;

/// Default sampling temperature for conversational operations.
pub const TEMPERATURE_CHAT: f32 = 0.7;

/// Default completion cap for short structured outputs.
pub const MAX_TOKENS_SHORT: u32 = 256;

/// Default completion cap for conversational outputs.
pub const MAX_TOKENS_CHAT: u32 = 1_024;

/// Characters of source text kept on an Embedding record for debugging.
pub const EMBED_EXCERPT_LEN: usize = 160;

// =============================================================================
// PROVIDER MODELS
// =============================================================================

/// OpenAI chat model for text operations.
pub const OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";

/// OpenAI moderation model.
pub const OPENAI_MODERATION_MODEL: &str = "omni-moderation-latest";

/// OpenAI embedding model.
pub const OPENAI_EMBED_MODEL: &str = "text-embedding-3-small";

/// Dimensions of [`OPENAI_EMBED_MODEL`].
pub const OPENAI_EMBED_DIMENSION: usize = 1536;

/// Anthropic model for text operations.
pub const ANTHROPIC_CHAT_MODEL: &str = "claude-3-5-haiku-latest";

/// Anthropic API version header value.
pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Ollama model for text operations.
pub const OLLAMA_CHAT_MODEL: &str = "llama3.2";

/// Ollama embedding model.
pub const OLLAMA_EMBED_MODEL: &str = "nomic-embed-text";

/// Dimensions of [`OLLAMA_EMBED_MODEL`].
pub const OLLAMA_EMBED_DIMENSION: usize = 768;

/// Default OpenAI API base URL.
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default Anthropic API base URL.
pub const ANTHROPIC_URL: &str = "https://api.anthropic.com";

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://localhost:11434";

// =============================================================================
// RANKING / SIMILARITY
// =============================================================================

/// Decay gravity for the hot score.
pub const HOT_GRAVITY: f64 = 1.8;

/// Epoch (Unix seconds) the hot-score time term is measured from.
pub const HOT_EPOCH: i64 = 1_134_028_003;

/// Default number of similar items returned.
pub const SIMILARITY_LIMIT: usize = 10;

/// Default minimum cosine similarity for a match.
pub const SIMILARITY_MIN: f32 = 0.7;

// =============================================================================
// DATABASE / EVENTS
// =============================================================================

/// Default maximum pool connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default minimum pool connections.
pub const DB_MIN_CONNECTIONS: u32 = 1;

/// Pool acquire timeout in seconds.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Pool idle timeout in seconds.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Event bus buffer capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_horizons_are_ordered() {
        assert!(CACHE_TTL_TAG_SECS < CACHE_TTL_MODERATE_SECS);
        assert_eq!(CACHE_TTL_MODERATE_SECS, CACHE_TTL_SUMMARIZE_SECS);
        assert!(CACHE_TTL_EMBED_SECS > CACHE_TTL_SUMMARIZE_SECS);
        assert_eq!(CACHE_TTL_CHAT_SECS, 0);
    }

    #[test]
    fn test_retry_bounds() {
        assert!(RETRY_BASE_MS < RETRY_MAX_MS);
        assert_eq!(MAX_RETRIES, 3);
    }

    #[test]
    fn test_rate_limits_nested() {
        assert!(RATE_LIMIT_BURST <= RATE_LIMIT_PER_MINUTE);
        assert!(RATE_LIMIT_PER_MINUTE <= RATE_LIMIT_PER_HOUR);
        assert!(RATE_LIMIT_PER_HOUR <= RATE_LIMIT_PER_DAY);
    }

    #[test]
    fn test_budget_threshold_is_fraction() {
        assert!(BUDGET_ALERT_THRESHOLD > 0.0 && BUDGET_ALERT_THRESHOLD <= 1.0);
    }
}
