//! Structured logging schema and field name constants for agora.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded subsystem, requires operator attention |
//! | WARN  | Automatic fallback, retry, rate limit, budget alert |
//! | INFO  | Lifecycle events, terminal interaction outcomes |
//! | DEBUG | Decision points (config resolution, cache hit/miss, provider choice) |
//! | TRACE | Per-candidate iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Interaction request id (UUIDv7).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "orchestrator", "inference", "db", "search", "cache"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "openai", "anthropic", "ollama", "resolver", "rate_limit"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "moderate", "tag", "embed", "find_similar"
pub const OPERATION: &str = "op";

// ─── Tenant fields ─────────────────────────────────────────────────────────

/// Scope key in `kind:id` form.
pub const SCOPE: &str = "scope";

/// Caller identity.
pub const CALLER_ID: &str = "caller_id";

// ─── Provider fields ───────────────────────────────────────────────────────

/// Provider name.
pub const PROVIDER: &str = "provider";

/// Model name used for inference.
pub const MODEL: &str = "model";

/// Attempt number on the current provider (1-based).
pub const ATTEMPT: &str = "attempt";

/// Provider failure class ("transient", "permanent", "unsupported").
pub const FAILURE: &str = "failure";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Computed cost in USD.
pub const COST: &str = "cost";

/// Input token count.
pub const TOKENS_IN: &str = "tokens_in";

/// Output token count.
pub const TOKENS_OUT: &str = "tokens_out";

/// Number of results returned by a search.
pub const RESULT_COUNT: &str = "result_count";

/// Number of candidates examined by a search.
pub const CANDIDATE_COUNT: &str = "candidate_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Interaction status.
pub const STATUS: &str = "status";

/// Whether a result came from the cache.
pub const CACHE_HIT: &str = "cache_hit";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Database table affected.
pub const DB_TABLE: &str = "db_table";
