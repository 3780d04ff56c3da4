//! Error types for the agora AI engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{InteractionStatus, OperationKind};

/// Result type alias using agora's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for agora operations.
///
/// Provider-level failures are not represented here; adapters report them as
/// `ProviderError` values and only an exhausted fallback chain surfaces as
/// [`Error::AllProvidersExhausted`].
#[derive(Error, Debug)]
pub enum Error {
    /// No Global configuration exists; the subsystem cannot operate.
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The operation is switched off for the resolved scope.
    #[error("Operation {operation} is disabled for scope {scope}")]
    Disabled {
        operation: OperationKind,
        scope: String,
    },

    /// The scope's monthly budget is exhausted.
    #[error("Scope {scope} is over budget: spent {spent:.4} of {limit:.4}")]
    OverBudget {
        scope: String,
        spent: f64,
        limit: f64,
    },

    /// The scope exceeded one of its rate limit windows.
    #[error("Rate limit exceeded for scope {scope} ({window}); retry after {retry_after_secs}s")]
    RateLimited {
        scope: String,
        window: String,
        retry_after_secs: u64,
    },

    /// Every provider in the fallback chain failed.
    #[error("All providers exhausted for {operation} (tried: {}): {last_error}", attempted.join(" -> "))]
    AllProvidersExhausted {
        operation: OperationKind,
        attempted: Vec<String>,
        last_error: String,
    },

    /// Embedding vector length does not match its declared dimensions.
    #[error("Invalid vector: expected {expected} dimensions, got {actual}")]
    InvalidVector { expected: usize, actual: usize },

    /// Illegal interaction state transition.
    #[error("Invalid interaction transition: {from} -> {to}")]
    InvalidTransition {
        from: InteractionStatus,
        to: InteractionStatus,
    },

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cache backing store failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Outbound request could not be built or sent
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid, not missing)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Stable, caller-facing error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationMissing,
    Disabled,
    OverBudget,
    RateLimited,
    ProviderTransient,
    ProviderPermanent,
    ProviderUnsupported,
    AllProvidersExhausted,
    InvalidVector,
    InvalidInput,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing => "configuration_missing",
            Self::Disabled => "disabled",
            Self::OverBudget => "over_budget",
            Self::RateLimited => "rate_limited",
            Self::ProviderTransient => "provider_transient",
            Self::ProviderPermanent => "provider_permanent",
            Self::ProviderUnsupported => "provider_unsupported",
            Self::AllProvidersExhausted => "all_providers_exhausted",
            Self::InvalidVector => "invalid_vector",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned to content sources: `{kind, message}` plus an
/// optional backoff hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl Error {
    /// Classify this error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConfigurationMissing(_) => ErrorKind::ConfigurationMissing,
            Error::Disabled { .. } => ErrorKind::Disabled,
            Error::OverBudget { .. } => ErrorKind::OverBudget,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::AllProvidersExhausted { .. } => ErrorKind::AllProvidersExhausted,
            Error::InvalidVector { .. } => ErrorKind::InvalidVector,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidTransition { .. }
            | Error::Database(_)
            | Error::Cache(_)
            | Error::Request(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// Suggested backoff before retrying, when the error carries one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Error::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Convert into the outward `{kind, message}` shape.
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            retry_after_secs: self.retry_after_secs(),
        }
    }
}
