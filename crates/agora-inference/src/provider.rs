//! Provider abstraction and registry.
//!
//! Every adapter implements [`Provider`]: one `execute` call per operation,
//! returning a [`NormalizedResult`] whose variant matches the operation, or a
//! [`ProviderError`] tagged as transient, permanent or unsupported. The
//! orchestrator never looks at provider-specific payloads.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use agora_core::{
    default_model, AttemptOutcome, Content, ErrorKind, NormalizedResult, OperationKind,
    OperationOptions, OperationSettings, ProviderKind,
};

use crate::http::is_retryable_status;

// =============================================================================
// EXECUTION TYPES
// =============================================================================

/// Token counts reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// Successful provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput {
    pub result: NormalizedResult,
    /// Model the provider actually served.
    pub model: String,
    /// `None` when the provider does not report token counts.
    pub usage: Option<TokenUsage>,
}

/// Options after merging the resolved config with per-request overrides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteOptions {
    pub max_tags: usize,
    pub max_length: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub moderation_threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl ExecuteOptions {
    /// Request overrides win over the scope's operation settings.
    pub fn resolve(settings: &OperationSettings, overrides: &OperationOptions) -> Self {
        Self {
            max_tags: overrides.max_tags.unwrap_or(settings.max_tags).max(1),
            max_length: overrides.max_length.unwrap_or(settings.max_length).max(1),
            temperature: overrides.temperature.unwrap_or(settings.temperature),
            max_tokens: overrides.max_tokens.unwrap_or(settings.max_tokens),
            moderation_threshold: settings.moderation_threshold,
            system_prompt: overrides.system_prompt.clone(),
        }
    }

    /// The subset of options that changes the result of `op`.
    ///
    /// Two requests that differ only in options outside this subset share a
    /// cache entry.
    pub fn fingerprint_fields(&self, op: OperationKind) -> serde_json::Value {
        match op {
            OperationKind::Moderate => json!({ "threshold": self.moderation_threshold }),
            OperationKind::Tag => json!({ "max_tags": self.max_tags }),
            OperationKind::Summarize => json!({ "max_length": self.max_length }),
            OperationKind::Embed => json!({}),
            OperationKind::Chat | OperationKind::StudyAssist | OperationKind::CodeHelp => json!({
                "temperature": self.temperature,
                "max_tokens": self.max_tokens,
                "system_prompt": self.system_prompt,
            }),
        }
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self::resolve(
            &OperationSettings::defaults_for(OperationKind::Chat),
            &OperationOptions::default(),
        )
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Failure reported by a provider adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Worth retrying: timeouts, connection failures, 429 and 5xx.
    #[error("transient provider error: {message}")]
    Transient {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Retrying the same provider will not help.
    #[error("permanent provider error: {message}")]
    Permanent { message: String, status: Option<u16> },

    /// The provider has no capability for this operation.
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: ProviderKind,
        operation: OperationKind,
    },
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            status: None,
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after_secs: Option<u64>) -> Self {
        let message = format!("HTTP {}: {}", status, message.into());
        if is_retryable_status(status) {
            Self::Transient {
                message,
                retry_after_secs,
            }
        } else {
            Self::Permanent {
                message,
                status: Some(status),
            }
        }
    }

    /// Classify a transport-level failure from reqwest.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::transient(format!("request failed: {}", err))
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string(), None)
        } else {
            Self::permanent(format!("request failed: {}", err))
        }
    }

    /// A response body that does not match the expected shape.
    pub fn malformed(what: &str, detail: impl fmt::Display) -> Self {
        Self::permanent(format!("malformed {} response: {}", what, detail))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Transient {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::ProviderTransient,
            Self::Permanent { .. } => ErrorKind::ProviderPermanent,
            Self::Unsupported { .. } => ErrorKind::ProviderUnsupported,
        }
    }

    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            Self::Transient { .. } => AttemptOutcome::Transient,
            Self::Permanent { .. } => AttemptOutcome::Permanent,
            Self::Unsupported { .. } => AttemptOutcome::Unsupported,
        }
    }
}

// =============================================================================
// PROVIDER TRAIT
// =============================================================================

/// An external AI service behind a uniform contract.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Model used when this provider serves `op` as a fallback.
    fn default_model(&self, op: OperationKind) -> String {
        default_model(self.kind(), op).to_string()
    }

    /// Run one operation. Must not retry internally.
    async fn execute(
        &self,
        op: OperationKind,
        content: &Content,
        model: &str,
        options: &ExecuteOptions,
    ) -> Result<ProviderOutput, ProviderError>;

    /// Cheap reachability probe.
    async fn health_check(&self) -> bool;
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Immutable set of configured providers, keyed by kind.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider, replacing any earlier one of the same kind.
    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn Provider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    /// Registered kinds in canonical order.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|k| self.providers.contains_key(k))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Build adapters for every provider configured in the environment.
    ///
    /// OpenAI and Anthropic register when their API key is set. Ollama
    /// registers when `OLLAMA_BASE` is set.
    pub fn from_env() -> Result<Self, ProviderError> {
        let mut registry = Self::new();

        if std::env::var("OPENAI_API_KEY").is_ok() {
            registry = registry.with(Arc::new(crate::openai::OpenAIProvider::from_env()?));
        }
        if std::env::var("ANTHROPIC_API_KEY").is_ok() {
            registry = registry.with(Arc::new(crate::anthropic::AnthropicProvider::from_env()?));
        }
        if std::env::var("OLLAMA_BASE").is_ok() {
            registry = registry.with(Arc::new(crate::ollama::OllamaProvider::from_env()?));
        }

        info!(
            subsystem = "inference",
            component = "registry",
            providers = ?registry.kinds(),
            "Provider registry initialized"
        );
        Ok(registry)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classifies_retryable() {
        for status in [429, 500, 502, 503, 504, 529] {
            assert!(
                ProviderError::from_status(status, "x", None).is_retryable(),
                "{} should be transient",
                status
            );
        }
        for status in [400, 401, 403, 404, 422] {
            let err = ProviderError::from_status(status, "x", None);
            assert!(!err.is_retryable());
            assert_eq!(err.kind(), ErrorKind::ProviderPermanent);
        }
    }

    #[test]
    fn test_from_status_keeps_retry_after() {
        let err = ProviderError::from_status(429, "slow down", Some(7));
        assert_eq!(err.retry_after_secs(), Some(7));
        assert_eq!(err.outcome(), AttemptOutcome::Transient);
    }

    #[test]
    fn test_unsupported_kind() {
        let err = ProviderError::Unsupported {
            provider: ProviderKind::Anthropic,
            operation: OperationKind::Embed,
        };
        assert_eq!(err.kind(), ErrorKind::ProviderUnsupported);
        assert_eq!(err.to_string(), "anthropic does not support embed");
    }

    #[test]
    fn test_resolve_prefers_overrides() {
        let settings = OperationSettings::defaults_for(OperationKind::Tag);
        let overrides = OperationOptions {
            max_tags: Some(3),
            ..Default::default()
        };
        let opts = ExecuteOptions::resolve(&settings, &overrides);
        assert_eq!(opts.max_tags, 3);
        assert_eq!(opts.max_tokens, settings.max_tokens);
    }

    #[test]
    fn test_fingerprint_fields_ignore_unrelated_options() {
        let mut a = ExecuteOptions::default();
        let mut b = ExecuteOptions::default();
        a.temperature = 0.1;
        b.temperature = 0.9;
        assert_eq!(
            a.fingerprint_fields(OperationKind::Tag),
            b.fingerprint_fields(OperationKind::Tag)
        );
        assert_ne!(
            a.fingerprint_fields(OperationKind::Chat),
            b.fingerprint_fields(OperationKind::Chat)
        );
    }

    #[test]
    fn test_empty_registry() {
        let registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(ProviderKind::OpenAi).is_none());
        assert!(registry.kinds().is_empty());
    }
}
