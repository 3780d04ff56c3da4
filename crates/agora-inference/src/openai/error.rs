//! OpenAI-specific error handling.

use crate::provider::ProviderError;

use super::types::OpenAIErrorResponse;

/// OpenAI-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Invalid authentication credentials.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Account quota exhausted. Returned as 429 but not retryable.
    InsufficientQuota,
    /// Model not found or not available.
    ModelNotFound,
    /// Request too large.
    ContextLengthExceeded,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) => Self::AuthenticationError,
            (429, "insufficient_quota") => Self::InsufficientQuota,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Convert an OpenAI error into the adapter taxonomy.
pub fn to_provider_error(
    code: OpenAIErrorCode,
    status: u16,
    message: &str,
    retry_after_secs: Option<u64>,
) -> ProviderError {
    let message = match code {
        OpenAIErrorCode::AuthenticationError => format!("Authentication failed: {}", message),
        OpenAIErrorCode::RateLimitExceeded => format!("Rate limit exceeded: {}", message),
        OpenAIErrorCode::InsufficientQuota => format!("Quota exhausted: {}", message),
        OpenAIErrorCode::ModelNotFound => format!("Model not found: {}", message),
        OpenAIErrorCode::ContextLengthExceeded => format!("Context too long: {}", message),
        OpenAIErrorCode::ServerError => format!("Server error: {}", message),
        OpenAIErrorCode::Unknown => message.to_string(),
    };
    if code.is_retryable() {
        ProviderError::Transient {
            message,
            retry_after_secs,
        }
    } else {
        ProviderError::Permanent {
            message,
            status: Some(status),
        }
    }
}

/// Classify a raw error body.
pub fn classify(status: u16, body: &str, retry_after_secs: Option<u64>) -> ProviderError {
    match serde_json::from_str::<OpenAIErrorResponse>(body) {
        Ok(parsed) => {
            let error_type = parsed
                .error
                .code
                .as_deref()
                .filter(|c| !c.is_empty())
                .unwrap_or(&parsed.error.error_type);
            let code = OpenAIErrorCode::from_response(status, error_type);
            to_provider_error(code, status, &parsed.error.message, retry_after_secs)
        }
        Err(_) => {
            let snippet: String = body.chars().take(200).collect();
            ProviderError::from_status(status, snippet, retry_after_secs)
        }
    }
}
