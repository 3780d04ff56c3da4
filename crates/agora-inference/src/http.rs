//! HTTP helpers shared by the adapters.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response};

use crate::provider::ProviderError;

/// Status codes worth retrying. 529 is Anthropic's "overloaded".
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 529)
}

/// Parse a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// Build a client with a request timeout.
pub fn build_client(timeout_secs: u64) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::permanent(format!("failed to create HTTP client: {}", e)))
}

/// Turn a non-success response into a classified error.
///
/// `extract` pulls a human-readable message out of the provider's error body.
pub async fn error_from_response<F>(response: Response, extract: F) -> ProviderError
where
    F: FnOnce(&str) -> Option<String>,
{
    let status = response.status().as_u16();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = extract(&body).unwrap_or_else(|| {
        if body.is_empty() {
            "empty error body".to_string()
        } else {
            body.chars().take(200).collect()
        }
    });
    ProviderError::from_status(status, message, retry_after)
}

/// Join a base URL and an endpoint path.
pub fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), endpoint)
}
