//! Anthropic Messages API provider.
//!
//! Every supported operation is served through `/v1/messages` with an
//! operation-specific prompt. Anthropic has no embedding endpoint, so
//! [`OperationKind::Embed`] reports [`ProviderError::Unsupported`] without
//! touching the network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use agora_core::defaults::{
    ANTHROPIC_API_VERSION, ANTHROPIC_URL, HEALTH_CHECK_TIMEOUT_SECS, PROVIDER_TIMEOUT_SECS,
};
use agora_core::{Content, OperationKind, ProviderKind};

use crate::http::{build_client, endpoint_url, error_from_response};
use crate::prompts::{build_prompt, normalize_reply};
use crate::provider::{ExecuteOptions, Provider, ProviderError, ProviderOutput, TokenUsage};

/// Configuration for the Anthropic provider.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_version: String,
    pub timeout_seconds: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: ANTHROPIC_URL.to_string(),
            api_key: String::new(),
            api_version: ANTHROPIC_API_VERSION.to_string(),
            timeout_seconds: PROVIDER_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<MessageParam>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct MessageParam {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    error_type: String,
    message: String,
}

fn extract_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| format!("{}: {}", e.error.error_type, e.error.message))
}

// =============================================================================
// PROVIDER
// =============================================================================

/// Anthropic adapter.
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self, ProviderError> {
        let client = build_client(config.timeout_seconds)?;

        info!(
            subsystem = "inference",
            component = "anthropic",
            base_url = %config.base_url,
            "Initializing Anthropic provider"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, ProviderError> {
        let config = AnthropicConfig {
            base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| ANTHROPIC_URL.to_string()),
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            api_version: std::env::var("ANTHROPIC_VERSION")
                .unwrap_or_else(|_| ANTHROPIC_API_VERSION.to_string()),
            timeout_seconds: std::env::var("ANTHROPIC_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(PROVIDER_TIMEOUT_SECS),
        };

        Self::new(config)
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    fn build_request(&self, method: reqwest::Method, endpoint: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, endpoint_url(&self.config.base_url, endpoint))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    #[instrument(
        skip(self, content, options),
        fields(subsystem = "inference", component = "anthropic", op = %op, model = %model)
    )]
    async fn execute(
        &self,
        op: OperationKind,
        content: &Content,
        model: &str,
        options: &ExecuteOptions,
    ) -> Result<ProviderOutput, ProviderError> {
        if op == OperationKind::Embed {
            return Err(ProviderError::Unsupported {
                provider: ProviderKind::Anthropic,
                operation: op,
            });
        }

        let prompt = build_prompt(op, content, options);
        let request = MessagesRequest {
            model,
            max_tokens: options.max_tokens,
            system: (!prompt.system.is_empty()).then_some(prompt.system),
            messages: vec![MessageParam {
                role: "user",
                content: prompt.user,
            }],
            temperature: options.temperature.clamp(0.0, 1.0),
        };

        let response = self
            .build_request(reqwest::Method::POST, "/v1/messages")
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(error_from_response(response, extract_error_message).await);
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed("/v1/messages", e))?;

        let reply: String = body
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if reply.is_empty() {
            return Err(ProviderError::malformed("/v1/messages", "no text content"));
        }

        debug!(reply_len = reply.len(), "Message complete");
        Ok(ProviderOutput {
            result: normalize_reply(op, &reply, content, options)?,
            model: body.model.unwrap_or_else(|| model.to_string()),
            usage: body
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
        })
    }

    async fn health_check(&self) -> bool {
        let response = self
            .build_request(reqwest::Method::GET, "/v1/models")
            .timeout(Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(
                    subsystem = "inference",
                    component = "anthropic",
                    status = resp.status().as_u16(),
                    "Health check failed"
                );
                false
            }
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "anthropic",
                    error = %e,
                    "Health check error"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("base_url", &self.config.base_url)
            .field("api_version", &self.config.api_version)
            .finish()
    }
}
