//! OpenAI provider implementation.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use agora_core::defaults::{HEALTH_CHECK_TIMEOUT_SECS, OPENAI_URL, PROVIDER_TIMEOUT_SECS};
use agora_core::{estimate_tokens, Content, OperationKind, ProviderKind};

use super::error::classify;
use super::types::*;
use crate::http::{build_client, endpoint_url, parse_retry_after};
use crate::prompts::{build_prompt, embedding_result, moderation_result, normalize_reply};
use crate::provider::{ExecuteOptions, Provider, ProviderError, ProviderOutput, TokenUsage};

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for compatible local endpoints).
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Organization header, sent when set.
    pub organization: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_URL.to_string(),
            api_key: None,
            timeout_seconds: PROVIDER_TIMEOUT_SECS,
            organization: None,
        }
    }
}

/// OpenAI adapter: moderations, embeddings and chat completions.
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self, ProviderError> {
        let client = build_client(config.timeout_seconds)?;

        info!(
            subsystem = "inference",
            component = "openai",
            base_url = %config.base_url,
            "Initializing OpenAI provider"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, ProviderError> {
        let config = OpenAIConfig {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| OPENAI_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(PROVIDER_TIMEOUT_SECS),
            organization: std::env::var("OPENAI_ORGANIZATION").ok(),
        };

        Self::new(config)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a request with authentication if configured.
    fn build_request(&self, method: reqwest::Method, endpoint: &str) -> reqwest::RequestBuilder {
        let url = endpoint_url(&self.config.base_url, endpoint);
        let mut req = self.client.request(method, &url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        if let Some(ref org) = self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }

        req
    }

    async fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .build_request(reqwest::Method::POST, endpoint)
            .json(body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status.as_u16(), &body, retry_after));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::malformed(endpoint, e))
    }

    async fn moderate(
        &self,
        content: &Content,
        model: &str,
        options: &ExecuteOptions,
    ) -> Result<ProviderOutput, ProviderError> {
        let request = ModerationRequest {
            model: model.to_string(),
            input: content.as_text(),
        };
        let response: ModerationResponse = self.post_json("/moderations", &request).await?;
        let verdict = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::malformed("/moderations", "no results"))?;

        let categories: BTreeSet<String> = verdict
            .categories
            .into_iter()
            .filter(|(_, hit)| *hit)
            .map(|(name, _)| name)
            .collect();
        let result = moderation_result(
            verdict.flagged,
            categories,
            verdict.category_scores,
            options.moderation_threshold,
        );

        // The moderation endpoint reports no usage and is not billed per token.
        let usage = TokenUsage::new(estimate_tokens(&content.as_text()) as u32, 0);
        Ok(ProviderOutput {
            result,
            model: response.model.unwrap_or_else(|| model.to_string()),
            usage: Some(usage),
        })
    }

    async fn embed(&self, content: &Content, model: &str) -> Result<ProviderOutput, ProviderError> {
        let request = EmbeddingRequest {
            model: model.to_string(),
            input: vec![content.as_text()],
            encoding_format: Some("float".to_string()),
        };
        let response: EmbeddingResponse = self.post_json("/embeddings", &request).await?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        let vector = data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::malformed("/embeddings", "no data"))?;

        debug!(dimensions = vector.len(), "Generated embedding");
        Ok(ProviderOutput {
            result: embedding_result(vector)?,
            model: response.model.unwrap_or_else(|| model.to_string()),
            usage: response
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, 0)),
        })
    }

    async fn chat(
        &self,
        op: OperationKind,
        content: &Content,
        model: &str,
        options: &ExecuteOptions,
    ) -> Result<ProviderOutput, ProviderError> {
        let prompt = build_prompt(op, content, options);

        let mut messages = Vec::new();
        if !prompt.system.is_empty() {
            messages.push(ChatMessage::system(prompt.system));
        }
        messages.push(ChatMessage::user(prompt.user));

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature: Some(options.temperature),
            max_tokens: Some(options.max_tokens),
            response_format: prompt.expects_json.then(ResponseFormat::json_object),
        };
        let response: ChatCompletionResponse =
            self.post_json("/chat/completions", &request).await?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::malformed("/chat/completions", "no choices"))?;

        Ok(ProviderOutput {
            result: normalize_reply(op, &reply, content, options)?,
            model: response.model.unwrap_or_else(|| model.to_string()),
            usage: response
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        })
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    #[instrument(
        skip(self, content, options),
        fields(subsystem = "inference", component = "openai", op = %op, model = %model)
    )]
    async fn execute(
        &self,
        op: OperationKind,
        content: &Content,
        model: &str,
        options: &ExecuteOptions,
    ) -> Result<ProviderOutput, ProviderError> {
        let output = match op {
            OperationKind::Moderate => self.moderate(content, model, options).await,
            OperationKind::Embed => self.embed(content, model).await,
            _ => self.chat(op, content, model, options).await,
        }?;
        debug_assert!(output.result.matches_operation(op));
        Ok(output)
    }

    async fn health_check(&self) -> bool {
        let response = self
            .build_request(reqwest::Method::GET, "/models")
            .timeout(Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                debug!(subsystem = "inference", component = "openai", "Health check passed");
                true
            }
            Ok(resp) => {
                warn!(
                    subsystem = "inference",
                    component = "openai",
                    status = resp.status().as_u16(),
                    "Health check failed"
                );
                false
            }
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "openai",
                    error = %e,
                    "Health check error"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OpenAIConfig::default();
        assert_eq!(config.base_url, OPENAI_URL);
        assert_eq!(config.timeout_seconds, PROVIDER_TIMEOUT_SECS);
        assert!(config.api_key.is_none());
        assert!(config.organization.is_none());
    }

    #[test]
    fn test_default_models() {
        let provider = OpenAIProvider::new(OpenAIConfig::default()).unwrap();
        assert_eq!(provider.kind(), ProviderKind::OpenAi);
        assert_eq!(
            provider.default_model(OperationKind::Moderate),
            "omni-moderation-latest"
        );
        assert_eq!(
            provider.default_model(OperationKind::Embed),
            "text-embedding-3-small"
        );
        assert_eq!(provider.default_model(OperationKind::Tag), "gpt-4o-mini");
    }

    #[test]
    fn test_debug_hides_key() {
        let provider = OpenAIProvider::new(OpenAIConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert!(!format!("{:?}", provider).contains("sk-secret"));
    }
}
