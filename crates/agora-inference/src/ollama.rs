//! Ollama provider for self-hosted models.
//!
//! Chat-served operations go to `/api/chat` (with `format: "json"` when the
//! prompt expects a JSON reply), embeddings to `/api/embed`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use agora_core::defaults::{HEALTH_CHECK_TIMEOUT_SECS, OLLAMA_URL, PROVIDER_TIMEOUT_SECS};
use agora_core::{Content, OperationKind, ProviderKind};

use crate::http::{build_client, endpoint_url, error_from_response};
use crate::prompts::{build_prompt, embedding_result, normalize_reply};
use crate::provider::{ExecuteOptions, Provider, ProviderError, ProviderOutput, TokenUsage};

/// Generation slower than this is logged as slow.
const SLOW_GENERATION_MS: u64 = 30_000;

/// Embedding slower than this is logged as slow.
const SLOW_EMBEDDING_MS: u64 = 5_000;

/// Configuration for the Ollama provider.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: OLLAMA_URL.to_string(),
            timeout_seconds: PROVIDER_TIMEOUT_SECS,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Set to `"json"` for guaranteed valid JSON output.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    options: ChatOptions,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    message: ChatMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaErrorBody {
    error: String,
}

fn extract_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<OllamaErrorBody>(body)
        .ok()
        .map(|e| e.error)
}

/// Ollama adapter.
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Result<Self, ProviderError> {
        let client = build_client(config.timeout_seconds)?;

        info!(
            subsystem = "inference",
            component = "ollama",
            base_url = %config.base_url,
            "Initializing Ollama provider"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, ProviderError> {
        let config = OllamaConfig {
            base_url: std::env::var("OLLAMA_BASE").unwrap_or_else(|_| OLLAMA_URL.to_string()),
            timeout_seconds: std::env::var("OLLAMA_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(PROVIDER_TIMEOUT_SECS),
        };
        Self::new(config)
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    async fn embed(&self, content: &Content, model: &str) -> Result<ProviderOutput, ProviderError> {
        let start = Instant::now();
        let request = EmbeddingRequest {
            model,
            input: vec![content.as_text()],
        };

        let response = self
            .client
            .post(endpoint_url(&self.config.base_url, "/api/embed"))
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(error_from_response(response, extract_error_message).await);
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed("/api/embed", e))?;

        let vector = body
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::malformed("/api/embed", "no embeddings"))?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(dimensions = vector.len(), duration_ms = elapsed, "Embedding complete");
        if elapsed > SLOW_EMBEDDING_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow embedding operation");
        }

        Ok(ProviderOutput {
            result: embedding_result(vector)?,
            model: model.to_string(),
            usage: body.prompt_eval_count.map(|n| TokenUsage::new(n, 0)),
        })
    }

    async fn chat(
        &self,
        op: OperationKind,
        content: &Content,
        model: &str,
        options: &ExecuteOptions,
    ) -> Result<ProviderOutput, ProviderError> {
        let start = Instant::now();
        let prompt = build_prompt(op, content, options);

        let mut messages = Vec::new();
        if !prompt.system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: prompt.system,
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.user,
        });

        let request = ChatRequest {
            model,
            messages,
            stream: false,
            format: prompt.expects_json.then(|| serde_json::json!("json")),
            options: ChatOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let response = self
            .client
            .post(endpoint_url(&self.config.base_url, "/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(error_from_response(response, extract_error_message).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed("/api/chat", e))?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = body.message.content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > SLOW_GENERATION_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow generation operation");
        }

        let usage = match (body.prompt_eval_count, body.eval_count) {
            (Some(input), Some(output)) => Some(TokenUsage::new(input, output)),
            _ => None,
        };
        Ok(ProviderOutput {
            result: normalize_reply(op, &body.message.content, content, options)?,
            model: body.model.unwrap_or_else(|| model.to_string()),
            usage,
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    #[instrument(
        skip(self, content, options),
        fields(subsystem = "inference", component = "ollama", op = %op, model = %model)
    )]
    async fn execute(
        &self,
        op: OperationKind,
        content: &Content,
        model: &str,
        options: &ExecuteOptions,
    ) -> Result<ProviderOutput, ProviderError> {
        match op {
            OperationKind::Embed => self.embed(content, model).await,
            _ => self.chat(op, content, model, options).await,
        }
    }

    async fn health_check(&self) -> bool {
        let response = self
            .client
            .get(endpoint_url(&self.config.base_url, "/api/tags"))
            .timeout(Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(
                    subsystem = "inference",
                    component = "ollama",
                    status = resp.status().as_u16(),
                    "Health check failed"
                );
                false
            }
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "ollama",
                    error = %e,
                    "Health check error"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}
