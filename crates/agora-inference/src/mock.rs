//! Mock provider for deterministic testing.
//!
//! Replies are scripted per call (a queue of results and errors) and fall
//! back to deterministic outputs derived from the input text when the
//! script is empty. Every call is logged for assertions.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agora_core::{OperationKind, ProviderKind};
//! use agora_inference::mock::MockProvider;
//! use agora_inference::ProviderError;
//!
//! let provider = MockProvider::new(ProviderKind::OpenAi)
//!     .with_dimension(8)
//!     .with_unsupported(OperationKind::Embed);
//! provider.push_error(ProviderError::transient("503 from upstream"));
//! assert_eq!(provider.call_count(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;

use agora_core::{estimate_tokens, Content, NormalizedResult, OperationKind, ProviderKind};

use crate::prompts::{embedding_result, moderation_result, normalize_tags, summary_result, text_result};
use crate::provider::{ExecuteOptions, Provider, ProviderError, ProviderOutput, TokenUsage};

/// Words that make the mock moderator flag content.
const FLAGGED_WORDS: [&str; 4] = ["attack", "kill", "hate", "scam"];

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Result(NormalizedResult),
    Error(ProviderError),
}

/// A logged call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: OperationKind,
    pub model: String,
    pub input: String,
    pub timestamp: Instant,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    latency_ms: u64,
    failure_rate: f64,
    report_usage: bool,
    unsupported: Vec<OperationKind>,
    persistent_error: Option<ProviderError>,
    fixed_response: Option<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 8,
            latency_ms: 0,
            failure_rate: 0.0,
            report_usage: true,
            unsupported: Vec::new(),
            persistent_error: None,
            fixed_response: None,
        }
    }
}

/// Scriptable in-process provider.
#[derive(Clone)]
pub struct MockProvider {
    kind: ProviderKind,
    config: Arc<MockConfig>,
    script: Arc<Mutex<VecDeque<MockReply>>>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
    healthy: Arc<AtomicBool>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockProvider {
    /// Create a mock standing in for `kind`.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            config: Arc::new(MockConfig::default()),
            script: Arc::new(Mutex::new(VecDeque::new())),
            call_log: Arc::new(Mutex::new(Vec::new())),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension.max(1);
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set failure rate (0.0 - 1.0) for transient failures.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Report no token usage, as some providers do.
    pub fn without_usage(mut self) -> Self {
        Arc::make_mut(&mut self.config).report_usage = false;
        self
    }

    /// Answer `op` with `Unsupported`.
    pub fn with_unsupported(mut self, op: OperationKind) -> Self {
        Arc::make_mut(&mut self.config).unsupported.push(op);
        self
    }

    /// Fail every unscripted call with `err`.
    pub fn failing_with(mut self, err: ProviderError) -> Self {
        Arc::make_mut(&mut self.config).persistent_error = Some(err);
        self
    }

    /// Fixed text for conversational operations.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).fixed_response = Some(response.into());
        self
    }

    /// Queue a result for the next call.
    pub fn push_result(&self, result: NormalizedResult) {
        lock(&self.script).push_back(MockReply::Result(result));
    }

    /// Queue an error for the next call.
    pub fn push_error(&self, err: ProviderError) {
        lock(&self.script).push_back(MockReply::Error(err));
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Get all logged calls for assertion.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.call_log).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.call_log).len()
    }

    pub fn call_count_for(&self, op: OperationKind) -> usize {
        lock(&self.call_log)
            .iter()
            .filter(|c| c.operation == op)
            .count()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        lock(&self.call_log).clear()
    }

    fn log_call(&self, op: OperationKind, model: &str, input: &str) {
        lock(&self.call_log).push(MockCall {
            operation: op,
            model: model.to_string(),
            input: input.to_string(),
            timestamp: Instant::now(),
        });
    }

    fn should_fail(&self) -> bool {
        use rand::Rng;
        if self.config.failure_rate > 0.0 {
            rand::thread_rng().gen::<f64>() < self.config.failure_rate
        } else {
            false
        }
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn generate(
        &self,
        op: OperationKind,
        content: &Content,
        options: &ExecuteOptions,
    ) -> Result<NormalizedResult, ProviderError> {
        let text = content.as_text();
        match op {
            OperationKind::Moderate => {
                let lowered = text.to_lowercase();
                let hit = FLAGGED_WORDS.iter().any(|w| lowered.contains(w));
                let score = if hit { 0.92 } else { 0.01 };
                let scores = [("violence".to_string(), score)].into_iter().collect();
                Ok(moderation_result(
                    false,
                    Default::default(),
                    scores,
                    options.moderation_threshold,
                ))
            }
            OperationKind::Tag => {
                let words = text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| w.chars().count() > 3);
                Ok(NormalizedResult::Tags {
                    tags: normalize_tags(words, options.max_tags),
                    confidence: 0.8,
                })
            }
            OperationKind::Summarize => Ok(summary_result(&text, content, options.max_length)),
            OperationKind::Embed => {
                embedding_result(MockEmbeddingGenerator::generate(&text, self.config.dimension))
            }
            OperationKind::Chat | OperationKind::StudyAssist | OperationKind::CodeHelp => {
                let reply = self
                    .config
                    .fixed_response
                    .clone()
                    .unwrap_or_else(|| format!("Mock reply: {}", text));
                Ok(text_result(&reply))
            }
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn execute(
        &self,
        op: OperationKind,
        content: &Content,
        model: &str,
        options: &ExecuteOptions,
    ) -> Result<ProviderOutput, ProviderError> {
        let input = content.as_text();
        self.log_call(op, model, &input);
        self.simulate_latency().await;

        if self.config.unsupported.contains(&op) {
            return Err(ProviderError::Unsupported {
                provider: self.kind,
                operation: op,
            });
        }

        let scripted = lock(&self.script).pop_front();
        let result = match scripted {
            Some(MockReply::Result(result)) => result,
            Some(MockReply::Error(err)) => return Err(err),
            None => {
                if let Some(err) = &self.config.persistent_error {
                    return Err(err.clone());
                }
                if self.should_fail() {
                    return Err(ProviderError::transient("simulated failure"));
                }
                self.generate(op, content, options)?
            }
        };

        let usage = self.config.report_usage.then(|| {
            TokenUsage::new(
                estimate_tokens(&input) as u32,
                result.output_size().min(u32::MAX as usize) as u32 / 4,
            )
        });
        Ok(ProviderOutput {
            result,
            model: model.to_string(),
            usage,
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// Mock embedding generator with deterministic output.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a deterministic embedding from text.
    ///
    /// The same text always produces the same unit vector.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let dimension = dimension.max(1);
        let mut vec = vec![0.0; dimension];

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }

        Self::normalize(&mut vec);
        vec
    }

    /// Generate embedding from seed (for random-like but deterministic vectors).
    pub fn generate_with_seed(seed: u64, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension.max(1)];
        let mut state = seed;

        for item in vec.iter_mut() {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            *item = ((state % 1000) as f32) / 1000.0 - 0.5;
        }

        Self::normalize(&mut vec);
        vec
    }

    fn normalize(vec: &mut [f32]) {
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vec.iter_mut() {
                *x /= norm;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_is_consumed_in_order() {
        let provider = MockProvider::new(ProviderKind::OpenAi);
        provider.push_error(ProviderError::transient("boom"));
        provider.push_result(NormalizedResult::Tags {
            tags: vec!["scripted".to_string()],
            confidence: 1.0,
        });

        let opts = ExecuteOptions::default();
        let content = Content::text("anything");
        let first = provider
            .execute(OperationKind::Tag, &content, "m", &opts)
            .await;
        assert!(first.unwrap_err().is_retryable());

        let second = provider
            .execute(OperationKind::Tag, &content, "m", &opts)
            .await
            .unwrap();
        assert!(matches!(second.result, NormalizedResult::Tags { ref tags, .. } if tags == &vec!["scripted".to_string()]));

        // Script exhausted: deterministic output.
        let third = provider
            .execute(OperationKind::Tag, &content, "m", &opts)
            .await
            .unwrap();
        assert!(third.result.matches_operation(OperationKind::Tag));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_deterministic_embeddings() {
        let provider = MockProvider::new(ProviderKind::Ollama).with_dimension(16);
        let opts = ExecuteOptions::default();
        let content = Content::text("linear algebra notes");
        let a = provider
            .execute(OperationKind::Embed, &content, "nomic-embed-text", &opts)
            .await
            .unwrap();
        let b = provider
            .execute(OperationKind::Embed, &content, "nomic-embed-text", &opts)
            .await
            .unwrap();
        assert_eq!(a.result, b.result);
        match a.result {
            NormalizedResult::Embedding { dimensions, .. } => assert_eq!(dimensions, 16),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_and_usage() {
        let provider = MockProvider::new(ProviderKind::Anthropic)
            .with_unsupported(OperationKind::Embed)
            .without_usage();
        let opts = ExecuteOptions::default();
        let err = provider
            .execute(OperationKind::Embed, &Content::text("x"), "m", &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported { .. }));

        let out = provider
            .execute(OperationKind::Chat, &Content::text("hi"), "m", &opts)
            .await
            .unwrap();
        assert!(out.usage.is_none());
    }

    #[tokio::test]
    async fn test_moderation_flags_keywords() {
        let provider = MockProvider::new(ProviderKind::OpenAi);
        let opts = ExecuteOptions::default();
        let out = provider
            .execute(
                OperationKind::Moderate,
                &Content::text("this is a scam"),
                "m",
                &opts,
            )
            .await
            .unwrap();
        assert!(matches!(out.result, NormalizedResult::Moderation { flagged: true, .. }));
    }

    #[test]
    fn test_embedding_is_unit_length() {
        let v = MockEmbeddingGenerator::generate("hello", 32);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(
            MockEmbeddingGenerator::generate_with_seed(7, 4),
            MockEmbeddingGenerator::generate_with_seed(7, 4)
        );
    }
}
