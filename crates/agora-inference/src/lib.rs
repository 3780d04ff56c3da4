//! # agora-inference
//!
//! AI provider adapters for the agora AI engine.
//!
//! This crate provides:
//! - The [`Provider`] trait every adapter implements, with the
//!   transient / permanent / unsupported failure taxonomy
//! - OpenAI, Anthropic and Ollama adapters that normalize provider payloads
//!   into [`agora_core::NormalizedResult`]
//! - Prompt construction and tolerant reply parsing for chat-served operations
//! - Model pricing for per-call cost accounting
//! - A scriptable mock provider (feature `mock`)
//!
//! # Feature Flags
//!
//! - `mock`: Enable [`mock::MockProvider`] for tests in dependent crates
//!
//! # Example
//!
//! ```rust,no_run
//! use agora_core::{Content, OperationKind, ProviderKind};
//! use agora_inference::{ExecuteOptions, ProviderRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = ProviderRegistry::from_env().unwrap();
//!     if let Some(ollama) = registry.get(ProviderKind::Ollama) {
//!         let output = ollama
//!             .execute(
//!                 OperationKind::Summarize,
//!                 &Content::text("Long lecture notes..."),
//!                 "llama3.2",
//!                 &ExecuteOptions::default(),
//!             )
//!             .await
//!             .unwrap();
//!         println!("{:?}", output.result);
//!     }
//! }
//! ```

pub mod anthropic;
pub mod http;
pub mod ollama;
pub mod openai;
pub mod pricing;
pub mod prompts;
pub mod provider;

// Mock provider for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use agora_core::*;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use ollama::{OllamaConfig, OllamaProvider};
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use pricing::{ModelPrice, PricingTable};
pub use provider::{
    ExecuteOptions, Provider, ProviderError, ProviderOutput, ProviderRegistry, TokenUsage,
};
