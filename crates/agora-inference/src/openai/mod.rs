//! OpenAI provider.
//!
//! Moderation goes to the dedicated `/moderations` endpoint, embeddings to
//! `/embeddings`, and every other operation through `/chat/completions`
//! with an operation-specific prompt.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora_core::{Content, OperationKind};
//! use agora_inference::openai::{OpenAIConfig, OpenAIProvider};
//! use agora_inference::{ExecuteOptions, Provider};
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = OpenAIProvider::new(OpenAIConfig {
//!         api_key: std::env::var("OPENAI_API_KEY").ok(),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//!     let output = provider
//!         .execute(
//!             OperationKind::Tag,
//!             &Content::text("Robotics club meets Thursday in the maker lab"),
//!             "gpt-4o-mini",
//!             &ExecuteOptions::default(),
//!         )
//!         .await
//!         .unwrap();
//!     println!("{:?}", output.result);
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIConfig, OpenAIProvider};
pub use error::{classify, to_provider_error, OpenAIErrorCode};
pub use types::*;
