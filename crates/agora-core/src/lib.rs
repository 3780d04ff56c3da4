//! # agora-core
//!
//! Core types, traits, and abstractions for the agora AI engine.
//!
//! This crate provides the domain model, scoped configuration schema, error
//! taxonomy and collaborator traits that the other agora crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod scoped_config;
pub mod tokenizer;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorKind, ErrorReport, Result};
pub use events::{AiEvent, EventBus, EventEnvelope};
pub use models::*;
pub use scoped_config::*;
pub use tokenizer::estimate_tokens;
pub use traits::*;
pub use uuid_utils::new_v7;
