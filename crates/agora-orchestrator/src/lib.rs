//! # agora-orchestrator
//!
//! The AI request orchestrator for the agora platform.
//!
//! This crate provides:
//! - Scoped configuration resolution with a short-lived lookup cache
//! - Content-addressed result caching over Redis or an in-memory store
//! - Per-scope sliding-window rate limits and monthly budgets
//! - The per-request state machine with retries and provider fallback
//! - The interaction ledger, embedding workflow and similarity lookups
//! - Process bootstrap from the environment and tracing setup
//!
//! ## Example
//!
//! ```rust,ignore
//! use agora_orchestrator::{telemetry, Engine, LogConfig};
//! use agora_core::{Content, OperationKind, OperationRequest, Scope};
//!
//! let _guard = telemetry::init_tracing(&LogConfig::from_env());
//! let engine = Engine::from_env().await?;
//!
//! let outcome = engine
//!     .orchestrator
//!     .submit(OperationRequest::new(
//!         OperationKind::Tag,
//!         Content::text("Notes on eigenvalues and diagonalization"),
//!         Scope::college("college_42"),
//!     ))
//!     .await;
//! println!("{} -> {:?}", outcome.status, outcome.result);
//! ```

pub mod budget;
pub mod cache;
pub mod engine;
pub mod ledger;
pub mod orchestrator;
pub mod rate_limit;
pub mod resolver;
pub mod retry;
pub mod settings;
pub mod telemetry;

pub use agora_core::*;

pub use budget::BudgetGuard;
pub use cache::{fingerprint, CachedResult, MemoryCacheStore, RedisCacheStore, ResultCache};
pub use engine::Engine;
pub use ledger::InteractionLedger;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SubmitOutcome};
pub use rate_limit::RateLimiter;
pub use resolver::{ConfigResolver, ResolvedConfig};
pub use retry::RetryPolicy;
pub use settings::{EngineSettings, LogConfig, LogFormat};
