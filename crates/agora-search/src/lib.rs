//! # agora-search
//!
//! Content ranking and retrieval for the agora AI engine.
//!
//! This crate provides:
//! - Decay-weighted hot-score ranking over engagement counters
//! - Brute-force cosine similarity search over stored embeddings
//!
//! ## Example
//!
//! ```ignore
//! use agora_search::{SimilarityQuery, SimilaritySearch};
//!
//! let search = SimilaritySearch::new(db.embeddings.clone());
//! let hits = search
//!     .find_similar(&query_vector, &SimilarityQuery::new().with_content_type("post"))
//!     .await?;
//! ```

pub mod ranking;
pub mod similarity;

// Re-export core types
pub use agora_core::*;

pub use ranking::{
    compare_ranked, hot_score, hot_score_for_age, raw_score, snapshot_hot_score,
    EngagementChange, HotRanking, RankedItem,
};
pub use similarity::{
    cosine_similarity, rank_by_similarity, SimilarityHit, SimilarityQuery, SimilaritySearch,
};
