//! Brute-force cosine similarity search over stored embeddings.
//!
//! Candidates are narrowed by exact-match filters first, scored against the
//! query, thresholded, sorted by similarity descending and truncated.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use agora_core::defaults::{SIMILARITY_LIMIT, SIMILARITY_MIN};
use agora_core::{ContentRef, EmbeddingFilter, EmbeddingRecord, EmbeddingRepository, Error, Result};

/// Cosine similarity of two vectors.
///
/// Returns 0 when the lengths differ, either vector is empty, or either norm
/// is zero. Accumulates in f64 and clamps the result to `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut a_norm, mut b_norm) = (0f64, 0f64, 0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }

    (dot / (a_norm.sqrt() * b_norm.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Parameters for a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityQuery {
    #[serde(default)]
    pub filter: EmbeddingFilter,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
}

fn default_limit() -> usize {
    SIMILARITY_LIMIT
}

fn default_min_similarity() -> f32 {
    SIMILARITY_MIN
}

impl Default for SimilarityQuery {
    fn default() -> Self {
        Self {
            filter: EmbeddingFilter::default(),
            limit: SIMILARITY_LIMIT,
            min_similarity: SIMILARITY_MIN,
        }
    }
}

impl SimilarityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.filter.content_type = Some(content_type.into());
        self
    }

    pub fn with_scope(mut self, scope: agora_core::Scope) -> Self {
        self.filter.scope = Some(scope);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.filter.model = Some(model.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub content: ContentRef,
    pub similarity: f32,
}

/// Rank `records` against `query_vector`.
///
/// Records are re-checked against the filter so callers may pass an
/// unfiltered candidate set. Ties keep a stable order by content reference.
pub fn rank_by_similarity(
    query_vector: &[f32],
    records: &[EmbeddingRecord],
    query: &SimilarityQuery,
) -> Vec<SimilarityHit> {
    let mut hits: Vec<SimilarityHit> = records
        .iter()
        .filter(|r| query.filter.matches(r))
        .filter_map(|r| {
            let similarity = cosine_similarity(query_vector, &r.vector);
            trace!(content = %r.content, similarity, "Candidate scored");
            (similarity >= query.min_similarity).then(|| SimilarityHit {
                content: r.content.clone(),
                similarity,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.content.cmp(&b.content))
    });
    hits.truncate(query.limit);
    hits
}

/// Similarity search backed by an embedding repository.
#[derive(Clone)]
pub struct SimilaritySearch {
    embeddings: Arc<dyn EmbeddingRepository>,
}

impl SimilaritySearch {
    pub fn new(embeddings: Arc<dyn EmbeddingRepository>) -> Self {
        Self { embeddings }
    }

    /// Top matches for `query_vector` under `query`'s filter, limit and threshold.
    pub async fn find_similar(
        &self,
        query_vector: &[f32],
        query: &SimilarityQuery,
    ) -> Result<Vec<SimilarityHit>> {
        if query_vector.is_empty() {
            return Err(Error::InvalidInput("query vector is empty".to_string()));
        }
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.embeddings.candidates(&query.filter).await?;
        let hits = rank_by_similarity(query_vector, &candidates, query);

        debug!(
            dimensions = query_vector.len(),
            candidates = candidates.len(),
            hits = hits.len(),
            min_similarity = query.min_similarity,
            limit = query.limit,
            "Similarity search complete"
        );
        Ok(hits)
    }
}

impl std::fmt::Debug for SimilaritySearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilaritySearch").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::Scope;

    fn record(id: &str, content_type: &str, vector: Vec<f32>) -> EmbeddingRecord {
        let dims = vector.len();
        EmbeddingRecord::new(
            ContentRef::new(content_type, id),
            Scope::global(),
            "test-embed",
            vector,
            dims,
            "text",
            16,
        )
        .unwrap()
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.3, -1.2, 4.0, 0.01];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0, 3.0], &[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_length_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_bounds() {
        let pairs: [(&[f32], &[f32]); 4] = [
            (&[1e30, 1e30], &[1e30, 1e30]),
            (&[1e-30, 3.0], &[2.0, -7.5]),
            (&[0.1, 0.2, 0.3], &[0.3, 0.2, 0.1]),
            (&[-5.0, 5.0], &[5.0, -5.0]),
        ];
        for (a, b) in pairs {
            let s = cosine_similarity(a, b);
            assert!((-1.0..=1.0).contains(&s), "{} out of bounds", s);
        }
    }

    #[test]
    fn test_rank_threshold_order_and_limit() {
        let records = vec![
            record("a", "post", vec![1.0, 0.0]),
            record("b", "post", vec![0.9, 0.1]),
            record("c", "post", vec![0.0, 1.0]),
            record("d", "post", vec![0.7, 0.3]),
        ];
        let query = SimilarityQuery::new().with_min_similarity(0.5).with_limit(2);
        let hits = rank_by_similarity(&[1.0, 0.0], &records, &query);

        let ids: Vec<_> = hits.iter().map(|h| h.content.content_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[test]
    fn test_rank_applies_filter() {
        let records = vec![
            record("a", "post", vec![1.0, 0.0]),
            record("b", "comment", vec![1.0, 0.0]),
        ];
        let query = SimilarityQuery::new().with_content_type("comment");
        let hits = rank_by_similarity(&[1.0, 0.0], &records, &query);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content.content_type, "comment");
    }

    #[test]
    fn test_rank_skips_mismatched_dimensions() {
        let records = vec![
            record("short", "post", vec![1.0, 0.0]),
            record("long", "post", vec![1.0, 0.0, 0.0]),
        ];
        let hits = rank_by_similarity(&[1.0, 0.0, 0.0], &records, &SimilarityQuery::new());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content.content_id, "long");
    }

    #[test]
    fn test_rank_ties_break_by_content() {
        let records = vec![
            record("z", "post", vec![2.0, 0.0]),
            record("m", "post", vec![1.0, 0.0]),
        ];
        let hits = rank_by_similarity(&[1.0, 0.0], &records, &SimilarityQuery::new());
        let ids: Vec<_> = hits.iter().map(|h| h.content.content_id.as_str()).collect();
        assert_eq!(ids, vec!["m", "z"]);
    }

    #[test]
    fn test_query_defaults() {
        let query: SimilarityQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.limit, SIMILARITY_LIMIT);
        assert_eq!(query.min_similarity, SIMILARITY_MIN);
        assert_eq!(query, SimilarityQuery::default());
    }
}
