//! Decay-weighted "hot" ranking for content items.
//!
//! The score combines a logarithmic engagement term with a linear time term:
//!
//! ```text
//! score   = likes*2 + comments*1.5 + shares*1 - 1
//! order   = log10(max(|score|, 1))
//! sign    = signum(score)            // -1, 0 or 1
//! seconds = created_at - HOT_EPOCH
//! hot     = sign*order + seconds / (gravity * 3600)
//! ```
//!
//! Newer items get a larger time term, so with equal engagement a newer item
//! never ranks below an older one. Ten-fold engagement buys
//! `gravity` hours of recency.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use agora_core::defaults::{HOT_EPOCH, HOT_GRAVITY};
use agora_core::{EngagementSnapshot, Error, Result};

/// Weight of one like.
pub const LIKE_WEIGHT: f64 = 2.0;
/// Weight of one comment.
pub const COMMENT_WEIGHT: f64 = 1.5;
/// Weight of one share.
pub const SHARE_WEIGHT: f64 = 1.0;

/// Weighted engagement before the log transform.
pub fn raw_score(likes: u64, comments: u64, shares: u64) -> f64 {
    likes as f64 * LIKE_WEIGHT + comments as f64 * COMMENT_WEIGHT + shares as f64 * SHARE_WEIGHT
        - 1.0
}

/// Signed log-magnitude of a raw score. Magnitudes below 1 clamp to 1.
fn signed_order(score: f64) -> f64 {
    let order = score.abs().max(1.0).log10();
    let sign = if score > 0.0 {
        1.0
    } else if score < 0.0 {
        -1.0
    } else {
        0.0
    };
    sign * order
}

/// Unix time of `at` in fractional seconds.
fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_millis()) / 1000.0
}

fn time_term(created_unix_secs: f64) -> f64 {
    (created_unix_secs - HOT_EPOCH as f64) / (HOT_GRAVITY * 3600.0)
}

/// Hot score for an item created at `created_at`.
pub fn hot_score(likes: u64, comments: u64, shares: u64, created_at: DateTime<Utc>) -> f64 {
    signed_order(raw_score(likes, comments, shares)) + time_term(unix_seconds(created_at))
}

/// Hot score for an item that is `age_secs` old at `now`.
///
/// Computed in floating point, so any age is accepted, including ages
/// reaching back before the representable date range.
pub fn hot_score_for_age(
    likes: u64,
    comments: u64,
    shares: u64,
    age_secs: u64,
    now: DateTime<Utc>,
) -> f64 {
    signed_order(raw_score(likes, comments, shares))
        + time_term(unix_seconds(now) - age_secs as f64)
}

/// Hot score of a snapshot. Views do not contribute.
pub fn snapshot_hot_score(snapshot: &EngagementSnapshot) -> f64 {
    hot_score(
        snapshot.like_count,
        snapshot.comment_count,
        snapshot.share_count,
        snapshot.created_at,
    )
}

/// Descending hot score, then newer first, then content id for a total order.
pub fn compare_ranked(a: &RankedItem, b: &RankedItem) -> Ordering {
    b.hot_score
        .total_cmp(&a.hot_score)
        .then_with(|| b.snapshot.created_at.cmp(&a.snapshot.created_at))
        .then_with(|| a.snapshot.content_id.cmp(&b.snapshot.content_id))
}

// =============================================================================
// RANKING STATE
// =============================================================================

/// A snapshot with its cached hot score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedItem {
    pub snapshot: EngagementSnapshot,
    pub hot_score: f64,
}

impl RankedItem {
    pub fn new(snapshot: EngagementSnapshot) -> Self {
        let hot_score = snapshot_hot_score(&snapshot);
        Self {
            snapshot,
            hot_score,
        }
    }
}

/// A change to one engagement counter. Negative deltas model un-likes and
/// deleted comments; counters never go below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementChange {
    Likes(i64),
    Comments(i64),
    Shares(i64),
    Views(i64),
}

fn apply_delta(counter: &mut u64, delta: i64) {
    *counter = if delta >= 0 {
        counter.saturating_add(delta.unsigned_abs())
    } else {
        counter.saturating_sub(delta.unsigned_abs())
    };
}

/// In-memory hot ranking, recomputed on creation and on every counter change.
#[derive(Debug, Default)]
pub struct HotRanking {
    items: HashMap<String, RankedItem>,
}

impl HotRanking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an item; returns its hot score.
    pub fn upsert(&mut self, snapshot: EngagementSnapshot) -> f64 {
        let item = RankedItem::new(snapshot);
        let score = item.hot_score;
        trace!(content_id = %item.snapshot.content_id, hot_score = score, "Hot score computed");
        self.items.insert(item.snapshot.content_id.clone(), item);
        score
    }

    /// Apply a counter change and recompute; returns the new hot score.
    pub fn record(&mut self, content_id: &str, change: EngagementChange) -> Result<f64> {
        let item = self
            .items
            .get_mut(content_id)
            .ok_or_else(|| Error::NotFound(format!("ranked content {}", content_id)))?;

        let snapshot = &mut item.snapshot;
        match change {
            EngagementChange::Likes(d) => apply_delta(&mut snapshot.like_count, d),
            EngagementChange::Comments(d) => apply_delta(&mut snapshot.comment_count, d),
            EngagementChange::Shares(d) => apply_delta(&mut snapshot.share_count, d),
            EngagementChange::Views(d) => apply_delta(&mut snapshot.view_count, d),
        }
        item.hot_score = snapshot_hot_score(&item.snapshot);

        debug!(
            content_id = %content_id,
            change = ?change,
            hot_score = item.hot_score,
            "Hot score recomputed"
        );
        Ok(item.hot_score)
    }

    pub fn get(&self, content_id: &str) -> Option<&RankedItem> {
        self.items.get(content_id)
    }

    pub fn remove(&mut self, content_id: &str) -> Option<RankedItem> {
        self.items.remove(content_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items by hot score descending, newer first on ties.
    pub fn ranked(&self, limit: Option<usize>) -> Vec<RankedItem> {
        let mut items: Vec<RankedItem> = self.items.values().cloned().collect();
        items.sort_by(compare_ranked);
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        items
    }
}
