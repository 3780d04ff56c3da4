//! Sliding-window rate limiting per request scope.
//!
//! Each scope keeps the admission times of its non-cached calls for the last
//! day. A call is admitted only if every configured window (1 s burst,
//! minute, hour, day) is below its limit; the check and the admission happen
//! under one lock so concurrent calls cannot both take the last slot.
//! Scopes with no admissions in the last day are dropped by a periodic sweep.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use agora_core::{Error, RateLimits, Result, Scope};

const BURST_WINDOW: Duration = Duration::from_secs(1);
const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const HOUR_WINDOW: Duration = Duration::from_secs(3_600);
const DAY_WINDOW: Duration = Duration::from_secs(86_400);
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Default)]
struct Admissions {
    by_scope: HashMap<Scope, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

/// Drop admissions older than the longest window.
fn prune(times: &mut VecDeque<Instant>, now: Instant) {
    if let Some(cutoff) = now.checked_sub(DAY_WINDOW) {
        while times.front().is_some_and(|t| *t <= cutoff) {
            times.pop_front();
        }
    }
}

impl Admissions {
    /// Prune every scope and forget the idle ones, at most once per interval.
    fn sweep(&mut self, now: Instant) {
        if self
            .last_sweep
            .is_some_and(|last| now.saturating_duration_since(last) < SWEEP_INTERVAL)
        {
            return;
        }
        self.last_sweep = Some(now);
        self.by_scope.retain(|_, times| {
            prune(times, now);
            !times.is_empty()
        });
    }
}

/// In-process limiter keyed by scope.
#[derive(Debug, Default)]
pub struct RateLimiter {
    admitted: Mutex<Admissions>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one call for `scope` or fail with [`Error::RateLimited`].
    ///
    /// A limit of zero disables that window.
    pub fn check_and_admit(&self, scope: &Scope, limits: &RateLimits) -> Result<()> {
        let now = Instant::now();
        let mut admitted = lock(&self.admitted);
        admitted.sweep(now);
        let times = admitted.by_scope.entry(scope.clone()).or_default();
        prune(times, now);

        let windows = [
            ("burst", BURST_WINDOW, limits.burst),
            ("minute", MINUTE_WINDOW, limits.per_minute),
            ("hour", HOUR_WINDOW, limits.per_hour),
            ("day", DAY_WINDOW, limits.per_day),
        ];

        for (name, window, limit) in windows {
            if limit == 0 {
                continue;
            }
            let start = match now.checked_sub(window) {
                Some(cutoff) => times.partition_point(|t| *t <= cutoff),
                None => 0,
            };
            let in_window = times.len() - start;
            if in_window >= limit as usize {
                let retry_after = times
                    .get(start)
                    .map(|oldest| (*oldest + window).saturating_duration_since(now))
                    .unwrap_or(window);
                let retry_after_secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
                warn!(
                    scope = %scope,
                    window = name,
                    limit,
                    retry_after_secs,
                    "Rate limit exceeded"
                );
                return Err(Error::RateLimited {
                    scope: scope.key(),
                    window: name.to_string(),
                    retry_after_secs,
                });
            }
        }

        times.push_back(now);
        Ok(())
    }

    /// Calls admitted for `scope` in the last `window`.
    pub fn admitted_within(&self, scope: &Scope, window: Duration) -> usize {
        let now = Instant::now();
        let admitted = lock(&self.admitted);
        match (admitted.by_scope.get(scope), now.checked_sub(window)) {
            (Some(times), Some(cutoff)) => times.iter().filter(|t| **t > cutoff).count(),
            (Some(times), None) => times.len(),
            (None, _) => 0,
        }
    }

    /// Forget all admissions for `scope`.
    pub fn reset(&self, scope: &Scope) {
        lock(&self.admitted).by_scope.remove(scope);
    }

    /// Scopes currently holding admission history.
    pub fn tracked_scopes(&self) -> usize {
        lock(&self.admitted).by_scope.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn per_minute(n: u32) -> RateLimits {
        RateLimits {
            per_minute: n,
            per_hour: 0,
            per_day: 0,
            burst: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_minute_boundary() {
        let limiter = RateLimiter::new();
        let scope = Scope::college("c1");
        let limits = per_minute(100);

        for i in 0..100 {
            limiter
                .check_and_admit(&scope, &limits)
                .unwrap_or_else(|e| panic!("call {} rejected: {}", i + 1, e));
        }
        let err = limiter.check_and_admit(&scope, &limits).unwrap_err();
        match err {
            Error::RateLimited {
                window,
                retry_after_secs,
                ..
            } => {
                assert_eq!(window, "minute");
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new();
        let scope = Scope::user("u1");
        let limits = per_minute(2);

        limiter.check_and_admit(&scope, &limits).unwrap();
        limiter.check_and_admit(&scope, &limits).unwrap();
        assert!(limiter.check_and_admit(&scope, &limits).is_err());

        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.check_and_admit(&scope, &limits).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_window() {
        let limiter = RateLimiter::new();
        let scope = Scope::user("u2");
        let limits = RateLimits {
            burst: 3,
            ..RateLimits::default()
        };
        for _ in 0..3 {
            limiter.check_and_admit(&scope, &limits).unwrap();
        }
        let err = limiter.check_and_admit(&scope, &limits).unwrap_err();
        assert!(matches!(err, Error::RateLimited { ref window, .. } if window == "burst"));

        tokio::time::advance(Duration::from_millis(1_100)).await;
        limiter.check_and_admit(&scope, &limits).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_scopes_are_independent() {
        let limiter = RateLimiter::new();
        let limits = per_minute(1);
        limiter
            .check_and_admit(&Scope::college("a"), &limits)
            .unwrap();
        limiter
            .check_and_admit(&Scope::college("b"), &limits)
            .unwrap();
        assert_eq!(
            limiter.admitted_within(&Scope::college("a"), MINUTE_WINDOW),
            1
        );

        limiter.reset(&Scope::college("a"));
        limiter
            .check_and_admit(&Scope::college("a"), &limits)
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_scopes_are_forgotten() {
        let limiter = RateLimiter::new();
        let limits = per_minute(10);
        for id in ["a", "b", "c"] {
            limiter.check_and_admit(&Scope::user(id), &limits).unwrap();
        }
        assert_eq!(limiter.tracked_scopes(), 3);

        tokio::time::advance(DAY_WINDOW + Duration::from_secs(1)).await;
        limiter.check_and_admit(&Scope::user("d"), &limits).unwrap();
        assert_eq!(limiter.tracked_scopes(), 1);
        assert_eq!(limiter.admitted_within(&Scope::user("a"), DAY_WINDOW), 0);

        // Active scopes survive a sweep.
        tokio::time::advance(SWEEP_INTERVAL).await;
        limiter.check_and_admit(&Scope::user("e"), &limits).unwrap();
        assert_eq!(limiter.tracked_scopes(), 2);
    }
}
