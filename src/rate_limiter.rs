//! Minimum spacing between registry calls, per source and per candidate check.
//!
//! Callers reserve a start slot under a lock and then sleep until it, so two
//! callers racing for the same source always end up at least one interval
//! apart.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::config::CheckerConfig;
use crate::shutdown::Shutdown;
use crate::TARGET_SOURCE;

/// Slot key for the whole-pipeline spacing between candidate checks.
const CHECK_SLOT: &str = "__check__";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit wait for {source_id} would take {wait:?}, longer than the {ceiling:?} ceiling")]
    Timeout {
        source_id: String,
        wait: Duration,
        ceiling: Duration,
    },
    #[error("rate limit wait for {0} cancelled")]
    Cancelled(String),
}

pub struct RateLimiter {
    intervals: HashMap<String, Duration>,
    default_interval: Duration,
    check_interval: Duration,
    max_wait: Duration,
    /// Last reserved start per source.
    slots: DashMap<String, Instant>,
    last_check: Mutex<Option<Instant>>,
    shutdown: Shutdown,
}

impl RateLimiter {
    pub fn new(default_interval: Duration, check_interval: Duration, shutdown: Shutdown) -> Self {
        Self {
            intervals: HashMap::new(),
            default_interval,
            check_interval,
            max_wait: Duration::from_secs(120),
            slots: DashMap::new(),
            last_check: Mutex::new(None),
            shutdown,
        }
    }

    pub fn from_config(config: &CheckerConfig, shutdown: Shutdown) -> Self {
        let mut limiter = Self::new(
            config.default_source_interval,
            config.check_interval,
            shutdown,
        )
        .with_max_wait(config.acquire_timeout);
        limiter.intervals = config.source_intervals.clone();
        limiter
    }

    pub fn with_interval(mut self, source_id: &str, interval: Duration) -> Self {
        self.intervals.insert(source_id.to_string(), interval);
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn interval_for(&self, source_id: &str) -> Duration {
        self.intervals
            .get(source_id)
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Waits until `source_id` may be called again, then returns.
    pub async fn acquire(&self, source_id: &str) -> Result<(), RateLimitError> {
        let interval = self.interval_for(source_id);
        let now = Instant::now();

        // The shard lock is held only while the slot is computed and recorded.
        let slot = match self.slots.entry(source_id.to_string()) {
            Entry::Occupied(mut last) => {
                let slot = next_slot(*last.get(), interval, now);
                self.check_ceiling(source_id, slot, now)?;
                last.insert(slot);
                slot
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                now
            }
        };

        self.wait(source_id, slot).await
    }

    /// Waits until the next candidate check may start.
    pub async fn acquire_check(&self) -> Result<(), RateLimitError> {
        let now = Instant::now();
        let slot = {
            let mut last = self.last_check.lock().unwrap_or_else(|e| e.into_inner());
            let slot = match *last {
                Some(previous) => next_slot(previous, self.check_interval, now),
                None => now,
            };
            self.check_ceiling(CHECK_SLOT, slot, now)?;
            *last = Some(slot);
            slot
        };

        self.wait(CHECK_SLOT, slot).await
    }

    fn check_ceiling(&self, source_id: &str, slot: Instant, now: Instant) -> Result<(), RateLimitError> {
        let wait = slot.saturating_duration_since(now);
        if wait > self.max_wait {
            return Err(RateLimitError::Timeout {
                source_id: source_id.to_string(),
                wait,
                ceiling: self.max_wait,
            });
        }
        Ok(())
    }

    async fn wait(&self, source_id: &str, slot: Instant) -> Result<(), RateLimitError> {
        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(target: TARGET_SOURCE, "Rate limiting {}: waiting {:?}", source_id, wait);
        }
        self.shutdown
            .sleep_until(slot)
            .await
            .map_err(|_| RateLimitError::Cancelled(source_id.to_string()))
    }
}

fn next_slot(previous: Instant, interval: Duration, now: Instant) -> Instant {
    (previous + interval).max(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(interval_ms: u64) -> RateLimiter {
        RateLimiter::new(
            Duration::from_millis(interval_ms),
            Duration::from_secs(2),
            Shutdown::never(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_source_is_spaced() {
        let limiter = limiter(1000);
        let start = Instant::now();

        limiter.acquire("tmdn").await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire("tmdn").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_sources_do_not_wait() {
        let limiter = limiter(1000).with_interval("uspto", Duration::from_secs(5));
        let start = Instant::now();

        limiter.acquire("tmdn").await.unwrap();
        limiter.acquire("uspto").await.unwrap();
        limiter.acquire("wipo").await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.interval_for("uspto"), Duration::from_secs(5));
        assert_eq!(limiter.interval_for("wipo"), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_get_distinct_slots() {
        let limiter = Arc::new(limiter(1000));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire("tmdn").await.unwrap();
                Instant::now()
            }));
        }

        let mut started = Vec::new();
        for handle in handles {
            started.push(handle.await.unwrap().duration_since(start));
        }
        started.sort();

        assert_eq!(started[0], Duration::ZERO);
        assert!(started[1] >= Duration::from_millis(1000));
        assert!(started[2] >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_spacing_is_separate() {
        let limiter = limiter(100);
        let start = Instant::now();

        limiter.acquire_check().await.unwrap();
        limiter.acquire("tmdn").await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire_check().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_over_ceiling_times_out() {
        let limiter = limiter(10_000).with_max_wait(Duration::from_secs(5));
        limiter.acquire("tmdn").await.unwrap();

        let err = limiter.acquire("tmdn").await.unwrap_err();
        assert!(matches!(err, RateLimitError::Timeout { ref source_id, .. } if source_id == "tmdn"));

        // A rejected caller does not push the next slot further out
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.acquire("tmdn").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_cancellable() {
        let (tx, shutdown) = Shutdown::channel();
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_secs(60),
            Duration::from_secs(2),
            shutdown,
        ));
        limiter.acquire("tmdn").await.unwrap();

        let waiter = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.acquire("tmdn").await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();

        assert_eq!(
            waiter.await.unwrap(),
            Err(RateLimitError::Cancelled("tmdn".to_string()))
        );
    }
}
