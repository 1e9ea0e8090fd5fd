//! Uniform rate-limit + retry wrapper around `SourceClient::search`.

use std::time::Duration;
use tracing::{debug, warn};

use super::SourceClient;
use crate::config::CheckerConfig;
use crate::rate_limiter::{RateLimitError, RateLimiter};
use crate::shutdown::Shutdown;
use crate::types::{NiceClassSet, RegionSet, SourceResult};
use crate::validator::CandidateName;
use crate::TARGET_SOURCE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt.
    pub max_retries: usize,
    /// Fixed backoff between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_secs(5),
        }
    }
}

impl From<&CheckerConfig> for RetryPolicy {
    fn from(config: &CheckerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.retry_delay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// The last result; `Failed` only if every attempt failed.
    pub result: SourceResult,
    /// Number of `search` calls actually made.
    pub attempts: usize,
    /// Stopped by the shutdown signal rather than by exhausting retries.
    pub cancelled: bool,
}

pub async fn search_with_retry(
    client: &dyn SourceClient,
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    shutdown: &Shutdown,
    candidate: &CandidateName,
    nice_classes: &NiceClassSet,
    regions: &RegionSet,
) -> RetryOutcome {
    let source_id = client.id().to_string();
    let mut attempts = 0;
    let mut tries = 0;

    loop {
        tries += 1;
        let result = match limiter.acquire(&source_id).await {
            Ok(()) => {
                attempts += 1;
                debug!(target: TARGET_SOURCE, "Calling {} for {} (attempt {})", source_id, candidate, tries);
                client.search(candidate, nice_classes, regions).await
            }
            Err(RateLimitError::Cancelled(_)) => return cancelled(&source_id, attempts),
            // Waiting past the ceiling is reported like any other source failure.
            Err(err) => SourceResult::failed(&source_id, err.to_string()),
        };

        if !result.is_failed() {
            return RetryOutcome {
                result,
                attempts,
                cancelled: false,
            };
        }

        let reason = result.error.clone().unwrap_or_default();
        if tries > policy.max_retries {
            warn!(target: TARGET_SOURCE, "{} failed for {} after {} attempts: {}", source_id, candidate, tries, reason);
            return RetryOutcome {
                result,
                attempts,
                cancelled: false,
            };
        }

        warn!(target: TARGET_SOURCE, "{} failed for {}: {}; retrying in {:?}", source_id, candidate, reason, policy.delay);
        if shutdown.sleep(policy.delay).await.is_err() {
            return cancelled(&source_id, attempts);
        }
    }
}

fn cancelled(source_id: &str, attempts: usize) -> RetryOutcome {
    RetryOutcome {
        result: SourceResult::failed(source_id, "cancelled by shutdown request"),
        attempts,
        cancelled: true,
    }
}
