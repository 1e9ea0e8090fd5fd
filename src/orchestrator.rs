//! Per-candidate check: local lookup, then registries in order with
//! short-circuiting, retry, and merging into one verdict.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::CheckerConfig;
use crate::local_store::LocalKnowledgeStore;
use crate::matching::{exact_matches, similar_matches};
use crate::rate_limiter::RateLimiter;
use crate::shutdown::Shutdown;
use crate::sources::{search_with_retry, RetryPolicy, SourceClient, LOCAL_SOURCE};
use crate::types::{MatchVerdict, NiceClassSet, RegionSet, SourceResult, VerdictStatus};
use crate::validator::CandidateName;
use crate::TARGET_SOURCE;

pub struct QueryOrchestrator {
    sources: Vec<Arc<dyn SourceClient>>,
    local_store: Arc<LocalKnowledgeStore>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    stop_on_similar: bool,
    shutdown: Shutdown,
}

impl QueryOrchestrator {
    pub fn new(
        sources: Vec<Arc<dyn SourceClient>>,
        local_store: Arc<LocalKnowledgeStore>,
        limiter: Arc<RateLimiter>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            sources,
            local_store,
            limiter,
            retry: RetryPolicy::default(),
            stop_on_similar: false,
            shutdown,
        }
    }

    pub fn from_config(
        config: &CheckerConfig,
        sources: Vec<Arc<dyn SourceClient>>,
        local_store: Arc<LocalKnowledgeStore>,
        limiter: Arc<RateLimiter>,
        shutdown: Shutdown,
    ) -> Self {
        Self::new(sources, local_store, limiter, shutdown)
            .with_retry(RetryPolicy::from(config))
            .with_stop_on_similar(config.stop_on_similar)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Treat a similar match as conclusive and skip the remaining sources.
    pub fn with_stop_on_similar(mut self, enabled: bool) -> Self {
        self.stop_on_similar = enabled;
        self
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id().to_string()).collect()
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub async fn check(
        &self,
        candidate: &CandidateName,
        nice_classes: &NiceClassSet,
        regions: &RegionSet,
    ) -> MatchVerdict {
        info!(target: TARGET_SOURCE, "Checking {} (classes: {:?})", candidate, nice_classes.iter().collect::<Vec<_>>());
        let mut acc = Accumulator::new(candidate, nice_classes, regions);

        if self.local_store.contains(candidate, nice_classes, regions) {
            let matched = self.local_store.matched_classes(candidate, nice_classes);
            info!(target: TARGET_SOURCE, "{} was checked before under classes {:?}; skipping registries", candidate, matched);
            return acc.local_hit();
        }

        // Throttles the whole pipeline; local hits never reach the network.
        if let Err(err) = self.limiter.acquire_check().await {
            error!(target: TARGET_SOURCE, "Could not start check for {}: {}", candidate, err);
            acc.errors.push(err.to_string());
            acc.failed = true;
            return acc.finish();
        }

        for source in &self.sources {
            let outcome = search_with_retry(
                source.as_ref(),
                &self.limiter,
                &self.retry,
                &self.shutdown,
                candidate,
                nice_classes,
                regions,
            )
            .await;

            // Only sources that were actually called are listed.
            if outcome.attempts > 0 {
                acc.sources.push(source.id().to_string());
            }

            if outcome.cancelled {
                info!(target: TARGET_SOURCE, "Check for {} cancelled at {}", candidate, source.id());
                acc.errors.push(format!("{}: cancelled", source.id()));
                acc.failed = true;
                break;
            }

            if outcome.result.is_failed() {
                let reason = outcome.result.error.unwrap_or_else(|| "unknown error".to_string());
                error!(target: TARGET_SOURCE, "Stopping check for {}: {} failed after {} attempts", candidate, source.id(), outcome.attempts);
                acc.errors.push(format!("{} query failed: {}", source.id(), reason));
                acc.failed = true;
                break;
            }

            acc.merge(&outcome.result);

            if !acc.exact.is_empty() {
                info!(target: TARGET_SOURCE, "Exact match for {} at {}; skipping remaining sources", candidate, source.id());
                break;
            }
            if self.stop_on_similar && !acc.similar.is_empty() {
                info!(target: TARGET_SOURCE, "Similar match for {} at {}; skipping remaining sources", candidate, source.id());
                break;
            }
        }

        let verdict = acc.finish();
        info!(target: TARGET_SOURCE, "Verdict for {}: {} (found {}, sources {:?})", verdict.candidate, verdict.status, verdict.total_found, verdict.sources_queried);
        verdict
    }
}

/// Running state of one check.
struct Accumulator {
    candidate: String,
    nice_classes: Vec<String>,
    regions: Vec<String>,
    exact: Vec<String>,
    similar: Vec<String>,
    marks: BTreeSet<String>,
    total_found: u64,
    /// Marks disclosed per source, summed without deduplication.
    disclosed: u64,
    sources: Vec<String>,
    errors: Vec<String>,
    failed: bool,
    query: CandidateName,
}

impl Accumulator {
    fn new(candidate: &CandidateName, nice_classes: &NiceClassSet, regions: &RegionSet) -> Self {
        Self {
            candidate: candidate.to_string(),
            nice_classes: nice_classes.iter().map(str::to_string).collect(),
            regions: regions.iter().map(str::to_string).collect(),
            exact: Vec::new(),
            similar: Vec::new(),
            marks: BTreeSet::new(),
            total_found: 0,
            disclosed: 0,
            sources: Vec::new(),
            errors: Vec::new(),
            failed: false,
            query: candidate.clone(),
        }
    }

    fn merge(&mut self, result: &SourceResult) {
        debug!(target: TARGET_SOURCE, "Merging {} marks (reported total {}) from {}", result.marks.len(), result.total_count, result.source_id);
        self.total_found += result.total_count;
        self.disclosed += result.marks.len() as u64;
        self.marks.extend(result.marks.iter().cloned());
        extend_unique(&mut self.exact, exact_matches(&self.query, &result.marks));
        extend_unique(&mut self.similar, similar_matches(&self.query, &result.marks));
    }

    fn local_hit(mut self) -> MatchVerdict {
        self.exact.push(self.candidate.clone());
        self.marks.insert(self.candidate.clone());
        self.total_found = 1;
        self.disclosed = 1;
        self.sources.push(LOCAL_SOURCE.to_string());
        self.build(VerdictStatus::LocalMatch)
    }

    fn finish(self) -> MatchVerdict {
        let status = if self.failed {
            VerdictStatus::Error
        } else if !self.exact.is_empty() {
            VerdictStatus::ExactMatch
        } else if !self.similar.is_empty() {
            VerdictStatus::SimilarMatch
        } else if self.total_found > self.disclosed {
            VerdictStatus::NeedsReview
        } else {
            VerdictStatus::NoMatch
        };
        self.build(status)
    }

    fn build(self, status: VerdictStatus) -> MatchVerdict {
        let all_marks: Vec<String> = self.marks.into_iter().collect();
        MatchVerdict {
            candidate: self.candidate,
            status,
            exact_matches: self.exact,
            similar_matches: self.similar,
            total_displayed: all_marks.len(),
            all_marks,
            total_found: self.total_found,
            sources_queried: self.sources,
            error_detail: if self.errors.is_empty() {
                None
            } else {
                Some(self.errors)
            },
            nice_classes: self.nice_classes,
            regions: self.regions,
            checked_at: Utc::now(),
        }
    }
}

fn extend_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}
