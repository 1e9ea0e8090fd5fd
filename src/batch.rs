//! Runs a list of names through the orchestrator, one batch at a time process-wide.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{CheckerConfig, DEFAULT_STALE_LOCK_AFTER};
use crate::orchestrator::QueryOrchestrator;
use crate::types::{MatchVerdict, NiceClassSet, QueryError, RegionSet, VerdictStatus};
use crate::validator::NameValidator;
use crate::TARGET_BATCH;

static GLOBAL_FLIGHT: Lazy<Arc<SingleFlight>> =
    Lazy::new(|| Arc::new(SingleFlight::new(DEFAULT_STALE_LOCK_AFTER)));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("another batch is already running, try again later")]
    Busy,
    #[error("{count} names submitted, at most {max} can be checked per batch")]
    TooMany { count: usize, max: usize },
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),
}

/// Non-blocking process-wide lock with stale-holder recovery.
#[derive(Debug)]
pub struct SingleFlight {
    /// Generation and acquisition time of the current holder.
    holder: Mutex<Option<(u64, Instant)>>,
    next_generation: Mutex<u64>,
    /// Stale ceiling in milliseconds; adjustable so the global lock can follow config.
    stale_after_ms: AtomicU64,
}

impl SingleFlight {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            holder: Mutex::new(None),
            next_generation: Mutex::new(0),
            stale_after_ms: AtomicU64::new(duration_ms(stale_after)),
        }
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms.load(Ordering::Relaxed))
    }

    pub fn set_stale_after(&self, stale_after: Duration) {
        self.stale_after_ms
            .store(duration_ms(stale_after), Ordering::Relaxed);
    }

    /// The lock shared by every runner in the process.
    pub fn global() -> Arc<Self> {
        GLOBAL_FLIGHT.clone()
    }

    pub fn try_acquire(self: &Arc<Self>) -> Result<FlightGuard, BatchError> {
        let mut holder = self.holder.lock().unwrap_or_else(|e| e.into_inner());

        if let Some((generation, since)) = *holder {
            let held_for = since.elapsed();
            if held_for <= self.stale_after() {
                return Err(BatchError::Busy);
            }
            warn!(target: TARGET_BATCH, "Resetting stale batch lock (generation {}) held for {:?}", generation, held_for);
        }

        let generation = {
            let mut next = self.next_generation.lock().unwrap_or_else(|e| e.into_inner());
            *next += 1;
            *next
        };
        *holder = Some((generation, Instant::now()));

        Ok(FlightGuard {
            flight: self.clone(),
            generation,
        })
    }

    pub fn is_held(&self) -> bool {
        self.holder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn release(&self, generation: u64) {
        let mut holder = self.holder.lock().unwrap_or_else(|e| e.into_inner());
        // A guard whose lock was reset as stale must not release its successor.
        if matches!(*holder, Some((current, _)) if current == generation) {
            *holder = None;
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Releases the single-flight lock when dropped, on every exit path.
#[derive(Debug)]
pub struct FlightGuard {
    flight: Arc<SingleFlight>,
    generation: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flight.release(self.generation);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub verdicts: Vec<MatchVerdict>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// True when the batch is non-empty and every name errored.
    pub fn all_failed(&self) -> bool {
        !self.verdicts.is_empty() && self.verdicts.iter().all(MatchVerdict::is_error)
    }

    /// The single aggregate failure message, present only when every name errored.
    pub fn failure_summary(&self) -> Option<String> {
        if !self.all_failed() {
            return None;
        }
        Some(format!(
            "All {} queries failed, possibly a network problem or a registry outage; please try again later",
            self.verdicts.len()
        ))
    }

    pub fn with_status(&self, status: VerdictStatus) -> Vec<&MatchVerdict> {
        self.verdicts.iter().filter(|v| v.status == status).collect()
    }

    pub fn count(&self, status: VerdictStatus) -> usize {
        self.verdicts.iter().filter(|v| v.status == status).count()
    }
}

/// Splits pasted text into names: one per line, trimmed, blank lines dropped.
pub fn parse_names(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct BatchRunner {
    orchestrator: QueryOrchestrator,
    validator: NameValidator,
    max_batch_size: usize,
    flight: Arc<SingleFlight>,
}

impl BatchRunner {
    pub fn new(orchestrator: QueryOrchestrator) -> Self {
        Self {
            orchestrator,
            validator: NameValidator::default(),
            max_batch_size: crate::config::DEFAULT_MAX_BATCH_SIZE,
            flight: SingleFlight::global(),
        }
    }

    /// Runner on the process-wide lock, with its stale ceiling taken from `config`.
    pub fn from_config(config: &CheckerConfig, orchestrator: QueryOrchestrator) -> Self {
        let flight = SingleFlight::global();
        flight.set_stale_after(config.stale_lock_after);
        Self::new(orchestrator)
            .with_validator(config.validator())
            .with_max_batch_size(config.max_batch_size)
            .with_flight(flight)
    }

    pub fn with_validator(mut self, validator: NameValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    pub fn with_flight(mut self, flight: Arc<SingleFlight>) -> Self {
        self.flight = flight;
        self
    }

    /// Like `run`, building the class and region sets from raw codes.
    pub async fn run_raw<S: AsRef<str>>(
        &self,
        names: &[S],
        nice_classes: &[S],
        regions: &[S],
    ) -> Result<BatchReport, BatchError> {
        let nice_classes = NiceClassSet::new(nice_classes)?;
        let regions = RegionSet::new(regions)?;
        self.run(names, &nice_classes, &regions).await
    }

    /// Checks every name in order and returns exactly one verdict per name.
    pub async fn run<S: AsRef<str>>(
        &self,
        names: &[S],
        nice_classes: &NiceClassSet,
        regions: &RegionSet,
    ) -> Result<BatchReport, BatchError> {
        if names.len() > self.max_batch_size {
            return Err(BatchError::TooMany {
                count: names.len(),
                max: self.max_batch_size,
            });
        }

        let _guard = self.flight.try_acquire().map_err(|err| {
            warn!(target: TARGET_BATCH, "Rejecting batch of {} names: {}", names.len(), err);
            err
        })?;

        let started_at = Utc::now();
        let total = names.len();
        info!(target: TARGET_BATCH, "Starting batch of {} names", total);

        let shutdown = self.orchestrator.shutdown();
        let mut verdicts = Vec::with_capacity(total);

        for (i, raw) in names.iter().enumerate() {
            let raw = raw.as_ref();

            // Cancellation only takes effect between names.
            if shutdown.is_triggered() {
                verdicts.push(
                    MatchVerdict::rejected(raw, "cancelled before the check started")
                        .with_query(nice_classes, regions),
                );
                continue;
            }

            let candidate = match self.validator.validate(raw) {
                Ok(candidate) => candidate,
                Err(err) => {
                    info!(target: TARGET_BATCH, "[{}/{}] rejected {:?}: {}", i + 1, total, raw, err);
                    verdicts.push(
                        MatchVerdict::rejected(raw, err.to_string()).with_query(nice_classes, regions),
                    );
                    continue;
                }
            };

            info!(target: TARGET_BATCH, "[{}/{}] checking {}", i + 1, total, candidate);
            verdicts.push(self.orchestrator.check(&candidate, nice_classes, regions).await);
        }

        let report = BatchReport {
            verdicts,
            started_at,
            finished_at: Utc::now(),
        };

        match report.failure_summary() {
            Some(summary) => warn!(target: TARGET_BATCH, "{}", summary),
            None => info!(target: TARGET_BATCH, "Batch finished: {} names, {} errors", total, report.count(VerdictStatus::Error)),
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_store::LocalKnowledgeStore;
    use crate::rate_limiter::RateLimiter;
    use crate::shutdown::Shutdown;
    use crate::sources::SourceClient;
    use crate::testing::{classes, regions, ScriptedSource};
    use crate::types::SourceResult;

    fn orchestrator(sources: Vec<Arc<dyn SourceClient>>, shutdown: Shutdown) -> QueryOrchestrator {
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_millis(200),
            Duration::from_secs(1),
            shutdown.clone(),
        ));
        QueryOrchestrator::new(
            sources,
            Arc::new(LocalKnowledgeStore::empty()),
            limiter,
            shutdown,
        )
    }

    fn runner_with(sources: Vec<Arc<dyn SourceClient>>, shutdown: Shutdown) -> BatchRunner {
        BatchRunner::new(orchestrator(sources, shutdown))
            .with_flight(Arc::new(SingleFlight::new(Duration::from_secs(300))))
    }

    fn runner(sources: Vec<Arc<dyn SourceClient>>) -> BatchRunner {
        runner_with(sources, Shutdown::never())
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            parse_names("monica\n\n  nova  \r\njohn\n   \n"),
            vec!["monica".to_string(), "nova".to_string(), "john".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_preserves_input_order() {
        let source = Arc::new(
            ScriptedSource::new("a", SourceResult::no_results("a"))
                .with_latency(Duration::from_millis(10))
                .then(SourceResult::ok("a", ["Xeno"], 1))
                .then(SourceResult::no_results("a")),
        );
        let runner = runner(vec![source.clone()]);

        let report = runner
            .run(&["x", "y", "z"], &classes(), &regions())
            .await
            .unwrap();

        let names: Vec<&str> = report.verdicts.iter().map(|v| v.candidate.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "z"]);
        assert_eq!(source.seen(), vec!["x", "y", "z"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_names_skip_sources() {
        let source = ScriptedSource::returning("a", &[], 0);
        let runner = runner(vec![source.clone()]);

        let report = runner
            .run(&["nova", "two words", "nova7", "luna"], &classes(), &regions())
            .await
            .unwrap();

        let statuses: Vec<VerdictStatus> = report.verdicts.iter().map(|v| v.status).collect();
        assert_eq!(
            statuses,
            vec![
                VerdictStatus::NoMatch,
                VerdictStatus::Error,
                VerdictStatus::Error,
                VerdictStatus::NoMatch
            ]
        );
        assert_eq!(source.calls(), 2);
        assert_eq!(
            report.verdicts[1].error_detail,
            Some(vec!["name must be a single word without spaces".to_string()])
        );
        assert!(report.verdicts[1].sources_queried.is_empty());
        assert_eq!(report.verdicts[2].nice_classes, vec!["20".to_string()]);
        assert_eq!(report.verdicts[2].regions, vec!["US".to_string()]);
        assert!(!report.all_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_oversized_batch() {
        let source = ScriptedSource::returning("a", &[], 0);
        let runner = runner(vec![source.clone()]).with_max_batch_size(2);

        let err = runner
            .run(&["a", "b", "c"], &classes(), &regions())
            .await
            .unwrap_err();
        assert_eq!(err, BatchError::TooMany { count: 3, max: 2 });
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_batch_is_rejected_while_busy() {
        let slow = Arc::new(
            ScriptedSource::new("a", SourceResult::no_results("a"))
                .with_latency(Duration::from_secs(10)),
        );
        let runner = Arc::new(runner(vec![slow.clone()]));

        let first = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run(&["monica"], &classes(), &regions()).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let second = runner.run(&["nova"], &classes(), &regions()).await;
        assert_eq!(second.unwrap_err(), BatchError::Busy);

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.verdicts.len(), 1);
        assert_eq!(slow.seen(), vec!["monica"]);

        // Released after the first batch completes
        let third = runner.run(&["nova"], &classes(), &regions()).await;
        assert!(third.is_ok());
    }

    // The only test that takes the process-wide lock.
    #[tokio::test(start_paused = true)]
    async fn test_runners_from_config_share_one_lock() {
        let config = CheckerConfig {
            stale_lock_after: Duration::from_secs(600),
            ..CheckerConfig::default()
        };
        let slow = Arc::new(
            ScriptedSource::new("a", SourceResult::no_results("a"))
                .with_latency(Duration::from_secs(10)),
        );
        let first = Arc::new(BatchRunner::from_config(
            &config,
            orchestrator(vec![slow.clone()], Shutdown::never()),
        ));
        let second = BatchRunner::from_config(
            &config,
            orchestrator(vec![slow.clone()], Shutdown::never()),
        );
        assert_eq!(SingleFlight::global().stale_after(), Duration::from_secs(600));

        let running = tokio::spawn({
            let first = first.clone();
            async move { first.run(&["monica"], &classes(), &regions()).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let rejected = second.run(&["nova"], &classes(), &regions()).await;
        assert_eq!(rejected.unwrap_err(), BatchError::Busy);
        assert_eq!(slow.seen(), vec!["monica"]);

        running.await.unwrap().unwrap();
        assert!(!SingleFlight::global().is_held());
        assert!(second.run(&["nova"], &classes(), &regions()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ceiling_is_adjustable() {
        let flight = Arc::new(SingleFlight::new(Duration::from_secs(300)));
        let _held = flight.try_acquire().unwrap();
        flight.set_stale_after(Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(flight.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_lock_is_reset() {
        let flight = Arc::new(SingleFlight::new(Duration::from_secs(300)));
        let stale = flight.try_acquire().unwrap();
        assert_eq!(flight.try_acquire().unwrap_err(), BatchError::Busy);

        tokio::time::advance(Duration::from_secs(301)).await;
        let fresh = flight.try_acquire().unwrap();

        // The stale holder finishing late must not free the new holder's lock
        drop(stale);
        assert!(flight.is_held());
        drop(fresh);
        assert!(!flight.is_held());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failed_summary() {
        let source = ScriptedSource::failing("a");
        let runner = runner(vec![source]);

        let report = runner
            .run(&["monica", "nova"], &classes(), &regions())
            .await
            .unwrap();
        assert!(report.all_failed());
        assert!(report.failure_summary().unwrap().starts_with("All 2 queries failed"));
        assert_eq!(report.count(VerdictStatus::Error), 2);

        let no_names: Vec<String> = Vec::new();
        let empty = runner
            .run(&no_names[..], &classes(), &regions())
            .await
            .unwrap();
        assert!(!empty.all_failed());
        assert!(empty.failure_summary().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_between_names() {
        let (tx, shutdown) = Shutdown::channel();
        let source = Arc::new(
            ScriptedSource::new("a", SourceResult::no_results("a"))
                .with_latency(Duration::from_secs(5)),
        );
        let runner = runner_with(vec![source.clone()], shutdown);

        let classes = classes();
        let regions = regions();
        let run = runner.run(&["monica", "nova", "luna"], &classes, &regions);
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(true).unwrap();
        };
        let (report, _) = tokio::join!(run, cancel);
        let report = report.unwrap();

        // The in-flight name completes; the rest are reported as cancelled
        assert_eq!(report.verdicts.len(), 3);
        assert_eq!(report.verdicts[0].status, VerdictStatus::NoMatch);
        assert_eq!(report.verdicts[1].status, VerdictStatus::Error);
        assert_eq!(report.verdicts[2].status, VerdictStatus::Error);
        assert_eq!(
            report.verdicts[2].error_detail,
            Some(vec!["cancelled before the check started".to_string()])
        );
        assert_eq!(report.verdicts[2].nice_classes, vec!["20".to_string()]);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_raw_rejects_empty_sets() {
        let runner = runner(vec![ScriptedSource::returning("a", &[], 0)]);
        let empty: [&str; 0] = [];
        let err = runner.run_raw(&["nova"], &empty, &["US"]).await;
        assert!(matches!(err, Err(BatchError::InvalidQuery(QueryError::NoNiceClasses))));
    }
}
