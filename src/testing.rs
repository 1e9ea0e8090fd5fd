//! Scripted registry doubles shared by unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::sources::SourceClient;
use crate::types::{NiceClassSet, RegionSet, SourceResult};
use crate::validator::{CandidateName, NameValidator};

/// Replays queued results in order; once the queue is empty it repeats the fallback.
pub struct ScriptedSource {
    id: String,
    script: Mutex<VecDeque<SourceResult>>,
    fallback: SourceResult,
    latency: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(id: &str, fallback: SourceResult) -> Self {
        Self {
            id: id.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(id: &str, marks: &[&str], total: u64) -> Arc<Self> {
        Arc::new(Self::new(id, SourceResult::ok(id, marks.iter().copied(), total)))
    }

    pub fn failing(id: &str) -> Arc<Self> {
        Arc::new(Self::new(id, SourceResult::failed(id, "HTTP error: 503 Service Unavailable")))
    }

    pub fn then(self, result: SourceResult) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Candidates this source was asked about, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(
        &self,
        candidate: &CandidateName,
        _nice_classes: &NiceClassSet,
        _regions: &RegionSet,
    ) -> SourceResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(candidate.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn candidate(name: &str) -> CandidateName {
    NameValidator::default().validate(name).unwrap()
}

pub fn classes() -> NiceClassSet {
    NiceClassSet::new(["20"]).unwrap()
}

pub fn regions() -> RegionSet {
    RegionSet::new(["US"]).unwrap()
}
