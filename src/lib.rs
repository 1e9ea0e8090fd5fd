pub mod batch;
pub mod config;
pub mod environment;
pub mod local_store;
pub mod logging;
pub mod matching;
pub mod orchestrator;
pub mod rate_limiter;
pub mod report;
pub mod shutdown;
pub mod sources;
pub mod types;
pub mod validator;

#[cfg(test)]
mod testing;

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_SOURCE: &str = "source";
pub const TARGET_BATCH: &str = "batch";
pub const TARGET_LOCAL_STORE: &str = "local_store";

pub use batch::{BatchError, BatchReport, BatchRunner};
pub use config::CheckerConfig;
pub use local_store::LocalKnowledgeStore;
pub use orchestrator::QueryOrchestrator;
pub use rate_limiter::RateLimiter;
pub use shutdown::Shutdown;
pub use sources::{SourceClient, SourceId};
pub use types::{MatchVerdict, NiceClassSet, RegionSet, SourceOutcome, SourceResult, VerdictStatus};
pub use validator::{CandidateName, NamePolicy, NameValidator, ValidationError};
