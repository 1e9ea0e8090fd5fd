//! Registry clients and the uniform interface the orchestrator queries them through.
//!
//! A client only fetches and parses. Rate limiting and retry are applied by the
//! orchestrator around every `search` call.

mod client;
mod retry;
mod tmview;
mod uspto;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{NiceClassSet, RegionSet, SourceResult};
use crate::validator::CandidateName;

pub use self::client::{create_http_client, post_json, REQUEST_TIMEOUT};
pub use self::retry::{search_with_retry, RetryOutcome, RetryPolicy};
pub use self::tmview::TmviewClient;
pub use self::uspto::UsptoClient;

/// Identifier of a registry, used for rate limiting and in verdicts.
pub type SourceId = String;

pub const LOCAL_SOURCE: &str = "local";
pub const TMDN_SOURCE: &str = "tmdn";
pub const USPTO_SOURCE: &str = "uspto";

#[async_trait]
pub trait SourceClient: Send + Sync {
    fn id(&self) -> &str;

    /// Queries the registry. Every fault is reported as a `Failed` result, never raised.
    async fn search(
        &self,
        candidate: &CandidateName,
        nice_classes: &NiceClassSet,
        regions: &RegionSet,
    ) -> SourceResult;
}

/// Builds the configured registries in query order.
pub fn build_sources(order: &[String]) -> Result<Vec<Arc<dyn SourceClient>>> {
    let http = create_http_client(true)?;
    let mut sources: Vec<Arc<dyn SourceClient>> = Vec::with_capacity(order.len());

    for id in order {
        match id.trim().to_ascii_lowercase().as_str() {
            TMDN_SOURCE => sources.push(Arc::new(TmviewClient::new(http.clone()))),
            USPTO_SOURCE => sources.push(Arc::new(UsptoClient::new(http.clone()))),
            LOCAL_SOURCE => bail!("'local' is always consulted first and cannot be ordered"),
            other => bail!("Unknown source '{}', expected one of: tmdn, uspto", other),
        }
    }

    if sources.is_empty() {
        bail!("At least one source must be configured");
    }

    Ok(sources)
}
