//! National office search (USPTO trademark search API).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::client::post_json;
use super::{SourceClient, USPTO_SOURCE};
use crate::types::{NiceClassSet, RegionSet, SourceResult};
use crate::validator::CandidateName;
use crate::TARGET_SOURCE;

const USPTO_URL: &str = "https://tmsearch.uspto.gov/api-v1-0-0/tmsearch";
const RESULT_SIZE: u32 = 200;

pub struct UsptoClient {
    http: reqwest::Client,
    url: String,
}

impl UsptoClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            url: USPTO_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    async fn fetch(&self, candidate: &CandidateName, nice_classes: &NiceClassSet) -> Result<SourceResult> {
        let payload = build_payload(candidate, nice_classes);
        let headers = [
            ("Origin", "https://tmsearch.uspto.gov"),
            ("Referer", "https://tmsearch.uspto.gov/search/search-results"),
        ];
        let body = post_json(&self.http, &self.url, &headers, &payload).await?;
        parse_response(&body)
    }
}

#[async_trait]
impl SourceClient for UsptoClient {
    fn id(&self) -> &str {
        USPTO_SOURCE
    }

    async fn search(
        &self,
        candidate: &CandidateName,
        nice_classes: &NiceClassSet,
        regions: &RegionSet,
    ) -> SourceResult {
        if !regions.contains("US") {
            warn!(target: TARGET_SOURCE, "USPTO only covers US marks; queried regions were {:?}", regions.iter().collect::<Vec<_>>());
        }

        info!(target: TARGET_SOURCE, "Querying USPTO for {}", candidate);
        match self.fetch(candidate, nice_classes).await {
            Ok(result) => {
                info!(target: TARGET_SOURCE, "USPTO reported {} results for {}", result.total_count, candidate);
                result
            }
            Err(err) => {
                error!(target: TARGET_SOURCE, "USPTO query for {} failed: {:#}", candidate, err);
                SourceResult::failed(USPTO_SOURCE, format!("{:#}", err))
            }
        }
    }
}

/// International class codes as the API indexes them: `"20"` becomes `"020"`.
pub fn format_class(code: &str) -> String {
    if code.chars().all(|c| c.is_ascii_digit()) {
        format!("{:0>3}", code)
    } else {
        code.to_string()
    }
}

pub fn build_payload(candidate: &CandidateName, nice_classes: &NiceClassSet) -> Value {
    let classes: Vec<String> = nice_classes.iter().map(format_class).collect();
    let name = candidate.as_str();

    json!({
        "query": {
            "bool": {
                "must": [{
                    "bool": {
                        "should": [
                            {"match_phrase": {"WM": {"query": name, "boost": 5}}},
                            {"match": {"WM": {"query": name, "boost": 2}}},
                            {"match_phrase": {"PM": {"query": name, "boost": 2}}}
                        ]
                    }
                }],
                "filter": [
                    {"term": {"LD": "true"}},
                    {"terms": {"IC": classes}}
                ]
            }
        },
        "size": RESULT_SIZE,
        "from": 0,
        "track_total_hits": true,
        "_source": ["wordmark"]
    })
}

pub fn parse_response(body: &Value) -> Result<SourceResult> {
    let hits = body
        .get("hits")
        .ok_or_else(|| anyhow!("Response has no 'hits' object"))?;

    let total = hits
        .get("totalValue")
        .and_then(Value::as_u64)
        .or_else(|| hits.pointer("/total/value").and_then(Value::as_u64))
        .unwrap_or(0);

    let marks: Vec<String> = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|hit| {
                    hit.pointer("/source/wordmark")
                        .or_else(|| hit.pointer("/_source/wordmark"))
                        .and_then(Value::as_str)
                })
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(SourceResult::ok(USPTO_SOURCE, marks, total))
}
