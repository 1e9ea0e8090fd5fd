//! Multi-office trademark database (TMview search API).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info};

use super::client::post_json;
use super::{SourceClient, TMDN_SOURCE};
use crate::types::{NiceClassSet, RegionSet, SourceResult};
use crate::validator::CandidateName;
use crate::TARGET_SOURCE;

const TMVIEW_URL: &str = "https://www.tmdn.org/tmview/api/search/results";
const PAGE_SIZE: u32 = 30;

/// Offices searched when the caller asks for the `EU` region.
const EU_OFFICES: [&str; 6] = ["EM", "FR", "DE", "ES", "IT", "BX"];

pub struct TmviewClient {
    http: reqwest::Client,
    url: String,
}

impl TmviewClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            url: TMVIEW_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    async fn fetch(
        &self,
        candidate: &CandidateName,
        nice_classes: &NiceClassSet,
        regions: &RegionSet,
    ) -> Result<SourceResult> {
        let payload = build_payload(candidate, nice_classes, regions);
        let headers = [
            ("Origin", "https://www.tmdn.org"),
            ("Referer", "https://www.tmdn.org/tmview/"),
        ];
        let body = post_json(&self.http, &self.url, &headers, &payload).await?;
        parse_response(&body)
    }
}

#[async_trait]
impl SourceClient for TmviewClient {
    fn id(&self) -> &str {
        TMDN_SOURCE
    }

    async fn search(
        &self,
        candidate: &CandidateName,
        nice_classes: &NiceClassSet,
        regions: &RegionSet,
    ) -> SourceResult {
        info!(target: TARGET_SOURCE, "Querying TMview for {}", candidate);
        match self.fetch(candidate, nice_classes, regions).await {
            Ok(result) => {
                info!(target: TARGET_SOURCE, "TMview reported {} results for {}", result.total_count, candidate);
                result
            }
            Err(err) => {
                error!(target: TARGET_SOURCE, "TMview query for {} failed: {:#}", candidate, err);
                SourceResult::failed(TMDN_SOURCE, format!("{:#}", err))
            }
        }
    }
}

/// Office codes for the requested regions; `EU` expands to the union office and major members.
pub fn offices_for(regions: &RegionSet) -> Vec<String> {
    let mut offices: Vec<String> = Vec::new();
    for region in regions.iter() {
        let expanded: Vec<&str> = match region {
            "EU" => EU_OFFICES.to_vec(),
            "UK" => vec!["GB"],
            other => vec![other],
        };
        for office in expanded {
            if !offices.iter().any(|o| o == office) {
                offices.push(office.to_string());
            }
        }
    }
    offices
}

pub fn build_payload(
    candidate: &CandidateName,
    nice_classes: &NiceClassSet,
    regions: &RegionSet,
) -> Value {
    json!({
        "page": "1",
        "pageSize": PAGE_SIZE.to_string(),
        "criteria": "C",
        "basicSearch": candidate.as_str(),
        "fOffices": offices_for(regions),
        "fNiceClass": nice_classes.iter().collect::<Vec<_>>(),
        "fTMStatus": ["Registered", "Filed"],
        "fields": ["tmName"],
    })
}

pub fn parse_response(body: &Value) -> Result<SourceResult> {
    let total = match body.get("totalResults") {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| anyhow!("totalResults is not a non-negative integer: {}", n))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow!("totalResults is not numeric: {:?}", s))?,
        Some(Value::Null) | None => 0,
        Some(other) => return Err(anyhow!("Unexpected totalResults value: {}", other)),
    };

    let marks: Vec<String> = body
        .get("tradeMarks")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|tm| tm.get("tmName").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(SourceResult::ok(TMDN_SOURCE, marks, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceOutcome;
    use crate::validator::NameValidator;

    #[test]
    fn test_payload_shape() {
        let candidate = NameValidator::default().validate("monica").unwrap();
        let classes = NiceClassSet::new(["20", "14"]).unwrap();
        let regions = RegionSet::new(["us", "eu"]).unwrap();

        let payload = build_payload(&candidate, &classes, &regions);
        assert_eq!(payload["basicSearch"], "monica");
        assert_eq!(payload["pageSize"], "30");
        assert_eq!(payload["fNiceClass"], json!(["14", "20"]));
        assert_eq!(
            payload["fOffices"],
            json!(["EM", "FR", "DE", "ES", "IT", "BX", "US"])
        );
        assert_eq!(payload["fTMStatus"], json!(["Registered", "Filed"]));
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "totalResults": 42,
            "tradeMarks": [
                {"tmName": "MONICA"},
                {"tmName": ""},
                {"applicant": "no name"},
                {"tmName": "Monica's Bakery"}
            ]
        });
        let result = parse_response(&body).unwrap();
        assert_eq!(result.outcome, SourceOutcome::Ok);
        assert_eq!(result.total_count, 42);
        assert_eq!(result.marks, vec!["MONICA".to_string(), "Monica's Bakery".to_string()]);
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        let result = parse_response(&json!({"totalResults": "0", "tradeMarks": []})).unwrap();
        assert_eq!(result.outcome, SourceOutcome::NoResults);

        assert!(parse_response(&json!({"totalResults": "many"})).is_err());
        assert!(parse_response(&json!({"totalResults": -3})).is_err());
    }
}
