//! Shared query and verdict types.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

/// Human-readable descriptions for the Nice classes the checker is usually run against.
pub static NICE_CLASS_DESCRIPTIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("14", "Precious metals and their alloys, jewellery, clocks"),
        ("20", "Furniture, mirrors, picture frames"),
        ("21", "Household or kitchen utensils and containers"),
    ])
});

pub fn nice_class_description(code: &str) -> &'static str {
    NICE_CLASS_DESCRIPTIONS
        .get(code)
        .copied()
        .unwrap_or("unknown class")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("at least one nice class is required")]
    NoNiceClasses,
    #[error("at least one region is required")]
    NoRegions,
}

/// Non-empty set of Nice classification codes narrowing a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NiceClassSet(BTreeSet<String>);

impl NiceClassSet {
    pub fn new<I, S>(codes: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let codes: BTreeSet<String> = codes
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if codes.is_empty() {
            return Err(QueryError::NoNiceClasses);
        }
        Ok(Self(codes))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Codes with their descriptions, e.g. `20 - Furniture, mirrors, picture frames`.
    pub fn describe(&self) -> Vec<String> {
        self.iter()
            .map(|code| format!("{} - {}", code, nice_class_description(code)))
            .collect()
    }
}

/// Non-empty set of jurisdiction identifiers (`US`, `GB`, `EM`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RegionSet(BTreeSet<String>);

impl RegionSet {
    pub fn new<I, S>(regions: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let regions: BTreeSet<String> = regions
            .into_iter()
            .map(|r| r.as_ref().trim().to_ascii_uppercase())
            .filter(|r| !r.is_empty())
            .collect();
        if regions.is_empty() {
            return Err(QueryError::NoRegions);
        }
        Ok(Self(regions))
    }

    pub fn contains(&self, region: &str) -> bool {
        self.0.contains(&region.trim().to_ascii_uppercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceOutcome {
    Ok,
    NoResults,
    Failed,
}

/// Normalized outcome of one registry call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceResult {
    pub source_id: String,
    pub outcome: SourceOutcome,
    pub marks: Vec<String>,
    pub total_count: u64,
    pub error: Option<String>,
}

impl SourceResult {
    /// Successful call. Empty marks are dropped; nothing left and a zero total is `NoResults`.
    pub fn ok<I, S>(source_id: &str, marks: I, total_count: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let marks: Vec<String> = marks
            .into_iter()
            .map(Into::into)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        let outcome = if marks.is_empty() && total_count == 0 {
            SourceOutcome::NoResults
        } else {
            SourceOutcome::Ok
        };
        Self {
            source_id: source_id.to_string(),
            outcome,
            marks,
            total_count,
            error: None,
        }
    }

    pub fn no_results(source_id: &str) -> Self {
        Self::ok(source_id, Vec::<String>::new(), 0)
    }

    pub fn failed(source_id: &str, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            outcome: SourceOutcome::Failed,
            marks: Vec::new(),
            total_count: 0,
            error: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == SourceOutcome::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerdictStatus {
    ExactMatch,
    SimilarMatch,
    NoMatch,
    NeedsReview,
    LocalMatch,
    Error,
}

impl VerdictStatus {
    /// Order in which the summary lists status groups.
    pub const SUMMARY_ORDER: [VerdictStatus; 6] = [
        VerdictStatus::LocalMatch,
        VerdictStatus::ExactMatch,
        VerdictStatus::SimilarMatch,
        VerdictStatus::NoMatch,
        VerdictStatus::NeedsReview,
        VerdictStatus::Error,
    ];

    pub fn message(&self) -> &'static str {
        match self {
            VerdictStatus::LocalMatch => "This name has been checked before",
            VerdictStatus::ExactMatch => "An exact match exists",
            VerdictStatus::SimilarMatch => "A similar mark exists (one letter apart)",
            VerdictStatus::NoMatch => "No matching or similar marks found",
            VerdictStatus::NeedsReview => "Needs manual review",
            VerdictStatus::Error => "Query failed",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictStatus::ExactMatch => write!(f, "EXACT_MATCH"),
            VerdictStatus::SimilarMatch => write!(f, "SIMILAR_MATCH"),
            VerdictStatus::NoMatch => write!(f, "NO_MATCH"),
            VerdictStatus::NeedsReview => write!(f, "NEEDS_REVIEW"),
            VerdictStatus::LocalMatch => write!(f, "LOCAL_MATCH"),
            VerdictStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Aggregate result for one candidate name.
#[derive(Debug, Clone, Serialize)]
pub struct MatchVerdict {
    pub candidate: String,
    pub status: VerdictStatus,
    pub exact_matches: Vec<String>,
    pub similar_matches: Vec<String>,
    /// Deduplicated union of marks across queried sources, sorted.
    pub all_marks: Vec<String>,
    /// Sum of registry-reported totals; not deduplicated.
    pub total_found: u64,
    pub total_displayed: usize,
    pub sources_queried: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<Vec<String>>,
    pub nice_classes: Vec<String>,
    pub regions: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl MatchVerdict {
    /// Verdict for a name that never reached any source.
    pub fn rejected(candidate: &str, reason: impl Into<String>) -> Self {
        Self {
            candidate: candidate.trim().to_string(),
            status: VerdictStatus::Error,
            exact_matches: Vec::new(),
            similar_matches: Vec::new(),
            all_marks: Vec::new(),
            total_found: 0,
            total_displayed: 0,
            sources_queried: Vec::new(),
            error_detail: Some(vec![reason.into()]),
            nice_classes: Vec::new(),
            regions: Vec::new(),
            checked_at: Utc::now(),
        }
    }

    /// Records the classes and regions the name was submitted with.
    pub fn with_query(mut self, nice_classes: &NiceClassSet, regions: &RegionSet) -> Self {
        self.nice_classes = nice_classes.iter().map(str::to_string).collect();
        self.regions = regions.iter().map(str::to_string).collect();
        self
    }

    pub fn has_exact_match(&self) -> bool {
        !self.exact_matches.is_empty()
    }

    pub fn has_similar_match(&self) -> bool {
        !self.similar_matches.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.status == VerdictStatus::Error
    }
}
