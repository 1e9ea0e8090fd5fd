//! Plain-text rendering of verdicts for the CLI.

use std::fmt::Write;

use crate::types::{MatchVerdict, VerdictStatus};

/// Groups names by status, one heading per non-empty group.
pub fn summarize(verdicts: &[MatchVerdict]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Checked {} names", verdicts.len());

    for status in VerdictStatus::SUMMARY_ORDER {
        let group: Vec<&MatchVerdict> = verdicts.iter().filter(|v| v.status == status).collect();
        if group.is_empty() {
            continue;
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "{} ({}): {}", status, group.len(), status.message());
        for verdict in group {
            match status {
                VerdictStatus::NeedsReview => {
                    let _ = writeln!(
                        out,
                        "  - {} (found {}, displayed {})",
                        verdict.candidate, verdict.total_found, verdict.total_displayed
                    );
                }
                VerdictStatus::Error => {
                    let reason = verdict
                        .error_detail
                        .as_ref()
                        .and_then(|errors| errors.first())
                        .map(String::as_str)
                        .unwrap_or("unknown error");
                    let _ = writeln!(out, "  - {}: {}", verdict.candidate, reason);
                }
                _ => {
                    let _ = writeln!(out, "  - {}", verdict.candidate);
                }
            }
        }
    }

    out
}

pub fn detail(verdict: &MatchVerdict) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", verdict.candidate);
    let _ = writeln!(out, "  Status: {} - {}", verdict.status, verdict.status.message());

    if !verdict.nice_classes.is_empty() {
        let classes: Vec<String> = verdict
            .nice_classes
            .iter()
            .map(|code| format!("{} ({})", code, crate::types::nice_class_description(code)))
            .collect();
        let _ = writeln!(out, "  Classes: {}", classes.join(", "));
    }
    if !verdict.regions.is_empty() {
        let _ = writeln!(out, "  Regions: {}", verdict.regions.join(", "));
    }
    if !verdict.sources_queried.is_empty() {
        let _ = writeln!(out, "  Sources: {}", verdict.sources_queried.join(", "));
    }

    if verdict.total_found > 0 || !verdict.all_marks.is_empty() {
        let _ = writeln!(
            out,
            "  Marks: {} found, {} displayed",
            verdict.total_found, verdict.total_displayed
        );
        for mark in &verdict.all_marks {
            let _ = writeln!(out, "    {}", mark);
        }
    }

    if verdict.has_exact_match() {
        let _ = writeln!(out, "  Exact matches: {}", verdict.exact_matches.join(", "));
    }
    if verdict.has_similar_match() {
        let _ = writeln!(out, "  Similar matches: {}", verdict.similar_matches.join(", "));
    }

    if let Some(errors) = &verdict.error_detail {
        for error in errors {
            let _ = writeln!(out, "  Error: {}", error);
        }
    }

    out
}
