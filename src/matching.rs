//! Classification of competitor marks against a candidate name.
//!
//! Both classifiers tokenize a mark on whitespace and compare lower-cased
//! tokens against the lower-cased candidate. They are independent: a mark
//! such as "cat cot" is an exact match and a similar match at the same time.

use std::collections::HashSet;
use strsim::hamming;

use crate::validator::CandidateName;

/// Marks containing the candidate as a whole word.
///
/// "cat" matches "the cat sat" and "CAT" but never "catch".
pub fn exact_matches<S: AsRef<str>>(candidate: &CandidateName, marks: &[S]) -> Vec<String> {
    let needle = candidate.folded();
    collect_unique(marks, |token| token == needle)
}

/// Marks containing a same-length word exactly one substitution away from the candidate.
///
/// Words of a different length are never compared, so "cats" is not similar to "cat".
pub fn similar_matches<S: AsRef<str>>(candidate: &CandidateName, marks: &[S]) -> Vec<String> {
    let needle = candidate.folded();
    let needle_len = needle.chars().count();
    collect_unique(marks, |token| {
        token.chars().count() == needle_len && matches!(hamming(token, &needle), Ok(1))
    })
}

/// Keeps each mark that has at least one qualifying token, once, in first-seen order.
fn collect_unique<S, F>(marks: &[S], token_matches: F) -> Vec<String>
where
    S: AsRef<str>,
    F: Fn(&str) -> bool,
{
    let mut seen = HashSet::new();
    let mut matched = Vec::new();

    for mark in marks {
        let mark = mark.as_ref();
        let hit = mark
            .split_whitespace()
            .map(str::to_lowercase)
            .any(|token| token_matches(&token));

        if hit && seen.insert(mark.to_string()) {
            matched.push(mark.to_string());
        }
    }

    matched
}
