//! Input validation for operator-typed values.
//!
//! Statuses are resolved in three tiers per section: case-insensitive
//! exact match → synonym lookup → error with the closest suggestion.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::model::Section;

// ── Synonym map (typo and shorthand recovery) ───────────────

pub static STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("done", "Closed"),
        ("close", "Closed"),
        ("resolved", "Closed"),
        ("complete", "Closed"),
        ("completed", "Closed"),
        ("new", "Under Review"),
        ("open", "Under Review"),
        ("review", "Under Review"),
        ("reviewing", "Under Review"),
        ("escalate", "Escalated"),
        ("urgent", "Escalated"),
        ("pending", "Pending (Customer Call Required)"),
        ("call back", "Pending (Customer Call Required)"),
        ("callback", "Pending (Customer Call Required)"),
        ("pending (call back)", "Pending (Customer Call Required)"),
        ("used", "Taken"),
        ("redeemed", "Taken"),
        ("inactive", "Not Active"),
        ("expired", "Not Active"),
        ("to call", "Pending Call"),
        ("unanswered", "No Answer"),
        ("booked", "Scheduled"),
        ("problem", "Issue"),
        ("skip", "No Call Needed"),
        ("collected", "Returned"),
    ]
    .into_iter()
    .collect()
});

fn fold(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve an operator-typed status to one of `section`'s statuses.
///
/// # Errors
///
/// Returns `InvalidStatus`, with the closest valid status as a suggestion
/// when one is near enough.
pub fn normalize_status(section: Section, input: &str) -> Result<String> {
    let statuses = section.config().statuses;
    let folded = fold(input);

    // Tier 1: exact match, ignoring case and separators
    if let Some(&status) = statuses.iter().find(|s| fold(s) == folded) {
        return Ok(status.to_string());
    }

    // Tier 2: synonym, only if the target is valid here
    if let Some(&canonical) = STATUS_SYNONYMS.get(folded.as_str()) {
        if statuses.contains(&canonical) {
            return Ok(canonical.to_string());
        }
    }

    // Tier 3: closest suggestion
    Err(Error::InvalidStatus {
        section: section.to_string(),
        status: input.to_string(),
        suggestion: find_closest_status(section, &folded),
    })
}

fn find_closest_status(section: Section, folded: &str) -> Option<String> {
    let statuses = section.config().statuses;
    let mut best: Option<(&str, usize)> = None;

    let candidates = statuses.iter().map(|s| (fold(s), *s)).chain(
        STATUS_SYNONYMS
            .iter()
            .filter(|(_, canonical)| statuses.contains(canonical))
            .map(|(synonym, canonical)| ((*synonym).to_string(), *canonical)),
    );

    for (candidate, canonical) in candidates {
        let dist = levenshtein_distance(folded, &candidate);
        if dist <= 3 && best.is_none_or(|(_, d)| dist < d) {
            best = Some((canonical, dist));
        }
    }

    best.map(|(s, _)| s.to_string())
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let a_len = a.len();
    let b_len = b.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // Single-row optimization (O(min(m,n)) space)
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1) // deletion
                .min(curr[j - 1] + 1) // insertion
                .min(prev[j - 1] + cost); // substitution
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Find existing business keys similar to the searched one.
///
/// Returns up to `max` suggestions with edit distance ≤ 3,
/// sorted by distance then alphabetically.
#[must_use]
pub fn find_similar_keys(searched: &str, existing: &[String], max: usize) -> Vec<String> {
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|key| (levenshtein_distance(searched, key), key.as_str()))
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max)
        .map(|(_, key)| key.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_ignores_case_and_separators() {
        assert_eq!(normalize_status(Section::Ce, "closed").unwrap(), "Closed");
        assert_eq!(
            normalize_status(Section::Ce, "under-review").unwrap(),
            "Under Review"
        );
        assert_eq!(
            normalize_status(Section::TimeTable, "NO_ANSWER").unwrap(),
            "No Answer"
        );
    }

    #[test]
    fn test_synonyms_respect_section() {
        assert_eq!(normalize_status(Section::Ce, "done").unwrap(), "Closed");
        assert_eq!(
            normalize_status(Section::Complaints, "call back").unwrap(),
            "Pending (Customer Call Required)"
        );
        assert_eq!(normalize_status(Section::FreeOrders, "used").unwrap(), "Taken");
        // cctv has no pending status
        assert!(normalize_status(Section::Cctv, "pending").is_err());
    }

    #[test]
    fn test_unknown_status_suggests_closest() {
        let err = normalize_status(Section::Ce, "Escalted").unwrap_err();
        match err {
            Error::InvalidStatus { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("Escalated"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = normalize_status(Section::Ce, "zzzzzzzz").unwrap_err();
        assert!(matches!(err, Error::InvalidStatus { suggestion: None, .. }));
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", "abd"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_find_similar_keys() {
        let keys = vec![
            "CE-01001".to_string(),
            "CE-01002".to_string(),
            "CCTV-4".to_string(),
        ];
        let result = find_similar_keys("CE-01003", &keys, 3);
        assert_eq!(result, vec!["CE-01001".to_string(), "CE-01002".to_string()]);
    }
}
