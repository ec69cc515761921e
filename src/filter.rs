//! Second-pass keyword filter and display cap.
//!
//! Upstream search matches loosely (stemming, fuzzy hits). With `strict` on, a result survives
//! only if the keyword appears verbatim, case-insensitively, in its title or body. This is a
//! plain substring test: no tokenization, no ranking, order preserved.

use crate::source::NormalizedResult;

/// Case-insensitive substring test against title and body.
pub fn matches(result: &NormalizedResult, keyword_lower: &str) -> bool {
    result.title.to_lowercase().contains(keyword_lower)
        || result.body_text.to_lowercase().contains(keyword_lower)
}

/// Identity when `strict` is false, otherwise a stable subsequence of matching results.
pub fn filter(
    mut results: Vec<NormalizedResult>,
    keyword: &str,
    strict: bool,
) -> Vec<NormalizedResult> {
    if !strict {
        return results;
    }
    let needle = keyword.to_lowercase();
    results.retain(|r| matches(r, &needle));
    results
}

/// Truncate to the display cap.
pub fn cap(mut results: Vec<NormalizedResult>, max: usize) -> Vec<NormalizedResult> {
    results.truncate(max);
    results
}
