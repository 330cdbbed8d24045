//! Query fingerprints
//!
//! Every insert and lookup goes through [`fingerprint`]; two queries share a
//! cache slot exactly when their fingerprints are equal.

/// Normalize a query into its lookup key: trimmed, case-folded, with runs of
/// whitespace collapsed to a single space.
pub fn fingerprint(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
