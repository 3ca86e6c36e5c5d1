//! Issue normalization and fingerprinting
//!
//! Validation issues arrive as free text. Temporal detection compares issues by
//! their normalized *type*, and recovery history groups attempts by the
//! *issue class* of a failure (a fingerprint over its sorted issue types).

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Number of hash bytes kept in an issue class fingerprint
const ISSUE_CLASS_BYTES: usize = 8;

fn digit_runs() -> Option<&'static Regex> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()
}

fn trailing_punctuation() -> Option<&'static Regex> {
    static TRAILING: OnceLock<Option<Regex>> = OnceLock::new();
    TRAILING
        .get_or_init(|| Regex::new(r"[\s.!?;:,]+$").ok())
        .as_ref()
}

/// Normalize an issue description into its type key.
///
/// Trims, lower-cases, collapses whitespace, strips trailing punctuation and
/// replaces digit runs with `#`, so "Missing 3 examples." and
/// "missing 12 examples" share a type.
pub fn issue_type(issue: &str) -> String {
    let collapsed = issue
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let stripped = match trailing_punctuation() {
        Some(re) => re.replace(&collapsed, "").into_owned(),
        None => collapsed,
    };

    match digit_runs() {
        Some(re) => re.replace_all(&stripped, "#").into_owned(),
        None => stripped,
    }
}

/// Stable fingerprint of a set of issues.
///
/// Order and duplicates do not matter; the result is a 16-character hex string.
pub fn issue_class<I, S>(issues: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let types: BTreeSet<String> = issues
        .into_iter()
        .map(|issue| issue_type(issue.as_ref()))
        .collect();

    let mut hasher = Sha256::new();
    for ty in &types {
        hasher.update(ty.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..ISSUE_CLASS_BYTES])
}
