//! Temporal pattern detection
//!
//! Flattens the history into a time-ordered stream of issues and looks for
//! windows whose issue multiset repeats. Order inside a window is ignored, so
//! `A, B` and `B, A` are the same sequence. Repeats are counted greedily left
//! to right without overlap.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::config::PatternConfig;
use crate::error::Result;
use crate::issue::issue_type;
use crate::types::{Pattern, PatternMetadata, PatternType, ValidationResult};

use super::significance::{PatternCandidate, score};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// One issue in the time-ordered stream
struct StreamIssue<'a> {
    /// Normalized issue type
    kind: String,
    text: &'a str,
    timestamp: DateTime<Utc>,
}

/// A multiset that repeats often enough to be a pattern
#[derive(Debug)]
struct Candidate {
    length: usize,
    /// Sorted issue types
    multiset: Vec<String>,
    /// Start index of each counted window
    windows: Vec<usize>,
}

impl Candidate {
    /// Whether `longer` covers the same occurrences: it repeats at least as
    /// often, every window of `self` lies inside one of its windows, and
    /// `self`'s multiset is contained in its multiset
    fn subsumed_by(&self, longer: &Candidate) -> bool {
        longer.length > self.length
            && longer.windows.len() >= self.windows.len()
            && is_sub_multiset(&self.multiset, &longer.multiset)
            && self.windows.iter().all(|&start| {
                longer
                    .windows
                    .iter()
                    .any(|&l| l <= start && start + self.length <= l + longer.length)
            })
    }

    /// Whether `self` is `shorter` repeated back to back, like `A B A B` for `A B`
    fn repeats(&self, shorter: &Candidate) -> bool {
        let k = self.length / shorter.length;
        k >= 2
            && self.length == k * shorter.length
            && self.multiset.len() == k * shorter.multiset.len()
            && shorter
                .multiset
                .iter()
                .flat_map(|kind| std::iter::repeat_n(kind, k))
                .eq(self.multiset.iter())
    }
}

/// Finds repeating issue sequences
pub struct TemporalDetector {
    config: PatternConfig,
}

impl TemporalDetector {
    pub fn new(config: PatternConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Detect temporal patterns in a history snapshot
    #[instrument(skip_all, fields(results = history.len()))]
    pub fn detect(&self, history: &[ValidationResult]) -> Vec<Pattern> {
        let min_len = self.config.min_sequence_length;
        let min_occ = self.config.min_sequence_occurrences;

        if history.len() < min_len {
            debug!("History shorter than minimum sequence length");
            return Vec::new();
        }

        let stream = build_stream(history);
        let max_len = self.config.max_sequence_length.min(stream.len() / min_occ);
        if stream.len() < min_len || max_len < min_len {
            debug!(stream = stream.len(), "Issue stream too short to repeat");
            return Vec::new();
        }

        let mut candidates: Vec<Candidate> = (min_len..=max_len)
            .flat_map(|length| repeating_windows(&stream, length, min_occ))
            .collect();

        candidates.sort_by(|a, b| {
            b.length
                .cmp(&a.length)
                .then(a.windows[0].cmp(&b.windows[0]))
        });

        // Repeats of a shorter candidate still absorb partial windows but are
        // reported through the shorter candidate
        let kept: Vec<&Candidate> = candidates
            .iter()
            .filter(|candidate| !candidates.iter().any(|longer| candidate.subsumed_by(longer)))
            .filter(|candidate| !candidates.iter().any(|shorter| candidate.repeats(shorter)))
            .collect();

        let display = display_names(&stream);
        let patterns: Vec<Pattern> = kept
            .into_iter()
            .map(|c| self.build_pattern(&stream, &display, c))
            .collect();

        debug!(patterns = patterns.len(), "Temporal detection complete");
        patterns
    }

    fn build_pattern(
        &self,
        stream: &[StreamIssue<'_>],
        display: &HashMap<&str, &str>,
        candidate: &Candidate,
    ) -> Pattern {
        let length = candidate.length;
        let members = candidate
            .windows
            .iter()
            .flat_map(|&start| &stream[start..start + length]);

        let mut related = BTreeSet::new();
        let mut first_seen = DateTime::<Utc>::MAX_UTC;
        let mut last_seen = DateTime::<Utc>::MIN_UTC;
        for issue in members {
            related.insert(issue.text.to_string());
            first_seen = first_seen.min(issue.timestamp);
            last_seen = last_seen.max(issue.timestamp);
        }

        let first_window = candidate.windows[0];
        let sequence: Vec<&str> = stream[first_window..first_window + length]
            .iter()
            .map(|issue| display.get(issue.kind.as_str()).copied().unwrap_or(issue.text))
            .collect();

        let span_hours =
            ((last_seen - first_seen).num_milliseconds() as f64 / MILLIS_PER_HOUR).max(1.0);
        let occurrences = candidate.windows.len();
        let temporal_density = occurrences as f64 / span_hours;

        let significance = score(&PatternCandidate::Temporal {
            occurrences,
            sequence_length: length,
            stream_length: stream.len(),
            temporal_density,
            min_occurrences: self.config.min_sequence_occurrences,
        });

        Pattern {
            pattern_type: PatternType::Temporal,
            description: format!("Repeating sequence: {}", sequence.join(" -> ")),
            significance,
            occurrences,
            first_seen,
            last_seen,
            related_issues: related,
            metadata: PatternMetadata::Temporal {
                sequence_length: length,
                temporal_density,
            },
        }
    }
}

/// Flatten results into issues ordered by their result's timestamp.
///
/// The sort is stable, so results with equal timestamps keep input order.
fn build_stream(history: &[ValidationResult]) -> Vec<StreamIssue<'_>> {
    let mut ordered: Vec<&ValidationResult> = history.iter().collect();
    ordered.sort_by_key(|r| r.timestamp);

    ordered
        .into_iter()
        .flat_map(|r| {
            r.issues.iter().filter_map(move |text| {
                let kind = issue_type(text);
                (!kind.is_empty()).then_some(StreamIssue {
                    kind,
                    text,
                    timestamp: r.timestamp,
                })
            })
        })
        .collect()
}

/// First-observed original text for each issue type
fn display_names<'a>(stream: &'a [StreamIssue<'a>]) -> HashMap<&'a str, &'a str> {
    let mut names = HashMap::new();
    for issue in stream {
        names.entry(issue.kind.as_str()).or_insert(issue.text);
    }
    names
}

/// Multisets of `length` consecutive issues that repeat at least `min_occ`
/// times without overlap
fn repeating_windows(stream: &[StreamIssue<'_>], length: usize, min_occ: usize) -> Vec<Candidate> {
    let mut ids: HashMap<Vec<String>, usize> = HashMap::new();
    let mut found: Vec<Candidate> = Vec::new();
    let mut next_free: Vec<usize> = Vec::new();

    for start in 0..=stream.len() - length {
        let mut multiset: Vec<String> = stream[start..start + length]
            .iter()
            .map(|issue| issue.kind.clone())
            .collect();
        multiset.sort();

        let id = *ids.entry(multiset.clone()).or_insert_with(|| {
            found.push(Candidate {
                length,
                multiset,
                windows: Vec::new(),
            });
            next_free.push(0);
            found.len() - 1
        });

        if start >= next_free[id] {
            found[id].windows.push(start);
            next_free[id] = start + length;
        }
    }

    found
        .into_iter()
        .filter(|c| c.windows.len() >= min_occ)
        .collect()
}

/// Whether sorted `small` is contained in sorted `large` counting repeats
fn is_sub_multiset(small: &[String], large: &[String]) -> bool {
    let mut rest = large.iter();
    small
        .iter()
        .all(|item| rest.by_ref().any(|candidate| candidate == item))
}
