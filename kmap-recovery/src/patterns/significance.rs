//! Pattern significance scoring
//!
//! Scores are pure functions of a candidate's statistics, in [0, 1], and
//! non-decreasing in occurrence count. Detectors attach the score but never
//! filter on it.

/// Statistics of a candidate pattern before it becomes a [`crate::Pattern`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatternCandidate {
    Semantic {
        /// Issue occurrences in the cluster
        occurrences: usize,
        /// Issue occurrences in the analyzed window
        total_occurrences: usize,
        /// Mean pairwise similarity in [0, 1]
        average_similarity: f64,
    },
    Temporal {
        /// Non-overlapping matching windows
        occurrences: usize,
        sequence_length: usize,
        /// Issues in the analyzed stream
        stream_length: usize,
        /// Occurrences per hour
        temporal_density: f64,
        /// Configured minimum repeats
        min_occurrences: usize,
    },
}

/// Score a candidate pattern
pub fn score(candidate: &PatternCandidate) -> f64 {
    let raw = match *candidate {
        PatternCandidate::Semantic {
            occurrences,
            total_occurrences,
            average_similarity,
        } => {
            let coverage = ratio(2 * occurrences, total_occurrences).min(1.0);
            0.5 * coverage + 0.5 * finite_or_zero(average_similarity).clamp(0.0, 1.0)
        }
        PatternCandidate::Temporal {
            occurrences,
            sequence_length,
            stream_length,
            temporal_density,
            min_occurrences,
        } => {
            let coverage = ratio(occurrences * sequence_length, stream_length).min(1.0);
            let frequency = ratio(occurrences, occurrences + min_occurrences);
            let density = finite_or_zero(temporal_density).max(0.0);
            let density_factor = density / (density + 1.0);
            (coverage + frequency + density_factor) / 3.0
        }
    };

    finite_or_zero(raw).clamp(0.0, 1.0)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
