//! Ordered strategy-selection rules
//!
//! Each rule inspects a [`FailureContext`] and either prescribes an action or
//! passes. [`RULES`] is evaluated in order and the first match wins; the last
//! rule always matches.

use crate::types::{
    Pattern, PatternMetadata, PatternType, RecoveryAction, RecoveryStrategy, ValidationResult,
};

/// Everything a rule may look at
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    pub result: &'a ValidationResult,
    /// Patterns detected over the validation history
    pub patterns: &'a [Pattern],
    pub critical_failure_threshold: f64,
    pub pattern_significance_threshold: f64,
}

impl<'a> FailureContext<'a> {
    /// Most significant pattern of `pattern_type` that matches the failure and
    /// reaches the significance threshold.
    ///
    /// Ties go to more occurrences, then to the earlier description.
    pub fn significant_match(&self, pattern_type: PatternType) -> Option<&'a Pattern> {
        self.patterns
            .iter()
            .filter(|p| p.pattern_type == pattern_type)
            .filter(|p| self.is_significant_match(p))
            .fold(None, |best: Option<&Pattern>, p| match best {
                Some(b) if !outranks(p, b) => Some(b),
                _ => Some(p),
            })
    }

    /// No significant pattern matches any of the failure's issues
    pub fn is_isolated(&self) -> bool {
        !self.patterns.iter().any(|p| self.is_significant_match(p))
    }

    fn is_significant_match(&self, pattern: &Pattern) -> bool {
        pattern.significance >= self.pattern_significance_threshold
            && pattern.matches_issues(&self.result.issues)
    }
}

fn outranks(candidate: &Pattern, current: &Pattern) -> bool {
    candidate
        .significance
        .total_cmp(&current.significance)
        .then(candidate.occurrences.cmp(&current.occurrences))
        .then(current.description.cmp(&candidate.description))
        .is_gt()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A strategy-selection rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryRule {
    /// High-confidence failure: revert to a known-good state
    CriticalFailure,
    /// The failure is part of a significant repeating sequence
    TemporalPattern,
    /// The failure resembles a significant cluster of issues
    SemanticPattern,
    /// Nothing significant relates to the failure
    Isolated,
    /// Catch-all: hand to a human
    Ambiguous,
}

/// Rules in evaluation order
pub const RULES: [RecoveryRule; 5] = [
    RecoveryRule::CriticalFailure,
    RecoveryRule::TemporalPattern,
    RecoveryRule::SemanticPattern,
    RecoveryRule::Isolated,
    RecoveryRule::Ambiguous,
];

impl RecoveryRule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CriticalFailure => "critical_failure",
            Self::TemporalPattern => "temporal_pattern",
            Self::SemanticPattern => "semantic_pattern",
            Self::Isolated => "isolated",
            Self::Ambiguous => "ambiguous",
        }
    }

    /// Prescribe an action if this rule applies
    pub fn evaluate(&self, ctx: &FailureContext<'_>) -> Option<RecoveryAction> {
        let result = ctx.result;
        if result.is_valid {
            return None;
        }

        match self {
            Self::CriticalFailure => (result.confidence_score >= ctx.critical_failure_threshold)
                .then(|| {
                    RecoveryAction::new(
                        RecoveryStrategy::Rollback,
                        format!(
                            "Critical failure with confidence {:.2}; roll back knowledge map",
                            result.confidence_score
                        ),
                    )
                    .with_priority(1)
                    .with_impact(1.0)
                }),

            Self::TemporalPattern => ctx.significant_match(PatternType::Temporal).map(|p| {
                RecoveryAction::new(
                    RecoveryStrategy::Revalidation,
                    format!("Revalidate content affected by {}", p.description),
                )
                .with_priority(2)
                .with_impact(round2(p.significance * 0.9))
                .with_metadata("pattern_type", p.pattern_type.as_str())
                .with_metadata("significance", p.significance)
                .with_metadata("occurrences", p.occurrences)
            }),

            Self::SemanticPattern => ctx.significant_match(PatternType::Semantic).map(|p| {
                let mut action = RecoveryAction::new(
                    RecoveryStrategy::IncrementalFix,
                    format!("Fix items matching {}", p.description),
                )
                .with_priority(2)
                .with_impact(round2(p.significance))
                .with_metadata("pattern_type", p.pattern_type.as_str())
                .with_metadata("significance", p.significance);
                if let PatternMetadata::Semantic {
                    cluster_size,
                    average_similarity,
                } = p.metadata
                {
                    action = action
                        .with_metadata("cluster_size", cluster_size)
                        .with_metadata("average_similarity", average_similarity);
                }
                action
            }),

            Self::Isolated => (!result.issues.is_empty() && ctx.is_isolated()).then(|| {
                RecoveryAction::new(
                    RecoveryStrategy::IncrementalFix,
                    format!("Fix isolated issues: {}", result.issues.join("; ")),
                )
                .with_priority(3)
                .with_impact(round2(result.confidence_score))
            }),

            Self::Ambiguous => Some(
                RecoveryAction::new(
                    RecoveryStrategy::ManualIntervention,
                    "Failure could not be classified; manual review required",
                )
                .with_priority(5)
                .with_impact(0.0),
            ),
        }
    }
}
