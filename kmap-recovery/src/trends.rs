//! Validation quality trends
//!
//! Issues are sorted into coarse categories, and the most recent results are
//! compared with the rest of the window. A metric counts as moving when the
//! small-sample corrected effect size (Hedges' g over the pooled standard
//! deviation) reaches the configured threshold.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ValidationResult;

/// Added to the pooled variance so constant series do not divide by zero
const VARIANCE_FLOOR: f64 = 0.001;

const COVERAGE_TERMS: [&str; 4] = ["coverage", "criterion", "missing", "incomplete"];
const SYSTEM_TERMS: [&str; 3] = ["error", "timeout", "failed"];

/// Coarse grouping of validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// Content pitched at the wrong technical level
    TechnicalLevel,
    /// Missing or incomplete content
    ContentCoverage,
    /// Validator failures rather than content problems
    SystemErrors,
    /// Everything else
    ImprovementSuggestions,
}

impl IssueCategory {
    pub const ALL: [IssueCategory; 4] = [
        Self::TechnicalLevel,
        Self::ContentCoverage,
        Self::SystemErrors,
        Self::ImprovementSuggestions,
    ];

    /// Categorize an issue by keyword, first match wins
    pub fn classify(issue: &str) -> Self {
        let lower = issue.to_lowercase();
        if lower.contains("technical level") {
            Self::TechnicalLevel
        } else if COVERAGE_TERMS.iter().any(|term| lower.contains(term)) {
            Self::ContentCoverage
        } else if SYSTEM_TERMS.iter().any(|term| lower.contains(term)) {
            Self::SystemErrors
        } else {
            Self::ImprovementSuggestions
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TechnicalLevel => "technical_level",
            Self::ContentCoverage => "content_coverage",
            Self::SystemErrors => "system_errors",
            Self::ImprovementSuggestions => "improvement_suggestions",
        }
    }

    /// Label used in alert text
    fn label(&self) -> &'static str {
        match self {
            Self::TechnicalLevel => "technical level issues",
            Self::ContentCoverage => "content coverage issues",
            Self::SystemErrors => "system error issues",
            Self::ImprovementSuggestions => "improvement suggestion issues",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count of issues per category, every category present
pub fn category_counts<'a>(
    issues: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<IssueCategory, usize> {
    let mut counts: BTreeMap<IssueCategory, usize> =
        IssueCategory::ALL.iter().map(|c| (*c, 0)).collect();
    for issue in issues {
        *counts.entry(IssueCategory::classify(issue)).or_default() += 1;
    }
    counts
}

/// Direction of a metric in recent results compared with earlier ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Too few results to compare
    InsufficientData,
    NoChange,
    Increasing,
    Decreasing,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient_data",
            Self::NoChange => "no_change",
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTrend {
    pub trend: Trend,
    /// Corrected effect size, when both samples were large enough
    pub effect_size: Option<f64>,
    pub alert: Option<String>,
}

impl MetricTrend {
    fn unchanged(effect_size: Option<f64>) -> Self {
        Self {
            trend: Trend::NoChange,
            effect_size,
            alert: None,
        }
    }
}

/// Compare `recent` values with `historical` ones.
///
/// Both samples need at least two values. The effect size is
/// `|mean_r - mean_h| / sqrt(pooled_variance + 0.001)` scaled by the Hedges
/// correction `1 - 3 / (4 (n_r + n_h) - 9)`.
pub fn metric_trend(
    recent: &[f64],
    historical: &[f64],
    threshold: f64,
    metric: &str,
) -> MetricTrend {
    let (n1, n2) = (recent.len(), historical.len());
    if n1 < 2 || n2 < 2 {
        return MetricTrend::unchanged(None);
    }

    let (mean1, var1) = mean_and_variance(recent);
    let (mean2, var2) = mean_and_variance(historical);
    let pooled = ((n1 - 1) as f64 * var1 + (n2 - 1) as f64 * var2) / (n1 + n2 - 2) as f64
        + VARIANCE_FLOOR;
    let correction = 1.0 - 3.0 / (4.0 * (n1 + n2) as f64 - 9.0);
    let effect_size = (mean1 - mean2).abs() / pooled.sqrt() * correction;

    if !effect_size.is_finite() || effect_size < threshold {
        return MetricTrend::unchanged(Some(effect_size));
    }

    let (trend, direction) = if mean1 > mean2 {
        (Trend::Increasing, "increase")
    } else {
        (Trend::Decreasing, "decrease")
    };
    MetricTrend {
        trend,
        effect_size: Some(effect_size),
        alert: Some(format!(
            "Significant {direction} in {metric} (effect={effect_size:.2})"
        )),
    }
}

/// Sample mean and unbiased variance; needs at least two values
fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance)
}

/// Per-result issue counts for one category
fn category_series<'a, I>(issue_lists: I, category: IssueCategory) -> Vec<f64>
where
    I: IntoIterator<Item = &'a [String]>,
{
    issue_lists
        .into_iter()
        .map(|issues| {
            issues
                .iter()
                .filter(|issue| IssueCategory::classify(issue) == category)
                .count() as f64
        })
        .collect()
}

/// Trends over a validation window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub confidence: Trend,
    pub failure_rate: Trend,
    pub issues: BTreeMap<IssueCategory, Trend>,
    /// Human-readable description of every significant change
    pub alerts: Vec<String>,
}

impl TrendReport {
    pub(crate) fn insufficient() -> Self {
        Self {
            confidence: Trend::InsufficientData,
            failure_rate: Trend::InsufficientData,
            issues: IssueCategory::ALL
                .iter()
                .map(|c| (*c, Trend::InsufficientData))
                .collect(),
            alerts: Vec::new(),
        }
    }

    /// Build a report from per-result series split into recent and earlier
    pub(crate) fn compare(
        recent: &[ValidationResult],
        historical: &[ValidationResult],
        threshold: f64,
    ) -> Self {
        let confidence = |results: &[ValidationResult]| -> Vec<f64> {
            results.iter().map(|r| r.confidence_score).collect()
        };
        let failures = |results: &[ValidationResult]| -> Vec<f64> {
            results
                .iter()
                .map(|r| if r.is_valid { 0.0 } else { 1.0 })
                .collect()
        };

        let mut alerts = Vec::new();
        let confidence_trend = metric_trend(
            &confidence(recent),
            &confidence(historical),
            threshold,
            "confidence score",
        );
        let failure_trend = metric_trend(
            &failures(recent),
            &failures(historical),
            threshold,
            "failure rate",
        );
        alerts.extend(confidence_trend.alert);
        alerts.extend(failure_trend.alert);

        let mut issues = BTreeMap::new();
        for category in IssueCategory::ALL {
            let trend = metric_trend(
                &category_series(recent.iter().map(|r| r.issues.as_slice()), category),
                &category_series(historical.iter().map(|r| r.issues.as_slice()), category),
                threshold,
                category.label(),
            );
            alerts.extend(trend.alert);
            issues.insert(category, trend.trend);
        }

        Self {
            confidence: confidence_trend.trend,
            failure_rate: failure_trend.trend,
            issues,
            alerts,
        }
    }
}
