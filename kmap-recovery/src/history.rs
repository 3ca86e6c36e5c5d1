//! Bounded window of validation results
//!
//! Results are kept sorted by timestamp. Rotation drops entries older than
//! `max_age_days` and then trims to the newest `max_entries`. Analysis works
//! on immutable snapshots so rotation never races a running detector.
//!
//! Besides summary statistics the window reports issue categories and
//! recent-versus-earlier trends, see [`crate::trends`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::HistoryConfig;
use crate::error::Result;
use crate::trends::{IssueCategory, TrendReport, category_counts};
use crate::types::ValidationResult;

/// Summary statistics over the current window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub failed: usize,
    /// Failed share of all results, 0 when empty
    pub failure_rate: f64,
    pub average_confidence: Option<f64>,
    /// Most frequent issue texts with their counts
    pub common_issues: Vec<(String, usize)>,
}

/// Issue categories across the window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    pub categories: BTreeMap<IssueCategory, usize>,
    pub total_validations: usize,
    pub failed_validations: usize,
}

/// Health overview of the window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    /// Mean confidence within the requested time window
    pub average_confidence: Option<f64>,
    pub failure_rate: f64,
    pub categories: BTreeMap<IssueCategory, usize>,
    pub common_issues: Vec<(String, usize)>,
}

#[derive(Debug, Clone)]
pub struct ValidationHistory {
    config: HistoryConfig,
    results: Vec<ValidationResult>,
}

impl ValidationHistory {
    pub fn new(config: HistoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            results: Vec::new(),
        })
    }

    /// Build a window from existing results without rotating
    pub fn from_results(
        config: HistoryConfig,
        results: impl IntoIterator<Item = ValidationResult>,
    ) -> Result<Self> {
        let mut history = Self::new(config)?;
        for result in results {
            history.insert_sorted(result);
        }
        Ok(history)
    }

    /// Add a result and rotate relative to the current time
    pub fn add_result(&mut self, result: ValidationResult) {
        self.insert_sorted(result);
        let rotated = self.rotate(Utc::now());
        if !rotated.is_empty() {
            debug!(rotated = rotated.len(), "Rotated validation history");
        }
    }

    fn insert_sorted(&mut self, result: ValidationResult) {
        let at = self
            .results
            .partition_point(|r| r.timestamp <= result.timestamp);
        self.results.insert(at, result);
    }

    /// Drop entries older than `max_age_days` before `now`, then all but the
    /// newest `max_entries`. Returns the removed entries, oldest first.
    pub fn rotate(&mut self, now: DateTime<Utc>) -> Vec<ValidationResult> {
        let cutoff = TimeDelta::try_days(i64::from(self.config.max_age_days))
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let expired = self.results.partition_point(|r| r.timestamp < cutoff);
        let mut removed: Vec<ValidationResult> = self.results.drain(..expired).collect();

        if self.results.len() > self.config.max_entries {
            let excess = self.results.len() - self.config.max_entries;
            removed.extend(self.results.drain(..excess));
        }
        removed
    }

    /// Immutable copy of the window, oldest first
    pub fn snapshot(&self) -> Arc<[ValidationResult]> {
        Arc::from(self.results.as_slice())
    }

    pub fn results(&self) -> &[ValidationResult] {
        &self.results
    }

    /// Mean confidence, optionally only over results within `window` of now
    pub fn average_confidence(&self, window: Option<TimeDelta>) -> Option<f64> {
        let cutoff = window.map(|w| Utc::now() - w);
        let scores: Vec<f64> = self
            .results
            .iter()
            .filter(|r| cutoff.is_none_or(|c| r.timestamp >= c))
            .map(|r| r.confidence_score)
            .collect();

        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    /// The `limit` most frequent issue texts, by count then text
    pub fn common_issues(&self, limit: usize) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for issue in self.results.iter().flat_map(|r| &r.issues) {
            *counts.entry(issue.as_str()).or_default() += 1;
        }

        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(issue, count)| (issue.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    pub fn stats(&self, common_limit: usize) -> HistoryStats {
        let total = self.results.len();
        let failed = self.results.iter().filter(|r| !r.is_valid).count();
        HistoryStats {
            total,
            failed,
            failure_rate: if total == 0 {
                0.0
            } else {
                failed as f64 / total as f64
            },
            average_confidence: self.average_confidence(None),
            common_issues: self.common_issues(common_limit),
        }
    }

    /// Issue counts per category with validation totals
    pub fn issue_categories(&self) -> CategoryBreakdown {
        CategoryBreakdown {
            categories: category_counts(
                self.results
                    .iter()
                    .flat_map(|r| r.issues.iter().map(String::as_str)),
            ),
            total_validations: self.results.len(),
            failed_validations: self.results.iter().filter(|r| !r.is_valid).count(),
        }
    }

    /// Categories, failure rate and common issues, with confidence averaged
    /// over results within `window` of now
    pub fn trend_summary(&self, window: Option<TimeDelta>, common_limit: usize) -> TrendSummary {
        let breakdown = self.issue_categories();
        let failure_rate = if breakdown.total_validations == 0 {
            0.0
        } else {
            breakdown.failed_validations as f64 / breakdown.total_validations as f64
        };
        TrendSummary {
            average_confidence: self.average_confidence(window),
            failure_rate,
            categories: breakdown.categories,
            common_issues: self.common_issues(common_limit),
        }
    }

    /// Compare the newest `trend_window` results with everything before them.
    ///
    /// Needs at least twice `trend_window` results; otherwise every trend is
    /// reported as insufficient data.
    pub fn detect_trends(&self) -> TrendReport {
        let window = self.config.trend_window;
        if self.results.len() < window * 2 {
            return TrendReport::insufficient();
        }

        let (historical, recent) = self.results.split_at(self.results.len() - window);
        let report = TrendReport::compare(recent, historical, self.config.trend_threshold);
        if !report.alerts.is_empty() {
            debug!(alerts = report.alerts.len(), "Validation trends detected");
        }
        report
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }
}
