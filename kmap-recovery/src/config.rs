//! Configuration types for pattern analysis and recovery.
//!
//! Every section deserializes from TOML with per-field defaults and is
//! validated eagerly: components refuse to construct from an invalid section.
//!
//! ```toml
//! [patterns]
//! eps = 0.5
//! min_samples = 2
//! min_sequence_length = 2
//! min_sequence_occurrences = 3
//!
//! [recovery]
//! critical_failure_threshold = 0.8
//! pattern_significance_threshold = 0.7
//! max_concurrent_recoveries = 3
//!
//! [history]
//! max_age_days = 30
//! max_entries = 1000
//! trend_window = 5
//! trend_threshold = 2.0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KmapError, Result};
use crate::patterns::DistanceMetric;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmapConfig {
    /// Pattern detection settings
    pub patterns: PatternConfig,
    /// Strategy selection and execution settings
    pub recovery: RecoveryConfig,
    /// Validation history window
    pub history: HistoryConfig,
}

impl KmapConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.patterns.validate()?;
        self.recovery.validate()?;
        self.history.validate()
    }
}

/// Configuration for semantic and temporal pattern detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Neighborhood radius for density clustering
    pub eps: f32,
    /// Minimum points to form a dense region (the point itself included)
    pub min_samples: usize,
    /// Distance metric override; `None` uses the embedding provider's metric
    pub metric: Option<DistanceMetric>,
    /// Shortest issue sequence considered
    pub min_sequence_length: usize,
    /// Longest issue sequence considered
    pub max_sequence_length: usize,
    /// Non-overlapping repeats required for a temporal pattern
    pub min_sequence_occurrences: usize,
    /// Default significance filter applied by the analyzer
    pub min_significance: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            eps: 0.5,
            min_samples: 2,
            metric: None,
            min_sequence_length: 2,
            max_sequence_length: 5,
            min_sequence_occurrences: 3,
            min_significance: 0.3,
        }
    }
}

impl PatternConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(KmapError::Config(format!(
                "patterns.eps must be positive, got {}",
                self.eps
            )));
        }
        if self.min_samples < 1 {
            return Err(KmapError::Config(
                "patterns.min_samples must be at least 1".into(),
            ));
        }
        if self.min_sequence_length < 1 {
            return Err(KmapError::Config(
                "patterns.min_sequence_length must be at least 1".into(),
            ));
        }
        if self.max_sequence_length < self.min_sequence_length {
            return Err(KmapError::Config(format!(
                "patterns.max_sequence_length ({}) is below min_sequence_length ({})",
                self.max_sequence_length, self.min_sequence_length
            )));
        }
        if self.min_sequence_occurrences < 2 {
            return Err(KmapError::Config(
                "patterns.min_sequence_occurrences must be at least 2".into(),
            ));
        }
        check_unit("patterns.min_significance", self.min_significance)
    }
}

/// Configuration for recovery strategy selection and execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Confidence at or above which an invalid result triggers rollback
    pub critical_failure_threshold: f64,
    /// Significance at or above which a matching pattern drives the strategy
    pub pattern_significance_threshold: f64,
    /// Ceiling on simultaneously executing recoveries
    pub max_concurrent_recoveries: usize,
    /// Consecutive failed attempts of a strategy before escalating
    pub escalation_attempts: usize,
    /// Execution ceiling per recovery
    pub execution_timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            critical_failure_threshold: 0.8,
            pattern_significance_threshold: 0.7,
            max_concurrent_recoveries: 3,
            escalation_attempts: 3,
            execution_timeout_secs: 300,
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit(
            "recovery.critical_failure_threshold",
            self.critical_failure_threshold,
        )?;
        check_unit(
            "recovery.pattern_significance_threshold",
            self.pattern_significance_threshold,
        )?;
        if self.max_concurrent_recoveries < 1 {
            return Err(KmapError::Config(
                "recovery.max_concurrent_recoveries must be at least 1".into(),
            ));
        }
        if self.escalation_attempts < 1 {
            return Err(KmapError::Config(
                "recovery.escalation_attempts must be at least 1".into(),
            ));
        }
        if self.execution_timeout_secs < 1 {
            return Err(KmapError::Config(
                "recovery.execution_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

/// Configuration for the in-memory validation history window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries older than this are rotated out
    pub max_age_days: u32,
    /// Newest entries kept after age rotation
    pub max_entries: usize,
    /// Recent results compared against the rest of the window
    pub trend_window: usize,
    /// Effect size at which a metric counts as trending
    pub trend_threshold: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            max_entries: 1000,
            trend_window: 5,
            trend_threshold: 2.0,
        }
    }
}

impl HistoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_entries < 1 {
            return Err(KmapError::Config(
                "history.max_entries must be at least 1".into(),
            ));
        }
        if self.trend_window < 2 {
            return Err(KmapError::Config(
                "history.trend_window must be at least 2".into(),
            ));
        }
        if !self.trend_threshold.is_finite() || self.trend_threshold <= 0.0 {
            return Err(KmapError::Config(format!(
                "history.trend_threshold must be positive, got {}",
                self.trend_threshold
            )));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(KmapError::Config(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}
