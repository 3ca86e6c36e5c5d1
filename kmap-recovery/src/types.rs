//! Core types shared by pattern analysis and recovery
//!
//! Validation results flow in, patterns and recovery actions flow out, and
//! recovery records are appended to the history store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Resources
// ============================================================================

/// Resource name for the knowledge map handle
pub const KNOWLEDGE_MAP: &str = "knowledge_map";

/// Resource name for the validation history handle
pub const VALIDATION_HISTORY: &str = "validation_history";

/// Resource name for the validation system handle
pub const VALIDATION_SYSTEM: &str = "validation_system";

/// Unique identifier for recovery records
pub type RecordId = Uuid;

// ============================================================================
// Validation input
// ============================================================================

/// Outcome of validating a piece of knowledge content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the content passed validation
    pub is_valid: bool,
    /// Issue descriptions, in the order the validator reported them
    #[serde(default)]
    pub issues: Vec<String>,
    /// Validator confidence in [0, 1]
    pub confidence_score: f64,
    /// When the validation ran
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    /// Create a result stamped with the current time
    pub fn new(is_valid: bool, issues: Vec<String>, confidence_score: f64) -> Self {
        Self {
            is_valid,
            issues,
            confidence_score,
            timestamp: Utc::now(),
        }
    }

    /// Create a failed result from issue descriptions
    pub fn failed<I, S>(issues: I, confidence_score: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            false,
            issues.into_iter().map(Into::into).collect(),
            confidence_score,
        )
    }

    /// Override the timestamp
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ============================================================================
// Patterns
// ============================================================================

/// Kind of recurring-issue pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Issues that read alike
    Semantic,
    /// Issues that repeat in the same order
    Temporal,
}

impl PatternType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Temporal => "temporal",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detector-specific statistics attached to a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternMetadata {
    /// Cluster statistics
    Semantic {
        cluster_size: usize,
        average_similarity: f64,
    },
    /// Sequence statistics
    Temporal {
        sequence_length: usize,
        temporal_density: f64,
    },
}

/// A recurring group of validation issues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_type: PatternType,
    pub description: String,
    /// Importance in [0, 1]
    pub significance: f64,
    pub occurrences: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Issue texts that make up the pattern (never empty)
    pub related_issues: BTreeSet<String>,
    pub metadata: PatternMetadata,
}

impl Pattern {
    /// Whether any of the given issues relates to this pattern.
    ///
    /// Matching is case-insensitive substring containment in either direction.
    pub fn matches_issues(&self, issues: &[String]) -> bool {
        issues.iter().any(|issue| {
            let issue = issue.to_lowercase();
            self.related_issues.iter().any(|related| {
                let related = related.to_lowercase();
                related.contains(&issue) || issue.contains(&related)
            })
        })
    }
}

// ============================================================================
// Recovery actions
// ============================================================================

/// Remediation strategy for a validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Revert the knowledge map to a known-good state
    Rollback,
    /// Patch the affected knowledge items
    IncrementalFix,
    /// Re-run validation on the affected content
    Revalidation,
    /// Hand the failure to a human
    ManualIntervention,
}

impl RecoveryStrategy {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rollback => "rollback",
            Self::IncrementalFix => "incremental_fix",
            Self::Revalidation => "revalidation",
            Self::ManualIntervention => "manual_intervention",
        }
    }

    /// Priority an action with this strategy gets unless a rule says otherwise
    pub fn default_priority(&self) -> u8 {
        match self {
            Self::Rollback => 1,
            Self::Revalidation => 2,
            Self::IncrementalFix => 3,
            Self::ManualIntervention => 5,
        }
    }

    /// Resources an action with this strategy must lock
    pub fn default_resources(&self) -> BTreeSet<String> {
        let names: &[&str] = match self {
            Self::Rollback => &[KNOWLEDGE_MAP, VALIDATION_HISTORY],
            Self::IncrementalFix => &[KNOWLEDGE_MAP],
            Self::Revalidation => &[VALIDATION_SYSTEM],
            Self::ManualIntervention => &[],
        };
        names.iter().map(|name| (*name).to_string()).collect()
    }

    /// Strategy to try after this one keeps failing.
    ///
    /// Revalidation → IncrementalFix → ManualIntervention. Rollback is never
    /// chosen by escalation; a failing rollback goes to a person.
    pub fn escalate(&self) -> Self {
        match self {
            Self::Revalidation => Self::IncrementalFix,
            Self::IncrementalFix | Self::Rollback | Self::ManualIntervention => {
                Self::ManualIntervention
            }
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prescribed remediation for one failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub strategy: RecoveryStrategy,
    pub description: String,
    /// 1 (highest) to 5 (lowest)
    pub priority: u8,
    /// Expected effect in [0, 1]
    pub estimated_impact: f64,
    pub required_resources: BTreeSet<String>,
    /// Fingerprint of the failure's issue set, see [`crate::issue::issue_class`]
    pub issue_class: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RecoveryAction {
    /// Create an action with the strategy's default priority and resources
    pub fn new(strategy: RecoveryStrategy, description: impl Into<String>) -> Self {
        Self {
            strategy,
            description: description.into(),
            priority: strategy.default_priority(),
            estimated_impact: 0.0,
            required_resources: strategy.default_resources(),
            issue_class: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    /// Set the priority, clamped to 1..=5
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 5);
        self
    }

    #[must_use]
    pub fn with_impact(mut self, impact: f64) -> Self {
        self.estimated_impact = impact.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_issue_class(mut self, issue_class: impl Into<String>) -> Self {
        self.issue_class = issue_class.into();
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// Recovery records
// ============================================================================

/// Result of executing a recovery action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Success,
    Failure,
}

impl RecoveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Immutable log entry for one executed recovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub id: RecordId,
    pub action: RecoveryAction,
    pub outcome: RecoveryOutcome,
    pub started_at: DateTime<Utc>,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Error text or timeout reason for failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RecoveryRecord {
    /// Create a record that completes now
    pub fn new(
        action: RecoveryAction,
        outcome: RecoveryOutcome,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            action,
            outcome,
            started_at,
            timestamp: Utc::now(),
            duration,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Inclusive time window for history queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Range covering every representable timestamp
    pub fn all() -> Self {
        Self {
            start: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
