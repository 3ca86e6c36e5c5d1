//! kmap-recovery - Pattern analysis and automated recovery for knowledge maps
//!
//! Detects recurring validation problems in a knowledge map's validation
//! history and chooses, schedules and executes remediation for new failures.
//!
//! ```text
//! ValidationResult[] ─> PatternAnalyzer ─> Pattern[] ─┐
//!                                                     ├─> RecoveryStrategist ─> RecoveryAction
//! failed ValidationResult ────────────────────────────┘                             │
//!                                                                                   ▼
//!                          RecoveryHistory <── RecoveryRecord <── RecoveryExecutor
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod issue;
pub mod manager;
pub mod patterns;
pub mod recovery;
pub mod trends;
pub mod types;

pub use config::{HistoryConfig, KmapConfig, PatternConfig, RecoveryConfig};
pub use error::{KmapError, Result};
pub use history::{CategoryBreakdown, HistoryStats, TrendSummary, ValidationHistory};
pub use issue::{issue_class, issue_type};
pub use manager::{HandledFailure, RecoveryManager};
pub use patterns::{
    Clusterer, Dbscan, DistanceMetric, EmbedderError, EmbeddingProvider, HashingEmbedder,
    PatternAnalyzer, SemanticDetector, TemporalDetector,
};
pub use recovery::{
    DefaultHandler, InMemoryRecoveryHistory, LocalResourceLocks, RecoveryContext,
    RecoveryExecutor, RecoveryHistory, RecoveryRule, RecoveryStrategist, ResourceLocks,
    StrategyHandler,
};
pub use trends::{IssueCategory, MetricTrend, Trend, TrendReport, category_counts, metric_trend};
pub use types::*;
