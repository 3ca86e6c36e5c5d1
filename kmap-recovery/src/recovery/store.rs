//! Recovery history store abstraction.
//!
//! An append-only log of executed recoveries. The strategist reads it to decide
//! escalation; the executor writes one record per completed execution.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{KmapError, Result};
use crate::types::{RecordId, RecoveryRecord, RecoveryStrategy, TimeRange};

/// Trait for recovery record storage.
///
/// Implementations must support:
/// - Append-only storage (records are never modified or removed)
/// - Time-range queries, optionally narrowed to one strategy
/// - Most-recent attempts for an issue class and strategy
#[async_trait]
pub trait RecoveryHistory: Send + Sync {
    /// Append a record to the log.
    async fn append(&self, record: RecoveryRecord) -> Result<RecordId>;

    /// Records whose completion time falls inside `range`, oldest first.
    async fn query(
        &self,
        range: TimeRange,
        strategy: Option<RecoveryStrategy>,
    ) -> Result<Vec<RecoveryRecord>>;

    /// The last `limit` records for an issue class and strategy, newest first.
    async fn recent_attempts(
        &self,
        issue_class: &str,
        strategy: RecoveryStrategy,
        limit: usize,
    ) -> Result<Vec<RecoveryRecord>>;
}

/// In-memory recovery history.
#[derive(Debug, Default)]
pub struct InMemoryRecoveryHistory {
    records: RwLock<Vec<RecoveryRecord>>,
}

impl InMemoryRecoveryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: PoisonError<T>) -> KmapError {
    KmapError::History("record lock poisoned".into())
}

#[async_trait]
impl RecoveryHistory for InMemoryRecoveryHistory {
    async fn append(&self, record: RecoveryRecord) -> Result<RecordId> {
        let id = record.id;
        self.records.write().map_err(poisoned)?.push(record);
        Ok(id)
    }

    async fn query(
        &self,
        range: TimeRange,
        strategy: Option<RecoveryStrategy>,
    ) -> Result<Vec<RecoveryRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut matched: Vec<RecoveryRecord> = records
            .iter()
            .filter(|r| range.contains(r.timestamp))
            .filter(|r| strategy.is_none_or(|s| r.action.strategy == s))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.timestamp);
        Ok(matched)
    }

    async fn recent_attempts(
        &self,
        issue_class: &str,
        strategy: RecoveryStrategy,
        limit: usize,
    ) -> Result<Vec<RecoveryRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.action.issue_class == issue_class && r.action.strategy == strategy)
            .take(limit)
            .cloned()
            .collect())
    }
}
