//! Recovery execution
//!
//! ```text
//! execute ─> resources present? ─> resource locks ─> admission gate ─> handler
//!                 │ no                (name order)       (priority)       │ timeout
//!                 ▼                                                      ▼
//!          MissingResource                                   RecoveryRecord appended
//! ```
//!
//! Locks are taken before a slot, so a recovery blocked on a busy resource
//! never holds one of the `max_concurrent_recoveries` slots. Cancellation is
//! honored while waiting for locks or queued at the gate. Once the handler
//! starts, the recovery runs to completion or timeout.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::RecoveryConfig;
use crate::error::{KmapError, Result};
use crate::types::{RecoveryAction, RecoveryOutcome, RecoveryRecord};

use super::admission::AdmissionGate;
use super::context::{DefaultHandler, RecoveryContext, StrategyHandler};
use super::locks::{LocalResourceLocks, ResourceLocks};
use super::store::RecoveryHistory;

pub struct RecoveryExecutor {
    config: RecoveryConfig,
    gate: AdmissionGate,
    locks: Arc<dyn ResourceLocks>,
    handler: Arc<dyn StrategyHandler>,
    history: Arc<dyn RecoveryHistory>,
}

impl RecoveryExecutor {
    /// Create an executor with in-process locks and the default handler
    pub fn new(config: RecoveryConfig, history: Arc<dyn RecoveryHistory>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gate: AdmissionGate::new(config.max_concurrent_recoveries),
            config,
            locks: Arc::new(LocalResourceLocks::new()),
            handler: Arc::new(DefaultHandler),
            history,
        })
    }

    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn StrategyHandler>) -> Self {
        self.handler = handler;
        self
    }

    #[must_use]
    pub fn with_locks(mut self, locks: Arc<dyn ResourceLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn history(&self) -> &Arc<dyn RecoveryHistory> {
        &self.history
    }

    /// Recoveries holding an execution slot
    pub fn active_recoveries(&self) -> usize {
        self.gate.active()
    }

    /// Recoveries waiting for an execution slot
    pub fn queued_recoveries(&self) -> usize {
        self.gate.queued()
    }

    /// Execute an action, waiting for a slot and its resources as needed
    pub async fn execute_recovery(
        &self,
        action: &RecoveryAction,
        context: &RecoveryContext,
    ) -> Result<bool> {
        self.execute_cancellable(action, context, CancellationToken::new())
            .await
    }

    /// Execute an action unless `cancel` fires before it starts running.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` when the handler fails,
    /// errors or times out; every such completion appends a record. A missing
    /// resource or a cancellation returns an error and records nothing.
    #[instrument(skip_all, fields(strategy = %action.strategy, priority = action.priority))]
    pub async fn execute_cancellable(
        &self,
        action: &RecoveryAction,
        context: &RecoveryContext,
        cancel: CancellationToken,
    ) -> Result<bool> {
        if let Some(missing) = context.first_missing(action) {
            warn!(resource = missing, "Recovery aborted, resource missing");
            return Err(KmapError::MissingResource {
                resource: missing.to_string(),
            });
        }

        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Recovery cancelled while waiting for resources");
                return Err(KmapError::Cancelled);
            }
            guard = self.locks.acquire(&action.required_resources) => guard?,
        };
        debug!(resources = ?guard.resources(), "Resources locked");

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Recovery cancelled while queued");
                return Err(KmapError::Cancelled);
            }
            permit = self.gate.acquire(action.priority) => permit?,
        };

        let started_at = Utc::now();
        let start = Instant::now();
        let timeout = self.config.execution_timeout();
        let (outcome, detail) =
            match tokio::time::timeout(timeout, self.handler.apply(action, context)).await {
                Ok(Ok(true)) => (RecoveryOutcome::Success, None),
                Ok(Ok(false)) => (
                    RecoveryOutcome::Failure,
                    Some("handler reported failure".to_string()),
                ),
                Ok(Err(e)) => (RecoveryOutcome::Failure, Some(e.to_string())),
                Err(_) => {
                    let err = KmapError::ExecutionTimeout(self.config.execution_timeout_secs);
                    (RecoveryOutcome::Failure, Some(err.to_string()))
                }
            };
        let duration = start.elapsed();
        drop(permit);
        drop(guard);

        let mut record = RecoveryRecord::new(action.clone(), outcome, started_at, duration);
        if let Some(detail) = detail {
            warn!(detail = %detail, "Recovery failed");
            record = record.with_detail(detail);
        }
        self.history.append(record).await?;

        info!(
            outcome = ?outcome,
            duration_ms = duration.as_millis() as u64,
            "Recovery complete"
        );
        Ok(outcome.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::store::InMemoryRecoveryHistory;
    use crate::types::{KNOWLEDGE_MAP, RecoveryStrategy, TimeRange};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FailingHandler;

    #[async_trait]
    impl StrategyHandler for FailingHandler {
        async fn apply(&self, _: &RecoveryAction, _: &RecoveryContext) -> Result<bool> {
            Err(KmapError::Lock("knowledge map is read-only".into()))
        }
    }

    struct SlowHandler(Duration);

    #[async_trait]
    impl StrategyHandler for SlowHandler {
        async fn apply(&self, _: &RecoveryAction, _: &RecoveryContext) -> Result<bool> {
            tokio::time::sleep(self.0).await;
            Ok(true)
        }
    }

    fn executor() -> (RecoveryExecutor, Arc<InMemoryRecoveryHistory>) {
        let history = Arc::new(InMemoryRecoveryHistory::new());
        let executor = RecoveryExecutor::new(RecoveryConfig::default(), history.clone()).unwrap();
        (executor, history)
    }

    fn map_context() -> RecoveryContext {
        RecoveryContext::new().with_resource(KNOWLEDGE_MAP, Arc::new(()))
    }

    #[tokio::test]
    async fn test_success_is_recorded() {
        let (executor, history) = executor();
        let action = RecoveryAction::new(RecoveryStrategy::IncrementalFix, "fix");

        assert!(executor.execute_recovery(&action, &map_context()).await.unwrap());

        let records = history.query(TimeRange::all(), None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, RecoveryOutcome::Success);
        assert!(records[0].detail.is_none());
        assert_eq!(executor.active_recoveries(), 0);
    }

    #[tokio::test]
    async fn test_missing_resource_records_nothing() {
        let (executor, history) = executor();
        let action = RecoveryAction::new(RecoveryStrategy::Rollback, "rollback");

        let err = executor
            .execute_recovery(&action, &map_context())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            KmapError::MissingResource { ref resource } if resource == "validation_history"
        ));
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_records_failure() {
        let (executor, history) = executor();
        let executor = executor.with_handler(Arc::new(FailingHandler));
        let action = RecoveryAction::new(RecoveryStrategy::IncrementalFix, "fix");

        assert!(!executor.execute_recovery(&action, &map_context()).await.unwrap());

        let records = history.query(TimeRange::all(), None).await.unwrap();
        assert_eq!(records[0].outcome, RecoveryOutcome::Failure);
        assert!(records[0].detail.as_deref().unwrap().contains("read-only"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_records_failure() {
        let history = Arc::new(InMemoryRecoveryHistory::new());
        let config = RecoveryConfig {
            execution_timeout_secs: 5,
            ..Default::default()
        };
        let executor = RecoveryExecutor::new(config, history.clone())
            .unwrap()
            .with_handler(Arc::new(SlowHandler(Duration::from_secs(60))));
        let action = RecoveryAction::new(RecoveryStrategy::IncrementalFix, "fix");

        assert!(!executor.execute_recovery(&action, &map_context()).await.unwrap());

        let records = history.query(TimeRange::all(), None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, RecoveryOutcome::Failure);
        assert!(records[0].detail.as_deref().unwrap().contains("timed out"));
        assert!(records[0].duration >= Duration::from_secs(5));
        assert!(records[0].duration < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (executor, history) = executor();
        let action = RecoveryAction::new(RecoveryStrategy::ManualIntervention, "manual");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor
            .execute_cancellable(&action, &RecoveryContext::new(), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, KmapError::Cancelled));
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting_for_lock() {
        let history = Arc::new(InMemoryRecoveryHistory::new());
        let locks = Arc::new(LocalResourceLocks::new());
        let executor = RecoveryExecutor::new(RecoveryConfig::default(), history.clone())
            .unwrap()
            .with_locks(locks.clone());
        let action = RecoveryAction::new(RecoveryStrategy::IncrementalFix, "fix");
        let context = map_context();

        let held = locks
            .acquire(&action.required_resources)
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let (result, _) = tokio::join!(
            executor.execute_cancellable(&action, &context, cancel.clone()),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                cancel.cancel();
            }
        );

        assert!(matches!(result, Err(KmapError::Cancelled)));
        assert!(history.is_empty());
        assert_eq!(executor.active_recoveries(), 0);
        assert_eq!(executor.queued_recoveries(), 0);

        // The abandoned wait must not leave the resource wedged
        drop(held);
        assert!(!locks.is_locked(KNOWLEDGE_MAP));
        assert!(executor.execute_recovery(&action, &context).await.unwrap());
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_needs_no_resources() {
        let (executor, _) = executor();
        let action = RecoveryAction::new(RecoveryStrategy::ManualIntervention, "manual");
        assert!(
            executor
                .execute_recovery(&action, &RecoveryContext::new())
                .await
                .unwrap()
        );
    }
}
