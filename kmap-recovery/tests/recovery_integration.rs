//! Integration tests for recovery selection and execution
//!
//! These tests validate the executor's scheduling guarantees:
//! - Never more than `max_concurrent_recoveries` handlers run at once
//! - Queued recoveries start in priority order
//! - Cancellation and timeouts leave the expected history behind

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use kmap_recovery::{
    InMemoryRecoveryHistory, KNOWLEDGE_MAP, KmapError, RecoveryAction, RecoveryConfig,
    RecoveryContext, RecoveryExecutor, RecoveryHistory, RecoveryOutcome, RecoveryRecord,
    RecoveryStrategist, RecoveryStrategy, Result, StrategyHandler, TimeRange, VALIDATION_HISTORY,
    VALIDATION_SYSTEM, ValidationResult, issue_class,
};

/// Records how many handlers overlap and the order they start in
#[derive(Default)]
struct TrackingHandler {
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl TrackingHandler {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }
}

#[async_trait]
impl StrategyHandler for TrackingHandler {
    async fn apply(&self, action: &RecoveryAction, _: &RecoveryContext) -> Result<bool> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.started.lock().await.push(action.description.clone());
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(true)
    }
}

fn full_context() -> RecoveryContext {
    RecoveryContext::new()
        .with_resource(KNOWLEDGE_MAP, Arc::new(()))
        .with_resource(VALIDATION_HISTORY, Arc::new(()))
        .with_resource(VALIDATION_SYSTEM, Arc::new(()))
}

fn executor_with(
    config: RecoveryConfig,
    handler: Arc<dyn StrategyHandler>,
) -> (Arc<RecoveryExecutor>, Arc<InMemoryRecoveryHistory>) {
    let history = Arc::new(InMemoryRecoveryHistory::new());
    let executor = RecoveryExecutor::new(config, history.clone())
        .unwrap()
        .with_handler(handler);
    (Arc::new(executor), history)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_never_exceeds_ceiling() {
    let handler = Arc::new(TrackingHandler::with_delay(Duration::from_millis(30)));
    let (executor, history) = executor_with(RecoveryConfig::default(), handler.clone());
    let context = Arc::new(full_context());

    // Manual intervention locks nothing, so only the gate limits overlap
    let mut tasks = Vec::new();
    for i in 0..10 {
        let executor = Arc::clone(&executor);
        let context = Arc::clone(&context);
        tasks.push(tokio::spawn(async move {
            let action =
                RecoveryAction::new(RecoveryStrategy::ManualIntervention, format!("manual {i}"));
            executor.execute_recovery(&action, &context).await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().unwrap());
    }

    assert_eq!(handler.peak.load(Ordering::SeqCst), 3);
    assert_eq!(history.len(), 10);
    assert_eq!(executor.active_recoveries(), 0);
    assert_eq!(executor.queued_recoveries(), 0);
}

#[tokio::test]
async fn shared_resource_serializes_recoveries() {
    let handler = Arc::new(TrackingHandler::with_delay(Duration::from_millis(20)));
    let (executor, _) = executor_with(RecoveryConfig::default(), handler.clone());
    let context = full_context();

    let fix = RecoveryAction::new(RecoveryStrategy::IncrementalFix, "fix");
    let rollback = RecoveryAction::new(RecoveryStrategy::Rollback, "rollback");
    let (a, b) = tokio::join!(
        executor.execute_recovery(&fix, &context),
        executor.execute_recovery(&rollback, &context),
    );

    assert!(a.unwrap() && b.unwrap());
    assert_eq!(handler.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn queued_recoveries_start_in_priority_order() {
    let handler = Arc::new(TrackingHandler::with_delay(Duration::from_millis(20)));
    let config = RecoveryConfig {
        max_concurrent_recoveries: 1,
        ..Default::default()
    };
    let (executor, _) = executor_with(config, handler.clone());
    let context = Arc::new(full_context());

    let blocker = {
        let executor = Arc::clone(&executor);
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            let action = RecoveryAction::new(RecoveryStrategy::ManualIntervention, "blocker");
            executor.execute_recovery(&action, &context).await
        })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    let mut tasks = Vec::new();
    for (description, priority) in [("p5", 5u8), ("p3", 3), ("p1", 1), ("p2", 2)] {
        let executor = Arc::clone(&executor);
        let context = Arc::clone(&context);
        tasks.push(tokio::spawn(async move {
            let action = RecoveryAction::new(RecoveryStrategy::ManualIntervention, description)
                .with_priority(priority);
            executor.execute_recovery(&action, &context).await
        }));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(executor.queued_recoveries(), 4);

    blocker.await.unwrap().unwrap();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let started = handler.started.lock().await.clone();
    assert_eq!(started, vec!["blocker", "p1", "p2", "p3", "p5"]);
}

#[tokio::test]
async fn recoveries_blocked_on_a_resource_do_not_take_slots() {
    let handler = Arc::new(TrackingHandler::with_delay(Duration::from_millis(100)));
    let (executor, _) = executor_with(RecoveryConfig::default(), handler.clone());
    let context = Arc::new(full_context());

    // Three fixes contend for the knowledge map; only one can run at a time
    let mut tasks = Vec::new();
    for i in 0..3 {
        let executor = Arc::clone(&executor);
        let context = Arc::clone(&context);
        tasks.push(tokio::spawn(async move {
            let action = RecoveryAction::new(RecoveryStrategy::IncrementalFix, format!("fix {i}"));
            executor.execute_recovery(&action, &context).await
        }));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let revalidation = {
        let executor = Arc::clone(&executor);
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            let action = RecoveryAction::new(RecoveryStrategy::Revalidation, "revalidate");
            executor.execute_recovery(&action, &context).await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(executor.active_recoveries(), 2);
    assert_eq!(executor.queued_recoveries(), 0);
    assert_eq!(
        *handler.started.lock().await,
        vec!["fix 0".to_string(), "revalidate".to_string()]
    );

    assert!(revalidation.await.unwrap().unwrap());
    for task in tasks {
        assert!(task.await.unwrap().unwrap());
    }
    assert_eq!(handler.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancelled_queued_recovery_leaves_no_record() {
    let handler = Arc::new(TrackingHandler::with_delay(Duration::from_millis(30)));
    let config = RecoveryConfig {
        max_concurrent_recoveries: 1,
        ..Default::default()
    };
    let (executor, history) = executor_with(config, handler.clone());
    let context = Arc::new(full_context());

    let running = {
        let executor = Arc::clone(&executor);
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            let action = RecoveryAction::new(RecoveryStrategy::ManualIntervention, "running");
            executor.execute_recovery(&action, &context).await
        })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    let cancel = CancellationToken::new();
    let queued = {
        let executor = Arc::clone(&executor);
        let context = Arc::clone(&context);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let action = RecoveryAction::new(RecoveryStrategy::ManualIntervention, "queued");
            executor.execute_cancellable(&action, &context, cancel).await
        })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(executor.queued_recoveries(), 1);

    cancel.cancel();
    assert!(matches!(queued.await.unwrap(), Err(KmapError::Cancelled)));
    assert!(running.await.unwrap().unwrap());

    let records = history.query(TimeRange::all(), None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action.description, "running");
    assert_eq!(*handler.started.lock().await, vec!["running"]);
}

#[tokio::test(start_paused = true)]
async fn timed_out_recovery_fails_and_releases_locks() {
    let config = RecoveryConfig {
        execution_timeout_secs: 2,
        ..Default::default()
    };
    let slow = Arc::new(TrackingHandler::with_delay(Duration::from_secs(30)));
    let (executor, history) = executor_with(config, slow);
    let context = full_context();
    let action = RecoveryAction::new(RecoveryStrategy::IncrementalFix, "slow fix");

    assert!(!executor.execute_recovery(&action, &context).await.unwrap());
    // The lock on knowledge_map was released, so a second run can start
    assert!(!executor.execute_recovery(&action, &context).await.unwrap());

    let failures = history
        .query(TimeRange::all(), Some(RecoveryStrategy::IncrementalFix))
        .await
        .unwrap();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|r| r.outcome == RecoveryOutcome::Failure));
}

#[tokio::test]
async fn missing_resource_is_reported_without_side_effects() {
    let handler = Arc::new(TrackingHandler::default());
    let (executor, history) = executor_with(RecoveryConfig::default(), handler.clone());
    let action = RecoveryAction::new(RecoveryStrategy::Revalidation, "recheck");

    let err = executor
        .execute_recovery(&action, &RecoveryContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, KmapError::MissingResource { .. }));
    assert!(history.is_empty());
    assert!(handler.started.lock().await.is_empty());
}

#[tokio::test]
async fn records_retrievable_by_strategy_and_time_range() {
    let handler = Arc::new(TrackingHandler::default());
    let (executor, history) = executor_with(RecoveryConfig::default(), handler);
    let context = full_context();
    let before = Utc::now();

    for strategy in [
        RecoveryStrategy::Rollback,
        RecoveryStrategy::IncrementalFix,
        RecoveryStrategy::Revalidation,
        RecoveryStrategy::ManualIntervention,
    ] {
        let action = RecoveryAction::new(strategy, strategy.as_str());
        executor.execute_recovery(&action, &context).await.unwrap();
    }
    let after = Utc::now();

    let window = TimeRange::new(before, after);
    for strategy in [
        RecoveryStrategy::Rollback,
        RecoveryStrategy::IncrementalFix,
        RecoveryStrategy::Revalidation,
        RecoveryStrategy::ManualIntervention,
    ] {
        let records = history.query(window, Some(strategy)).await.unwrap();
        assert_eq!(records.len(), 1, "{strategy}");
        assert_eq!(records[0].action.strategy, strategy);
        assert!(window.contains(records[0].timestamp));
    }

    let earlier = TimeRange::new(
        before - chrono::Duration::days(1),
        before - chrono::Duration::hours(1),
    );
    assert!(history.query(earlier, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn strategist_follows_rule_table() {
    let history = Arc::new(InMemoryRecoveryHistory::new());
    let strategist = RecoveryStrategist::new(RecoveryConfig::default(), history).unwrap();

    for confidence in [0.8, 0.9, 1.0] {
        let result = ValidationResult::failed(["Graph inconsistent"], confidence);
        let action = strategist
            .analyze_failure(&result, &[], &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(action.strategy, RecoveryStrategy::Rollback);
        assert_eq!(action.priority, 1);
    }

    let isolated = ValidationResult::failed(["Odd formatting"], 0.5);
    let action = strategist
        .analyze_failure(&isolated, &[], &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(action.strategy, RecoveryStrategy::IncrementalFix);
    assert_eq!(action.priority, 3);
}

#[tokio::test]
async fn failed_executions_drive_escalation() {
    let history = Arc::new(InMemoryRecoveryHistory::new());
    let strategist = RecoveryStrategist::new(RecoveryConfig::default(), history.clone()).unwrap();
    let result = ValidationResult::failed(["Odd formatting"], 0.5);

    for _ in 0..3 {
        let action = RecoveryAction::new(RecoveryStrategy::IncrementalFix, "fix")
            .with_issue_class(issue_class(&result.issues));
        history
            .append(RecoveryRecord::new(
                action,
                RecoveryOutcome::Failure,
                Utc::now(),
                Duration::ZERO,
            ))
            .await
            .unwrap();
    }

    let action = strategist
        .analyze_failure(&result, &[], &[])
        .await
        .unwrap()
        .unwrap();

    // A failing fix goes to a person, never to an automatic rollback
    assert_eq!(action.strategy, RecoveryStrategy::ManualIntervention);
    assert_eq!(action.metadata["escalated_from"], "incremental_fix");
}
