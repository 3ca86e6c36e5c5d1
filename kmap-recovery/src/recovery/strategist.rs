//! Recovery strategy selection
//!
//! Picks an action for a failed validation from the ordered rule table, then
//! escalates it when the recovery history shows the chosen strategy keeps
//! failing for the same issue class.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::RecoveryConfig;
use crate::error::Result;
use crate::issue::issue_class;
use crate::types::{Pattern, RecoveryAction, RecoveryStrategy, ValidationResult};

use super::rules::{FailureContext, RULES};
use super::store::RecoveryHistory;

pub struct RecoveryStrategist {
    config: RecoveryConfig,
    history: Arc<dyn RecoveryHistory>,
}

impl RecoveryStrategist {
    pub fn new(config: RecoveryConfig, history: Arc<dyn RecoveryHistory>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, history })
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Choose a recovery action for a failed validation.
    ///
    /// Returns `None` for a valid result. `validation_history` supplies the
    /// recurrence count recorded in the action's metadata; `patterns` are the
    /// patterns detected over that history.
    #[instrument(
        skip_all,
        fields(confidence = result.confidence_score, issues = result.issues.len())
    )]
    pub async fn analyze_failure(
        &self,
        result: &ValidationResult,
        validation_history: &[ValidationResult],
        patterns: &[Pattern],
    ) -> Result<Option<RecoveryAction>> {
        let Some(action) = self.select(result, patterns) else {
            debug!("Result is valid, nothing to recover");
            return Ok(None);
        };

        let recurrences = validation_history
            .iter()
            .filter(|r| !r.is_valid && issue_class(&r.issues) == action.issue_class)
            .count();
        let action = self
            .escalate(action)
            .await?
            .with_metadata("recurrences", recurrences);

        info!(
            strategy = %action.strategy,
            priority = action.priority,
            issue_class = %action.issue_class,
            "Selected recovery action"
        );
        Ok(Some(action))
    }

    /// Apply the rule table without consulting recovery history
    pub fn select(
        &self,
        result: &ValidationResult,
        patterns: &[Pattern],
    ) -> Option<RecoveryAction> {
        let ctx = FailureContext {
            result,
            patterns,
            critical_failure_threshold: self.config.critical_failure_threshold,
            pattern_significance_threshold: self.config.pattern_significance_threshold,
        };

        RULES.iter().find_map(|rule| {
            rule.evaluate(&ctx).map(|action| {
                debug!(rule = rule.name(), "Recovery rule matched");
                action
                    .with_issue_class(issue_class(&result.issues))
                    .with_metadata("rule", rule.name())
            })
        })
    }

    /// Move up the severity ladder while the current strategy's last
    /// `escalation_attempts` attempts for this issue class all failed
    async fn escalate(&self, action: RecoveryAction) -> Result<RecoveryAction> {
        let original = action.strategy;
        let attempts = self.config.escalation_attempts;
        let mut action = action;

        while action.strategy != RecoveryStrategy::ManualIntervention {
            let recent = self
                .history
                .recent_attempts(&action.issue_class, action.strategy, attempts)
                .await?;
            if recent.len() < attempts || recent.iter().any(|r| r.outcome.is_success()) {
                break;
            }

            let next = action.strategy.escalate();
            warn!(
                from = %action.strategy,
                to = %next,
                attempts,
                "Escalating after repeated failures"
            );
            action = escalated(action, next, attempts);
        }

        if action.strategy != original {
            action = action.with_metadata("escalated_from", original.as_str());
        }
        Ok(action)
    }
}

fn escalated(action: RecoveryAction, next: RecoveryStrategy, attempts: usize) -> RecoveryAction {
    let mut escalated = RecoveryAction::new(
        next,
        format!(
            "{} (escalated to {next} after {attempts} failed {} attempts)",
            action.description, action.strategy
        ),
    )
    .with_impact(action.estimated_impact)
    .with_issue_class(action.issue_class);
    escalated.metadata = action.metadata;
    escalated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::store::InMemoryRecoveryHistory;
    use crate::types::{RecoveryOutcome, RecoveryRecord};
    use chrono::Utc;
    use std::time::Duration;

    fn strategist() -> (RecoveryStrategist, Arc<InMemoryRecoveryHistory>) {
        let history = Arc::new(InMemoryRecoveryHistory::new());
        let strategist =
            RecoveryStrategist::new(RecoveryConfig::default(), history.clone()).unwrap();
        (strategist, history)
    }

    async fn record_attempts(
        history: &InMemoryRecoveryHistory,
        class: &str,
        strategy: RecoveryStrategy,
        outcome: RecoveryOutcome,
        count: usize,
    ) {
        for _ in 0..count {
            let action = RecoveryAction::new(strategy, "earlier").with_issue_class(class);
            history
                .append(RecoveryRecord::new(action, outcome, Utc::now(), Duration::ZERO))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_valid_result_yields_none() {
        let (strategist, _) = strategist();
        let result = ValidationResult::new(true, vec![], 0.99);
        assert!(
            strategist
                .analyze_failure(&result, &[], &[])
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_isolated_failure_gets_incremental_fix() {
        let (strategist, _) = strategist();
        let result = ValidationResult::failed(["Odd formatting"], 0.5);

        let action = strategist
            .analyze_failure(&result, &[], &[])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(action.strategy, RecoveryStrategy::IncrementalFix);
        assert_eq!(action.priority, 3);
        assert_eq!(action.issue_class, issue_class(&result.issues));
        assert_eq!(action.metadata["rule"], "isolated");
    }

    #[tokio::test]
    async fn test_counts_recurrences_in_history() {
        let (strategist, _) = strategist();
        let result = ValidationResult::failed(["Odd formatting"], 0.5);
        let history = vec![
            ValidationResult::failed(["odd formatting."], 0.4),
            ValidationResult::failed(["Something else"], 0.4),
            ValidationResult::failed(["Odd formatting"], 0.6),
        ];

        let action = strategist
            .analyze_failure(&result, &history, &[])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(action.metadata["recurrences"], 2);
    }

    #[tokio::test]
    async fn test_escalates_after_repeated_failures() {
        let (strategist, history) = strategist();
        let result = ValidationResult::failed(["Odd formatting"], 0.5);
        let class = issue_class(&result.issues);
        record_attempts(
            &history,
            &class,
            RecoveryStrategy::IncrementalFix,
            RecoveryOutcome::Failure,
            3,
        )
        .await;

        let action = strategist
            .analyze_failure(&result, &[], &[])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(action.strategy, RecoveryStrategy::ManualIntervention);
        assert_eq!(action.priority, 5);
        assert!(action.required_resources.is_empty());
        assert_eq!(action.metadata["escalated_from"], "incremental_fix");
    }

    #[tokio::test]
    async fn test_failed_rollbacks_go_to_manual() {
        let (strategist, history) = strategist();
        let result = ValidationResult::failed(["Graph inconsistent"], 0.9);
        let class = issue_class(&result.issues);
        record_attempts(
            &history,
            &class,
            RecoveryStrategy::Rollback,
            RecoveryOutcome::Failure,
            3,
        )
        .await;

        let action = strategist
            .analyze_failure(&result, &[], &[])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(action.strategy, RecoveryStrategy::ManualIntervention);
        assert_eq!(action.metadata["escalated_from"], "rollback");
    }

    #[tokio::test]
    async fn test_recent_success_prevents_escalation() {
        let (strategist, history) = strategist();
        let result = ValidationResult::failed(["Odd formatting"], 0.5);
        let class = issue_class(&result.issues);
        record_attempts(
            &history,
            &class,
            RecoveryStrategy::IncrementalFix,
            RecoveryOutcome::Failure,
            2,
        )
        .await;
        record_attempts(
            &history,
            &class,
            RecoveryStrategy::IncrementalFix,
            RecoveryOutcome::Success,
            1,
        )
        .await;

        let action = strategist
            .analyze_failure(&result, &[], &[])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(action.strategy, RecoveryStrategy::IncrementalFix);
        assert!(!action.metadata.contains_key("escalated_from"));
    }

    #[tokio::test]
    async fn test_failures_of_other_class_do_not_escalate() {
        let (strategist, history) = strategist();
        record_attempts(
            &history,
            "another-class",
            RecoveryStrategy::IncrementalFix,
            RecoveryOutcome::Failure,
            5,
        )
        .await;
        let result = ValidationResult::failed(["Odd formatting"], 0.5);

        let action = strategist
            .analyze_failure(&result, &[], &[])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(action.strategy, RecoveryStrategy::IncrementalFix);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RecoveryConfig {
            critical_failure_threshold: 1.5,
            ..Default::default()
        };
        assert!(RecoveryStrategist::new(config, Arc::new(InMemoryRecoveryHistory::new())).is_err());
    }
}
