//! Recovery manager facade
//!
//! Wires the pattern analyzer, strategist and executor together for the
//! common flow: a validation failed, decide what to do, then do it.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::KmapConfig;
use crate::error::Result;
use crate::patterns::{EmbeddingProvider, PatternAnalyzer};
use crate::recovery::{
    RecoveryContext, RecoveryExecutor, RecoveryHistory, RecoveryStrategist, StrategyHandler,
};
use crate::types::{Pattern, RecoveryAction, ValidationResult};

/// An action together with whether executing it succeeded
#[derive(Debug, Clone)]
pub struct HandledFailure {
    pub action: RecoveryAction,
    pub succeeded: bool,
}

pub struct RecoveryManager {
    config: KmapConfig,
    analyzer: PatternAnalyzer,
    strategist: RecoveryStrategist,
    executor: RecoveryExecutor,
}

impl RecoveryManager {
    pub fn new(
        config: KmapConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        history: Arc<dyn RecoveryHistory>,
        handler: Arc<dyn StrategyHandler>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            analyzer: PatternAnalyzer::new(config.patterns.clone(), embedder)?,
            strategist: RecoveryStrategist::new(config.recovery.clone(), Arc::clone(&history))?,
            executor: RecoveryExecutor::new(config.recovery.clone(), history)?
                .with_handler(handler),
            config,
        })
    }

    pub fn analyzer(&self) -> &PatternAnalyzer {
        &self.analyzer
    }

    pub fn strategist(&self) -> &RecoveryStrategist {
        &self.strategist
    }

    pub fn executor(&self) -> &RecoveryExecutor {
        &self.executor
    }

    pub fn history(&self) -> &Arc<dyn RecoveryHistory> {
        self.executor.history()
    }

    /// Patterns significant enough to drive strategy selection
    pub async fn significant_patterns(&self, history: &[ValidationResult]) -> Result<Vec<Pattern>> {
        self.analyzer
            .analyze(history, self.config.recovery.pattern_significance_threshold)
            .await
    }

    /// Recommend an action for a failure without executing it
    pub async fn analyze_failure(
        &self,
        result: &ValidationResult,
        history: &[ValidationResult],
    ) -> Result<Option<RecoveryAction>> {
        let patterns = self.significant_patterns(history).await?;
        self.strategist
            .analyze_failure(result, history, &patterns)
            .await
    }

    /// Recommend and execute an action for a failure.
    ///
    /// Returns `None` when the result is valid.
    #[instrument(skip_all, fields(issues = result.issues.len()))]
    pub async fn handle_failure(
        &self,
        result: &ValidationResult,
        history: &[ValidationResult],
        context: &RecoveryContext,
    ) -> Result<Option<HandledFailure>> {
        let Some(action) = self.analyze_failure(result, history).await? else {
            return Ok(None);
        };

        let succeeded = self.executor.execute_recovery(&action, context).await?;
        info!(strategy = %action.strategy, succeeded, "Failure handled");
        Ok(Some(HandledFailure { action, succeeded }))
    }
}
