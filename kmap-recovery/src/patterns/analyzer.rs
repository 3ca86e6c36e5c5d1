//! Runs both pattern detectors over a history snapshot

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::PatternConfig;
use crate::error::{KmapError, Result};
use crate::types::{Pattern, ValidationResult};

use super::clustering::Clusterer;
use super::embedder::EmbeddingProvider;
use super::semantic::SemanticDetector;
use super::temporal::TemporalDetector;

/// Combines semantic and temporal detection with a significance filter
pub struct PatternAnalyzer {
    semantic: SemanticDetector,
    temporal: TemporalDetector,
    min_significance: f64,
}

impl PatternAnalyzer {
    pub fn new(config: PatternConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let min_significance = config.min_significance;
        Ok(Self {
            temporal: TemporalDetector::new(config.clone())?,
            semantic: SemanticDetector::new(config, embedder)?,
            min_significance,
        })
    }

    /// Substitute the clustering algorithm used by the semantic detector
    #[must_use]
    pub fn with_clusterer(mut self, clusterer: Arc<dyn Clusterer>) -> Self {
        self.semantic = self.semantic.with_clusterer(clusterer);
        self
    }

    /// Analyze with the configured default significance filter
    pub async fn analyze_default(&self, history: &[ValidationResult]) -> Vec<Pattern> {
        self.detect_filtered(history, self.min_significance).await
    }

    /// Patterns with significance at or above `min_significance`, semantic
    /// patterns first
    #[instrument(skip(self, history), fields(results = history.len()))]
    pub async fn analyze(
        &self,
        history: &[ValidationResult],
        min_significance: f64,
    ) -> Result<Vec<Pattern>> {
        if !min_significance.is_finite() || !(0.0..=1.0).contains(&min_significance) {
            return Err(KmapError::Config(format!(
                "min_significance must be within [0, 1], got {min_significance}"
            )));
        }
        Ok(self.detect_filtered(history, min_significance).await)
    }

    async fn detect_filtered(
        &self,
        history: &[ValidationResult],
        min_significance: f64,
    ) -> Vec<Pattern> {
        let mut patterns = self.semantic.detect(history).await;
        patterns.extend(self.temporal.detect(history));

        let found = patterns.len();
        patterns.retain(|p| p.significance >= min_significance);
        info!(
            found,
            kept = patterns.len(),
            min_significance,
            "Pattern analysis complete"
        );
        patterns
    }
}
