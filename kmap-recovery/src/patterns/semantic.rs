//! Semantic pattern detection
//!
//! Embeds every issue occurrence in the history and clusters the embeddings.
//! Each dense cluster becomes a SEMANTIC pattern describing issues that are
//! worded differently but mean the same thing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::config::PatternConfig;
use crate::error::Result;
use crate::types::{Pattern, PatternMetadata, PatternType, ValidationResult};

use super::clustering::{Clusterer, Dbscan, DistanceMetric};
use super::embedder::EmbeddingProvider;
use super::significance::{PatternCandidate, score};

/// Issue texts shown in a pattern description before truncating
const DESCRIPTION_SAMPLE: usize = 5;

/// One issue occurrence with its embedding
struct Point<'a> {
    text: &'a str,
    timestamp: DateTime<Utc>,
    vector: Arc<Vec<f32>>,
}

/// Clusters issue descriptions by embedding similarity
pub struct SemanticDetector {
    config: PatternConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    clusterer: Arc<dyn Clusterer>,
}

impl SemanticDetector {
    /// Create a detector using DBSCAN
    pub fn new(config: PatternConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            embedder,
            clusterer: Arc::new(Dbscan),
        })
    }

    /// Substitute the clustering algorithm
    #[must_use]
    pub fn with_clusterer(mut self, clusterer: Arc<dyn Clusterer>) -> Self {
        self.clusterer = clusterer;
        self
    }

    /// Metric used for clustering: the configured override or the provider's
    pub fn metric(&self) -> DistanceMetric {
        self.config.metric.unwrap_or_else(|| self.embedder.metric())
    }

    /// Detect semantic patterns in a history snapshot
    ///
    /// Issues that fail to embed are skipped. Returns an empty list when fewer
    /// than `min_samples` issues remain.
    #[instrument(skip_all, fields(results = history.len()))]
    pub async fn detect(&self, history: &[ValidationResult]) -> Vec<Pattern> {
        let mut occurrences: Vec<(&str, DateTime<Utc>)> = history
            .iter()
            .flat_map(|r| r.issues.iter().map(move |i| (i.as_str(), r.timestamp)))
            .collect();

        if occurrences.len() < self.config.min_samples {
            debug!(
                occurrences = occurrences.len(),
                "Too few issues for clustering"
            );
            return Vec::new();
        }

        // Canonical order makes clustering independent of input order
        occurrences.sort();

        let embeddings = self.embed_distinct(&occurrences).await;
        let points: Vec<Point<'_>> = occurrences
            .iter()
            .filter_map(|(text, timestamp)| {
                embeddings.get(text).map(|vector| Point {
                    text: *text,
                    timestamp: *timestamp,
                    vector: Arc::clone(vector),
                })
            })
            .collect();

        if points.len() < self.config.min_samples {
            debug!(points = points.len(), "Too few embeddable issues");
            return Vec::new();
        }

        let metric = self.metric();
        let vectors: Vec<Vec<f32>> = points.iter().map(|p| p.vector.to_vec()).collect();
        let assignment =
            self.clusterer
                .cluster(&vectors, self.config.eps, self.config.min_samples, metric);

        let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, label) in assignment.iter().enumerate() {
            if let Some(label) = label {
                clusters.entry(*label).or_default().push(idx);
            }
        }

        let mut patterns: Vec<Pattern> = clusters
            .into_values()
            .filter(|members| members.len() >= self.config.min_samples)
            .map(|members| self.build_pattern(&points, &members, metric))
            .collect();

        patterns.sort_by(|a, b| a.related_issues.first().cmp(&b.related_issues.first()));
        debug!(patterns = patterns.len(), "Semantic detection complete");
        patterns
    }

    /// Embed each distinct issue text once, dropping failures and vectors
    /// whose dimension disagrees with the majority
    async fn embed_distinct<'a>(
        &self,
        occurrences: &[(&'a str, DateTime<Utc>)],
    ) -> HashMap<&'a str, Arc<Vec<f32>>> {
        let distinct: BTreeSet<&str> = occurrences.iter().map(|(text, _)| *text).collect();

        let mut embedded: Vec<(&str, Vec<f32>)> = Vec::with_capacity(distinct.len());
        for text in distinct {
            match self.embedder.embed(text).await {
                Ok(vector) if !vector.is_empty() => embedded.push((text, vector)),
                Ok(_) => warn!(issue = text, "Excluding issue with empty embedding"),
                Err(e) => warn!(issue = text, error = %e, "Excluding unembeddable issue"),
            }
        }

        let mut dims: BTreeMap<usize, usize> = BTreeMap::new();
        for (_, vector) in &embedded {
            *dims.entry(vector.len()).or_default() += 1;
        }
        let Some(dimension) = dims
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(dim, _)| *dim)
        else {
            return HashMap::new();
        };

        embedded
            .into_iter()
            .filter_map(|(text, vector)| {
                if vector.len() == dimension {
                    Some((text, Arc::new(vector)))
                } else {
                    warn!(
                        issue = text,
                        expected = dimension,
                        actual = vector.len(),
                        "Excluding issue with mismatched embedding dimension"
                    );
                    None
                }
            })
            .collect()
    }

    fn build_pattern(
        &self,
        points: &[Point<'_>],
        members: &[usize],
        metric: DistanceMetric,
    ) -> Pattern {
        let related: BTreeSet<String> = members
            .iter()
            .map(|&i| points[i].text.to_string())
            .collect();

        let first_seen = members
            .iter()
            .map(|&i| points[i].timestamp)
            .min()
            .unwrap_or_else(Utc::now);
        let last_seen = members
            .iter()
            .map(|&i| points[i].timestamp)
            .max()
            .unwrap_or(first_seen);

        let average_similarity = average_pairwise_similarity(points, members, metric);
        let significance = score(&PatternCandidate::Semantic {
            occurrences: members.len(),
            total_occurrences: points.len(),
            average_similarity,
        });

        Pattern {
            pattern_type: PatternType::Semantic,
            description: describe(&related),
            significance,
            occurrences: members.len(),
            first_seen,
            last_seen,
            related_issues: related,
            metadata: PatternMetadata::Semantic {
                cluster_size: members.len(),
                average_similarity,
            },
        }
    }
}

fn average_pairwise_similarity(
    points: &[Point<'_>],
    members: &[usize],
    metric: DistanceMetric,
) -> f64 {
    let mut total = 0.0f64;
    let mut pairs = 0usize;
    for (n, &i) in members.iter().enumerate() {
        for &j in &members[n + 1..] {
            total += f64::from(metric.similarity(&points[i].vector, &points[j].vector));
            pairs += 1;
        }
    }

    if pairs == 0 {
        1.0
    } else {
        (total / pairs as f64).clamp(0.0, 1.0)
    }
}

fn describe(related: &BTreeSet<String>) -> String {
    let sample: Vec<&str> = related
        .iter()
        .take(DESCRIPTION_SAMPLE)
        .map(String::as_str)
        .collect();
    let mut description = format!("Similar issues: {}", sample.join(", "));
    if related.len() > DESCRIPTION_SAMPLE {
        description.push_str(&format!(" (+{} more)", related.len() - DESCRIPTION_SAMPLE));
    }
    description
}
