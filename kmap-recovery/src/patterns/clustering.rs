//! Density-based clustering for issue embeddings
//!
//! Clustering sits behind the `Clusterer` trait so the semantic detector can
//! run with any algorithm that maps points to cluster assignments. `Dbscan`
//! is the default.


// =============================================================================
// Implementation
// =============================================================================

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::embedder::cosine_similarity;

/// Distance metric for clustering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean (L2) distance
    Euclidean,
    /// Cosine distance (1 - similarity)
    Cosine,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Cosine
    }
}

impl DistanceMetric {
    /// Distance between two vectors under this metric
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Euclidean => euclidean_distance(a, b),
            Self::Cosine => cosine_distance(a, b),
        }
    }

    /// Similarity in [0, 1] consistent with this metric
    ///
    /// Cosine similarity is clamped at zero; Euclidean maps distance `d` to
    /// `1 / (1 + d)`.
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
            Self::Cosine => cosine_similarity(a, b).clamp(0.0, 1.0),
        }
    }
}

/// Euclidean distance between two vectors
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same length");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Cosine distance (1 - similarity)
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Find all points within eps distance of query point (the point itself included)
pub fn region_query(
    query: &[f32],
    points: &[Vec<f32>],
    eps: f32,
    metric: DistanceMetric,
) -> Vec<usize> {
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| metric.distance(query, p) <= eps)
        .map(|(i, _)| i)
        .collect()
}

/// Assigns points to clusters
///
/// Returns one entry per input point: `Some(cluster)` with clusters numbered
/// from zero, or `None` for noise.
pub trait Clusterer: Send + Sync {
    fn cluster(
        &self,
        points: &[Vec<f32>],
        eps: f32,
        min_samples: usize,
        metric: DistanceMetric,
    ) -> Vec<Option<usize>>;
}

/// Classic DBSCAN
///
/// Core points (at least `min_samples` neighbors within `eps`, self included)
/// that are density-connected share a cluster. A border point joins the
/// cluster of its nearest core neighbor, so membership does not depend on
/// visiting order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dbscan;

impl Clusterer for Dbscan {
    fn cluster(
        &self,
        points: &[Vec<f32>],
        eps: f32,
        min_samples: usize,
        metric: DistanceMetric,
    ) -> Vec<Option<usize>> {
        let neighbors: Vec<Vec<usize>> = points
            .iter()
            .map(|p| region_query(p, points, eps, metric))
            .collect();
        let is_core: Vec<bool> = neighbors
            .iter()
            .map(|n| n.len() >= min_samples.max(1))
            .collect();

        let mut assignment: Vec<Option<usize>> = vec![None; points.len()];
        let mut next_cluster = 0;

        // Phase 1: connected components over core points
        for seed in 0..points.len() {
            if !is_core[seed] || assignment[seed].is_some() {
                continue;
            }

            assignment[seed] = Some(next_cluster);
            let mut queue = VecDeque::from([seed]);
            while let Some(idx) = queue.pop_front() {
                for &n in &neighbors[idx] {
                    if is_core[n] && assignment[n].is_none() {
                        assignment[n] = Some(next_cluster);
                        queue.push_back(n);
                    }
                }
            }
            next_cluster += 1;
        }

        // Phase 2: border points join their nearest core neighbor
        for idx in 0..points.len() {
            if is_core[idx] {
                continue;
            }
            assignment[idx] = neighbors[idx]
                .iter()
                .filter(|&&n| is_core[n])
                .map(|&n| (metric.distance(&points[idx], &points[n]), n))
                .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
                .and_then(|(_, n)| assignment[n]);
        }

        assignment
    }
}
