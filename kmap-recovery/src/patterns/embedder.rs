//! Embedding providers for semantic issue clustering
//!
//! Provides the `EmbeddingProvider` trait the semantic detector consumes and
//! `HashingEmbedder`, a deterministic feature-hashing provider for offline use.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::clustering::DistanceMetric;

/// Errors that can occur during embedding operations
#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("Empty input text")]
    EmptyInput,

    #[error("Inference failed: {0}")]
    InferenceError(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Result type for embedder operations
pub type EmbedderResult<T> = Result<T, EmbedderError>;

/// Maps issue text to fixed-length vectors
///
/// The provider also declares which distance metric its vectors are meant to
/// be compared with; the semantic detector clusters with that metric unless
/// the configuration overrides it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> EmbedderResult<Vec<f32>>;

    /// Distance metric consistent with the generated vectors
    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }
}

/// Compute cosine similarity between two embedding vectors
///
/// Returns a value in [-1, 1] where 1 means identical direction.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Embedding dimensions must match");

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Default dimensionality for hashed embeddings
pub const DEFAULT_HASH_DIMENSIONS: usize = 256;

/// Feature-hashing embedder over word unigrams and bigrams.
///
/// Each token is hashed into one of `dimensions` buckets with a signed weight;
/// the resulting vector is L2-normalized, so cosine distance reflects shared
/// vocabulary. No model files are required.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        let value = u64::from_le_bytes(raw);
        let index = (value % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> EmbedderResult<Vec<f32>> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        if tokens.is_empty() {
            return Err(EmbedderError::EmptyInput);
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for token in &tokens {
            let (i, sign) = self.bucket(token);
            vector[i] += sign;
        }
        for pair in tokens.windows(2) {
            let (i, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[i] += 0.5 * sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }
}
