//! Pattern detection over validation history
//!
//! Two detectors look at the same immutable history snapshot:
//!
//! ```text
//! ValidationResult[] ──┬──> SemanticDetector ──> embed ─> cluster ─┐
//!                      │                                           ├─> Pattern[]
//!                      └──> TemporalDetector ──> stream ─> windows ┘
//! ```
//!
//! Each detected pattern carries a significance score from [`significance`].
//! [`PatternAnalyzer`] runs both detectors and filters on significance.

pub mod analyzer;
pub mod clustering;
pub mod embedder;
pub mod semantic;
pub mod significance;
pub mod temporal;

pub use analyzer::PatternAnalyzer;
pub use clustering::{Clusterer, Dbscan, DistanceMetric};
pub use embedder::{
    DEFAULT_HASH_DIMENSIONS, EmbedderError, EmbedderResult, EmbeddingProvider, HashingEmbedder,
    cosine_similarity,
};
pub use semantic::SemanticDetector;
pub use significance::{PatternCandidate, score};
pub use temporal::TemporalDetector;
