//! Error types for kmap-recovery

use thiserror::Error;

/// Error type for analysis and recovery operations
#[derive(Debug, Error)]
pub enum KmapError {
    /// Configuration rejected during validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A resource named by the action is absent from the recovery context
    #[error("Missing required resource: {resource}")]
    MissingResource {
        /// Name of the absent resource
        resource: String,
    },

    /// Recovery was cancelled before it started executing
    #[error("Recovery cancelled before execution")]
    Cancelled,

    /// Recovery exceeded the configured execution ceiling
    #[error("Recovery timed out after {0}s")]
    ExecutionTimeout(u64),

    /// Recovery history store operation failed
    #[error("History error: {0}")]
    History(String),

    /// Resource lock could not be acquired
    #[error("Lock error: {0}")]
    Lock(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KmapError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for KmapError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for kmap operations
pub type Result<T> = std::result::Result<T, KmapError>;
