pub mod analyze;
pub mod config;
pub mod recommend;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use kmap_recovery::ValidationResult;

/// Read a JSON array of validation results
pub(crate) fn read_results(path: &Path) -> Result<Vec<ValidationResult>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a JSON array of validation results", path.display()))
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
