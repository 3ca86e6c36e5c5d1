//! Recovery recommendation for a failed validation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use kmap_recovery::{
    DefaultHandler, HashingEmbedder, InMemoryRecoveryHistory, RecoveryAction, RecoveryManager,
    ValidationHistory, ValidationResult,
};

use super::read_results;
use crate::config::ConfigLoader;

#[derive(Args)]
pub struct RecommendArgs {
    /// JSON file holding an array of validation results
    pub history: PathBuf,

    /// JSON file holding the failed result (defaults to the newest failure in the history)
    #[arg(long)]
    pub failure: Option<PathBuf>,

    /// Output JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: RecommendArgs, explicit: Option<&Path>) -> Result<()> {
    let config = ConfigLoader::load(explicit)?;
    let history = ValidationHistory::from_results(
        config.history.clone(),
        read_results(&args.history)?,
    )?;
    let failure = match &args.failure {
        Some(path) => read_failure(path)?,
        None => newest_failure(history.results())?,
    };

    let manager = RecoveryManager::new(
        config,
        Arc::new(HashingEmbedder::default()),
        Arc::new(InMemoryRecoveryHistory::new()),
        Arc::new(DefaultHandler),
    )?;
    let action = manager
        .analyze_failure(&failure, &history.snapshot())
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&action)?);
        return Ok(());
    }

    match action {
        Some(action) => print_action(&action),
        None => println!("Result is valid, nothing to recover."),
    }
    Ok(())
}

fn read_failure(path: &Path) -> Result<ValidationResult> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a validation result", path.display()))
}

fn newest_failure(results: &[ValidationResult]) -> Result<ValidationResult> {
    match results.iter().rev().find(|r| !r.is_valid) {
        Some(result) => Ok(result.clone()),
        None => bail!("History contains no failed results; pass --failure"),
    }
}

fn print_action(action: &RecoveryAction) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Field").fg(Color::Cyan),
        Cell::new("Value").fg(Color::Cyan),
    ]);

    let resources = action
        .required_resources
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    table.add_row(vec![Cell::new("Strategy"), Cell::new(action.strategy)]);
    table.add_row(vec![Cell::new("Description"), Cell::new(&action.description)]);
    table.add_row(vec![Cell::new("Priority"), Cell::new(action.priority)]);
    table.add_row(vec![
        Cell::new("Estimated impact"),
        Cell::new(format!("{:.2}", action.estimated_impact)),
    ]);
    table.add_row(vec![Cell::new("Resources"), Cell::new(resources)]);
    table.add_row(vec![Cell::new("Issue class"), Cell::new(&action.issue_class)]);
    for (key, value) in &action.metadata {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }

    println!("{table}");
}
