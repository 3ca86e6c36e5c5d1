//! Pattern, category and trend analysis over a validation history file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use kmap_recovery::{
    CategoryBreakdown, HashingEmbedder, HistoryStats, Pattern, PatternAnalyzer, TrendReport,
    ValidationHistory,
};
use tracing::debug;

use super::{format_timestamp, read_results};
use crate::config::ConfigLoader;

#[derive(Args)]
pub struct AnalyzeArgs {
    /// JSON file holding an array of validation results
    pub history: PathBuf,

    /// Minimum significance to report (defaults to patterns.min_significance)
    #[arg(long)]
    pub min_significance: Option<f64>,

    /// Number of most common issues to list
    #[arg(long, default_value = "5")]
    pub top: usize,

    /// Output JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: AnalyzeArgs, explicit: Option<&Path>) -> Result<()> {
    let config = ConfigLoader::load(explicit)?;
    let results = read_results(&args.history)?;
    debug!(results = results.len(), "Loaded validation history");

    let history = ValidationHistory::from_results(config.history.clone(), results)?;
    let min_significance = args
        .min_significance
        .unwrap_or(config.patterns.min_significance);
    let analyzer = PatternAnalyzer::new(config.patterns, Arc::new(HashingEmbedder::default()))?;
    let patterns = analyzer
        .analyze(&history.snapshot(), min_significance)
        .await?;
    let stats = history.stats(args.top);
    let categories = history.issue_categories();
    let trends = history.detect_trends();

    if args.json {
        let output = serde_json::json!({
            "stats": stats,
            "categories": categories,
            "trends": trends,
            "patterns": patterns,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_stats(&stats);
    println!();
    print_categories(&categories, &trends);
    print_alerts(&trends);
    println!();
    print_patterns(&patterns);
    Ok(())
}

fn print_stats(stats: &HistoryStats) {
    println!(
        "{} results, {} failed ({:.0}%)",
        stats.total,
        stats.failed,
        stats.failure_rate * 100.0
    );
    if let Some(confidence) = stats.average_confidence {
        println!("Average confidence: {confidence:.2}");
    }
    if !stats.common_issues.is_empty() {
        println!("Most common issues:");
        for (issue, count) in &stats.common_issues {
            println!("  {count:>4}  {issue}");
        }
    }
}

fn print_categories(breakdown: &CategoryBreakdown, trends: &TrendReport) {
    println!(
        "Confidence trend: {}, failure rate trend: {}",
        trends.confidence, trends.failure_rate
    );

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Category").fg(Color::Cyan),
        Cell::new("Issues").fg(Color::Cyan),
        Cell::new("Trend").fg(Color::Cyan),
    ]);

    for (category, count) in &breakdown.categories {
        let trend = trends
            .issues
            .get(category)
            .map(|t| t.as_str())
            .unwrap_or("-");
        table.add_row(vec![
            Cell::new(category),
            Cell::new(count),
            Cell::new(trend),
        ]);
    }

    println!("{table}");
}

fn print_alerts(trends: &TrendReport) {
    for alert in &trends.alerts {
        println!("! {alert}");
    }
}

fn print_patterns(patterns: &[Pattern]) {
    if patterns.is_empty() {
        println!("No patterns detected.");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Type").fg(Color::Cyan),
        Cell::new("Description").fg(Color::Cyan),
        Cell::new("Significance").fg(Color::Cyan),
        Cell::new("Occurrences").fg(Color::Cyan),
        Cell::new("First seen").fg(Color::Cyan),
        Cell::new("Last seen").fg(Color::Cyan),
    ]);

    for pattern in patterns {
        table.add_row(vec![
            Cell::new(pattern.pattern_type),
            Cell::new(&pattern.description),
            Cell::new(format!("{:.2}", pattern.significance)),
            Cell::new(pattern.occurrences),
            Cell::new(format_timestamp(pattern.first_seen)),
            Cell::new(format_timestamp(pattern.last_seen)),
        ]);
    }

    println!("{table}");
}
