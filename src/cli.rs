//! Command-line interface for dataspy

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dataspy")]
#[command(about = "Compare a development schema against production: summary, column and row diffs")]
#[command(version)]
pub struct Cli {
    /// Development database to compare
    pub database: String,

    /// Development schema to compare
    pub schema: String,

    /// Table name pattern, matched against the whole name, case-insensitive
    #[arg(long)]
    pub regex: Option<String>,

    /// Diff tier: "all", "summary", "column", or "row"
    #[arg(long, default_value = "all")]
    pub tier: String,

    /// Output format: "pretty", "json"
    #[arg(long, default_value = "pretty")]
    pub format: String,

    /// Also write the full JSON report to this file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Maximum number of concurrent queries (must be > 0)
    #[arg(long, value_parser = validate_positive)]
    pub concurrency: Option<usize>,

    /// Per-query timeout in seconds (must be > 0)
    #[arg(long, value_parser = validate_positive)]
    pub query_timeout: Option<usize>,

    /// Do not write data_diff_summary / data_diff_column_level into the dev schema
    #[arg(long)]
    pub no_writeback: bool,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Which diff tiers to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    All,
    Summary,
    Column,
    Row,
}

impl Tier {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "summary" => Ok(Self::Summary),
            "column" => Ok(Self::Column),
            "row" => Ok(Self::Row),
            _ => Err(format!(
                "Invalid tier: {}. Use 'all', 'summary', 'column', or 'row'",
                s
            )),
        }
    }

    pub fn includes_summary(&self) -> bool {
        matches!(self, Self::All | Self::Summary)
    }

    pub fn includes_column(&self) -> bool {
        matches!(self, Self::All | Self::Column)
    }

    pub fn includes_row(&self) -> bool {
        matches!(self, Self::All | Self::Row)
    }
}

/// Parse output format string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {}. Use 'pretty' or 'json'", s)),
        }
    }
}

fn validate_positive(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("Invalid value: '{}'. Must be a positive integer.", s))?;

    if value == 0 {
        return Err("Value must be greater than 0".to_string());
    }

    Ok(value)
}
