//! Output formatting utilities

use crate::aggregate::{ColumnDiffRecord, RowDiffSummary, SummaryDiffRecord};
use crate::config::SchemaLocation;
use crate::engine::BatchReport;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One failed table in one tier
#[derive(Debug, Clone, Serialize)]
pub struct TableFailure {
    pub tier: String,
    pub table: String,
    pub error: String,
}

/// Everything one run produced, as written to `--output`
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub dev: String,
    pub prod: String,
    pub tables: Vec<String>,
    pub summary: Vec<SummaryDiffRecord>,
    pub column_level: Vec<ColumnDiffRecord>,
    pub row_level: Vec<RowDiffSummary>,
    pub failures: Vec<TableFailure>,
}

impl DiffReport {
    pub fn new(dev: &SchemaLocation, prod: &SchemaLocation, tables: Vec<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            dev: format!("{}.{}", dev.database, dev.schema),
            prod: format!("{}.{}", prod.database, prod.schema),
            tables,
            summary: Vec::new(),
            column_level: Vec::new(),
            row_level: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Move failures of a tier into the report
    pub fn record_failures<T>(&mut self, tier: &str, batch: &BatchReport<T>) {
        self.failures
            .extend(batch.failures().map(|(table, error)| TableFailure {
                tier: tier.to_string(),
                table: table.to_string(),
                error: error.to_string(),
            }));
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Pretty printer for dataspy output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print the run header
    pub fn print_run_header(report: &DiffReport) {
        println!("🔍 Data Diff: {} → {}", report.prod, report.dev);
        println!("├─ Run: {}", report.run_id);
        println!("└─ Tables: {}", report.tables.join(", "));
    }

    /// Print summary diff records
    pub fn print_summary(records: &[SummaryDiffRecord]) {
        if records.is_empty() {
            return;
        }

        println!("📊 Summary Diff:");
        for (i, record) in records.iter().enumerate() {
            let last = i == records.len() - 1;
            let (prefix, child) = if last { ("└─", "   ") } else { ("├─", "│  ") };
            let status = if record.is_identical() { "✅" } else { "❌" };

            println!("{} {} {}", prefix, status, record.table_name);
            println!(
                "{}├─ Rows: {} → {} ({})",
                child,
                record.rowcount_prod,
                record.rowcount_dev,
                format_ratio(record.rowcount_diff_pct)
            );
            println!(
                "{}├─ Columns: {} → {} ({})",
                child,
                record.column_count_prod,
                record.column_count_dev,
                format_ratio(record.column_count_diff_pct)
            );
            println!(
                "{}└─ Distinct keys: {} → {} ({})",
                child,
                record.distinct_pkey_prod,
                record.distinct_pkey_dev,
                format_ratio(record.distinct_pkey_diff_pct)
            );
        }
    }

    /// Print column-level diff records grouped by table
    pub fn print_column_level(records: &[ColumnDiffRecord]) {
        if records.is_empty() {
            return;
        }

        println!("📈 Column-Level Diff:");
        let mut current_table: Option<&str> = None;
        for (i, record) in records.iter().enumerate() {
            if current_table != Some(record.table_name.as_str()) {
                println!("├─ {}", record.table_name);
                current_table = Some(record.table_name.as_str());
            }

            let next_same_table = records
                .get(i + 1)
                .map(|next| next.table_name == record.table_name)
                .unwrap_or(false);
            let prefix = if next_same_table { "│  ├─" } else { "│  └─" };
            let status = if record.values_match() { "✅" } else { "❌" };

            println!(
                "{} {} {}.{}: {}={} {}={} diff={}",
                prefix,
                status,
                record.column_name,
                record.test_name,
                record.prod_label,
                record.prod_value.as_deref().unwrap_or("NULL"),
                record.dev_label,
                record.dev_value.as_deref().unwrap_or("NULL"),
                record
                    .diff
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "NULL".to_string())
            );
        }
    }

    /// Print row-level diff summaries
    pub fn print_row_level(summaries: &[RowDiffSummary]) {
        if summaries.is_empty() {
            return;
        }

        println!("🧾 Row-Level Diff:");
        for (i, summary) in summaries.iter().enumerate() {
            let prefix = if i == summaries.len() - 1 { "└─" } else { "├─" };
            let status = if summary.has_changes() { "❌" } else { "✅" };
            println!(
                "{} {} {}: +{} added, -{} deleted, {} matched → {}",
                prefix,
                status,
                summary.table_name,
                summary.additions,
                summary.deletions,
                summary.equal,
                summary.target
            );
        }
    }

    /// Print per-table failures
    pub fn print_failures(failures: &[TableFailure]) {
        if failures.is_empty() {
            return;
        }

        println!("⚠️  Failures:");
        for (i, failure) in failures.iter().enumerate() {
            let prefix = if i == failures.len() - 1 { "└─" } else { "├─" };
            println!("{} [{}] {}: {}", prefix, failure.tier, failure.table, failure.error);
        }
    }

    /// Print the whole report
    pub fn print_report(report: &DiffReport) {
        Self::print_run_header(report);
        Self::print_summary(&report.summary);
        Self::print_column_level(&report.column_level);
        Self::print_row_level(&report.row_level);
        Self::print_failures(&report.failures);
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format any serializable data as JSON
    pub fn format<T: serde::Serialize + ?Sized>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }

    /// Format a run report as JSON
    pub fn format_report(report: &DiffReport) -> Result<String> {
        Self::format(report)
    }
}

/// Render a fractional delta as a signed percentage
fn format_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) => format!("{:+.1}%", r * 100.0),
        None => "n/a".to_string(),
    }
}
