//! Command implementation for the dataspy CLI

use crate::cli::{Cli, OutputFormat, Tier};
use crate::config::{DiffConfig, SchemaLocation};
use crate::duckdb_store::DuckDbStore;
use crate::engine::DiffEngine;
use crate::error::{DataSpyError, Result};
use crate::output::{DiffReport, JsonFormatter, PrettyPrinter, TableFailure};
use crate::progress::ProgressReporter;
use crate::query;
use crate::store::{CancelFlag, Store};
use std::path::Path;
use std::time::Duration;

/// How a run ended, for the process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every table succeeded in every tier
    Clean,
    /// No table matched the pattern in both schemas
    NothingToCompare,
    /// At least one table failed in at least one tier
    TableFailures,
}

impl RunStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Clean | Self::NothingToCompare => 0,
            Self::TableFailures => 1,
        }
    }
}

/// Execute a diff run from parsed CLI arguments
pub fn execute_command(cli: &Cli) -> Result<RunStatus> {
    let tier = Tier::parse(&cli.tier).map_err(DataSpyError::config)?;
    let format = OutputFormat::parse(&cli.format).map_err(DataSpyError::config)?;

    let mut config = DiffConfig::from_env()?;
    apply_overrides(&mut config, cli);
    let dev = SchemaLocation::new(&cli.database, &cli.schema)?;

    let cancel = CancelFlag::new();
    let store = DuckDbStore::open(&config.store, cancel.clone())?;

    let mut progress = if cli.no_progress || format == OutputFormat::Json {
        ProgressReporter::new_minimal()
    } else {
        ProgressReporter::new_for_run()
    };

    let report = match run_diff(&store, &config, dev, tier, cancel, &mut progress) {
        Ok(report) => report,
        Err(DataSpyError::EmptyComparisonSet { pattern }) => {
            progress.finish_all("nothing to compare");
            log::info!("No tables matching '{}' to compare", pattern);
            return Ok(RunStatus::NothingToCompare);
        }
        Err(e) => return Err(e),
    };
    drop(progress);

    match format {
        OutputFormat::Pretty => PrettyPrinter::print_report(&report),
        OutputFormat::Json => println!("{}", JsonFormatter::format_report(&report)?),
    }

    if let Some(path) = &cli.output {
        write_report(&report, path)?;
    }

    Ok(if report.has_failures() {
        RunStatus::TableFailures
    } else {
        RunStatus::Clean
    })
}

/// CLI flags take precedence over the environment
pub fn apply_overrides(config: &mut DiffConfig, cli: &Cli) {
    if let Some(regex) = &cli.regex {
        config.table_regex = regex.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.set_max_concurrency(concurrency);
    }
    if let Some(secs) = cli.query_timeout {
        config.store.query_timeout = Duration::from_secs(secs as u64);
    }
    if cli.no_writeback {
        config.writeback = false;
    }
}

/// Run the selected tiers sequentially over every matching table
pub fn run_diff(
    store: &dyn Store,
    config: &DiffConfig,
    dev: SchemaLocation,
    tier: Tier,
    cancel: CancelFlag,
    progress: &mut ProgressReporter,
) -> Result<DiffReport> {
    let engine = DiffEngine::new(store, config, dev, cancel)?;

    let tables = engine.tables_to_compare()?;
    progress.finish_tables(&format!("{} table(s) to compare", tables.len()));

    let mut report = DiffReport::new(
        engine.dev(),
        &config.prod,
        tables.iter().map(|t| t.to_string()).collect(),
    );
    let total = tables.len() as u64;

    if tier.includes_summary() {
        progress.start_tier("summary", total);
        let batch = {
            let tick = |table: &str| progress.table_done(table);
            engine.summary_diff(&tables, Some(&tick))?
        };
        report.record_failures("summary", &batch);
        report.summary = batch.successes().map(|(_, r)| r.clone()).collect();

        if config.writeback {
            if let Err(e) = engine.write_summary(&report.summary) {
                report.failures.push(writeback_failure(query::SUMMARY_TABLE, &e));
            }
        }
    }

    if tier.includes_column() {
        progress.start_tier("column", total);
        let batch = {
            let tick = |table: &str| progress.table_done(table);
            engine.column_level_diff(&tables, Some(&tick))?
        };
        report.record_failures("column", &batch);
        report.column_level = batch.flattened();

        if config.writeback {
            if let Err(e) = engine.write_column_level(&report.column_level) {
                report
                    .failures
                    .push(writeback_failure(query::COLUMN_LEVEL_TABLE, &e));
            }
        }
    }

    if tier.includes_row() {
        progress.start_tier("row", total);
        let batch = {
            let tick = |table: &str| progress.table_done(table);
            engine.row_level_diff(&tables, Some(&tick))?
        };
        report.record_failures("row", &batch);
        report.row_level = batch.successes().map(|(_, r)| r.clone()).collect();
    }

    progress.finish_all("done");
    Ok(report)
}

fn writeback_failure(target: &str, error: &DataSpyError) -> TableFailure {
    log::error!("Failed to write {}: {}", target, error);
    TableFailure {
        tier: "writeback".to_string(),
        table: target.to_string(),
        error: error.to_string(),
    }
}

/// Save the JSON report to a file
pub fn write_report(report: &DiffReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, JsonFormatter::format_report(report)?)?;
    log::info!("Report written to {}", path.display());
    Ok(())
}
