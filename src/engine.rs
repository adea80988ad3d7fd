//! Per-table diff pipelines and batch orchestration

use crate::aggregate::{concat_tables, ColumnDiffRecord, RowDiffSummary, SummaryDiffRecord};
use crate::config::{DiffConfig, SchemaLocation};
use crate::error::{DataSpyError, Result};
use crate::executor::{DiffExecutor, QueryContext};
use crate::ident::Ident;
use crate::metadata::{FreshnessKeys, IdentityKeys, MetadataResolver, TableIdentity};
use crate::planner;
use crate::query::{self, SideLabels};
use crate::store::{CancelFlag, Store, Table};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Called once per table when its pipeline finishes, successfully or not
pub type TableCallback<'c> = Option<&'c (dyn Fn(&str) + Sync)>;

/// Result of one tier for one table
#[derive(Debug)]
pub struct TableOutcome<T> {
    pub table: String,
    pub result: Result<T>,
}

/// Every table's outcome for one tier, in table order
#[derive(Debug)]
pub struct BatchReport<T> {
    pub outcomes: Vec<TableOutcome<T>>,
}

impl<T> BatchReport<T> {
    pub fn successes(&self) -> impl Iterator<Item = (&str, &T)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|v| (o.table.as_str(), v)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DataSpyError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.table.as_str(), e)))
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.result.is_err())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

impl<T: Clone> BatchReport<Vec<T>> {
    /// Successful results flattened in table order
    pub fn flattened(&self) -> Vec<T> {
        self.successes()
            .flat_map(|(_, records)| records.iter().cloned())
            .collect()
    }
}

/// Compares one dev schema against the configured prod schema
pub struct DiffEngine<'a> {
    executor: DiffExecutor<'a>,
    config: &'a DiffConfig,
    dev: SchemaLocation,
    pool: ThreadPool,
}

impl<'a> DiffEngine<'a> {
    pub fn new(
        store: &'a dyn Store,
        config: &'a DiffConfig,
        dev: SchemaLocation,
        cancel: CancelFlag,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.max_concurrency.max(1))
            .thread_name(|i| format!("dataspy-worker-{}", i))
            .build()
            .map_err(|e| DataSpyError::config(format!("Failed to start worker pool: {}", e)))?;

        Ok(Self {
            executor: DiffExecutor::new(store, cancel),
            config,
            dev,
            pool,
        })
    }

    pub fn dev(&self) -> &SchemaLocation {
        &self.dev
    }

    fn resolver(&self) -> MetadataResolver<'_> {
        MetadataResolver::new(&self.executor, &self.config.catalog)
    }

    fn identities(&self, table: &Ident) -> (TableIdentity, TableIdentity) {
        (
            TableIdentity::new(&self.dev, table.clone()),
            TableIdentity::new(&self.config.prod, table.clone()),
        )
    }

    /// Tables in both schemas matching the configured pattern
    pub fn tables_to_compare(&self) -> Result<Vec<Ident>> {
        let tables = self.resolver().tables_to_compare(
            &self.dev,
            &self.config.prod,
            &self.config.table_regex,
        )?;
        log::info!(
            "Comparing {} table(s): {}",
            tables.len(),
            tables.iter().map(Ident::as_str).collect::<Vec<_>>().join(", ")
        );
        Ok(tables)
    }

    /// Catalog keys are declared once per model and apply to both sides
    fn identity_keys(&self, prod: &TableIdentity) -> Result<IdentityKeys> {
        self.resolver().resolve_identity_keys(prod)
    }

    fn freshness<'k>(&self, keys: &'k IdentityKeys) -> FreshnessKeys<'k> {
        FreshnessKeys {
            dev: &keys.freshness_key,
            prod: &keys.freshness_key,
            cutoff: self.config.freshness_cutoff,
        }
    }

    /// Row, column and distinct-key counts for one table
    pub fn summary_for_table(&self, table: &Ident) -> Result<SummaryDiffRecord> {
        let (dev, prod) = self.identities(table);
        let keys = self.identity_keys(&prod)?;
        let freshness = self.freshness(&keys);

        let sql = query::build_summary_query(
            &dev,
            &prod,
            freshness,
            &keys.primary_key,
            &keys.primary_key,
        );
        let result = self.executor.fetch(QueryContext::table(table.as_str()), &sql)?;

        SummaryDiffRecord::from_table(&result)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                DataSpyError::query_execution(table.as_str(), None, "summary query returned no rows")
            })
    }

    /// Column statistics for every audited column, in plan order
    pub fn column_diff_for_table(&self, table: &Ident) -> Result<Vec<ColumnDiffRecord>> {
        let (dev, prod) = self.identities(table);
        let resolver = self.resolver();

        let keys = self.identity_keys(&prod)?;
        let audited = resolver.resolve_audited_columns(&prod)?;
        let dev_columns = resolver.describe_columns(&dev)?;
        let prod_columns = resolver.describe_columns(&prod)?;

        let specs = planner::plan(table.as_str(), &dev_columns, &prod_columns, &audited)?;
        if specs.is_empty() {
            log::info!("No audited columns to compare in {}", table);
            return Ok(Vec::new());
        }
        log::debug!("Planned {} column test(s) for {}", specs.len(), table);

        let labels = SideLabels::new(&dev, &prod)?;
        let freshness = self.freshness(&keys);

        let queries = specs
            .iter()
            .map(|spec| {
                query::build_column_test_query(&dev, &prod, spec, freshness, &labels)
                    .map(|sql| (spec, sql))
            })
            .collect::<Result<Vec<_>>>()?;

        // Indexed collect keeps plan order whatever order the queries finish in
        let parts = queries
            .par_iter()
            .map(|(spec, sql)| {
                self.executor
                    .fetch(QueryContext::column(table.as_str(), spec.column.as_str()), sql)
            })
            .collect::<Result<Vec<Table>>>()?;

        let combined = concat_tables(parts)?;
        ColumnDiffRecord::from_table(&combined, &labels)
    }

    /// Materialise `<table>_row_level_diff` in the dev schema and count its classes
    pub fn row_diff_for_table(&self, table: &Ident) -> Result<RowDiffSummary> {
        let (dev, prod) = self.identities(table);
        let resolver = self.resolver();

        let keys = self.identity_keys(&prod)?;
        let dev_columns = to_idents(resolver.describe_columns(&dev)?.keys())?;
        let prod_columns = to_idents(resolver.describe_columns(&prod)?.keys())?;
        let freshness = self.freshness(&keys);

        let row_diff = query::build_row_diff_query(
            &dev,
            &prod,
            &dev_columns,
            &prod_columns,
            &keys.primary_key,
            &keys.primary_key,
            freshness,
        )?;

        let ctx = QueryContext::table(table.as_str());
        self.executor.execute(ctx, &row_diff.sql)?;
        log::info!("Materialised {}", row_diff.target);

        let counts = self
            .executor
            .fetch(ctx, &query::build_row_diff_counts_query(&row_diff.target))?;
        RowDiffSummary::from_counts(table.as_str(), &row_diff.target, &counts)
    }

    pub fn summary_diff(
        &self,
        tables: &[Ident],
        on_done: TableCallback<'_>,
    ) -> Result<BatchReport<SummaryDiffRecord>> {
        self.run_batch("summary", tables, on_done, |t| self.summary_for_table(t))
    }

    pub fn column_level_diff(
        &self,
        tables: &[Ident],
        on_done: TableCallback<'_>,
    ) -> Result<BatchReport<Vec<ColumnDiffRecord>>> {
        self.run_batch("column-level", tables, on_done, |t| {
            self.column_diff_for_table(t)
        })
    }

    pub fn row_level_diff(
        &self,
        tables: &[Ident],
        on_done: TableCallback<'_>,
    ) -> Result<BatchReport<RowDiffSummary>> {
        self.run_batch("row-level", tables, on_done, |t| self.row_diff_for_table(t))
    }

    /// Replace `data_diff_summary` in the dev schema
    pub fn write_summary(&self, records: &[SummaryDiffRecord]) -> Result<()> {
        let sql = query::build_summary_writeback(&self.dev, records);
        self.executor
            .execute(QueryContext::table(query::SUMMARY_TABLE), &sql)?;
        log::info!(
            "Wrote {} summary row(s) to {}.{}.{}",
            records.len(),
            self.dev.database,
            self.dev.schema,
            query::SUMMARY_TABLE
        );
        Ok(())
    }

    /// Replace `data_diff_column_level` in the dev schema
    pub fn write_column_level(&self, records: &[ColumnDiffRecord]) -> Result<()> {
        let sql = query::build_column_writeback(&self.dev, records);
        self.executor
            .execute(QueryContext::table(query::COLUMN_LEVEL_TABLE), &sql)?;
        log::info!(
            "Wrote {} column-level row(s) to {}.{}.{}",
            records.len(),
            self.dev.database,
            self.dev.schema,
            query::COLUMN_LEVEL_TABLE
        );
        Ok(())
    }

    fn run_batch<T, F>(
        &self,
        tier: &str,
        tables: &[Ident],
        on_done: TableCallback<'_>,
        run: F,
    ) -> Result<BatchReport<T>>
    where
        T: Send,
        F: Fn(&Ident) -> Result<T> + Sync,
    {
        let outcomes: Vec<TableOutcome<T>> = self.pool.install(|| {
            tables
                .par_iter()
                .map(|table| {
                    log::info!("Running {} diff for {}", tier, table);
                    let result = run(table);

                    match &result {
                        Ok(_) => log::debug!("Finished {} diff for {}", tier, table),
                        Err(DataSpyError::Cancelled) => {}
                        Err(e) => log::warn!("{} diff failed for {}: {}", tier, table, e),
                    }
                    if let Some(callback) = on_done {
                        callback(table.as_str());
                    }

                    TableOutcome {
                        table: table.to_string(),
                        result,
                    }
                })
                .collect()
        });

        if let Some(fatal) = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err())
            .find(|e| e.is_batch_fatal())
        {
            log::error!("Aborting {} diff: {}", tier, fatal);
            return Err(match fatal {
                DataSpyError::Config { message } => DataSpyError::config(message.clone()),
                _ => DataSpyError::Cancelled,
            });
        }

        Ok(BatchReport { outcomes })
    }
}

fn to_idents<'s>(names: impl Iterator<Item = &'s String>) -> Result<Vec<Ident>> {
    names.map(|name| Ident::new(name.as_str())).collect()
}
