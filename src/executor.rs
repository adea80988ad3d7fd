//! Query dispatch with table/column context

use crate::error::{DataSpyError, Result};
use crate::store::{CancelFlag, Store, Table};

/// What a query is about, for error reports and logs
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    pub table: &'a str,
    pub column: Option<&'a str>,
}

impl<'a> QueryContext<'a> {
    pub fn table(table: &'a str) -> Self {
        Self {
            table,
            column: None,
        }
    }

    pub fn column(table: &'a str, column: &'a str) -> Self {
        Self {
            table,
            column: Some(column),
        }
    }

    fn wrap(&self, error: DataSpyError) -> DataSpyError {
        match error {
            DataSpyError::Cancelled
            | DataSpyError::QueryTimeout { .. }
            | DataSpyError::QueryExecution { .. } => error,
            other => DataSpyError::query_execution(self.table, self.column, other.to_string()),
        }
    }
}

/// Submits rendered SQL to the store; owns no diff logic
pub struct DiffExecutor<'a> {
    store: &'a dyn Store,
    cancel: CancelFlag,
}

impl<'a> DiffExecutor<'a> {
    pub fn new(store: &'a dyn Store, cancel: CancelFlag) -> Self {
        Self { store, cancel }
    }

    pub fn execute(&self, ctx: QueryContext<'_>, sql: &str) -> Result<()> {
        self.cancel.check()?;
        log::debug!("Executing for {}:\n{}", ctx.table, sql);
        self.store.execute(sql).map_err(|e| ctx.wrap(e))
    }

    pub fn fetch_scalar(&self, ctx: QueryContext<'_>, sql: &str) -> Result<Option<String>> {
        self.cancel.check()?;
        log::debug!("Querying scalar for {}:\n{}", ctx.table, sql);
        self.store.execute_scalar(sql).map_err(|e| ctx.wrap(e))
    }

    pub fn fetch(&self, ctx: QueryContext<'_>, sql: &str) -> Result<Table> {
        self.cancel.check()?;
        log::debug!(
            "Querying for {}{}:\n{}",
            ctx.table,
            ctx.column.map(|c| format!(".{}", c)).unwrap_or_default(),
            sql
        );
        self.store.execute_to_table(sql).map_err(|e| ctx.wrap(e))
    }
}
