//! Store abstraction and tabular results

use crate::error::{DataSpyError, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A SQL store that executes query text
///
/// Implementations must be usable from several worker threads at once; each
/// call is one independent query.
pub trait Store: Send + Sync {
    /// Execute a statement that returns no rows
    fn execute(&self, sql: &str) -> Result<()>;

    /// Execute a query and return the first cell of the first row
    fn execute_scalar(&self, sql: &str) -> Result<Option<String>> {
        let table = self.execute_to_table(sql)?;
        Ok(table.rows.into_iter().next().and_then(|row| row.into_iter().next().flatten()))
    }

    /// Execute a query and collect its full result
    fn execute_to_table(&self, sql: &str) -> Result<Table>;
}

/// Ordered, named columns with stringified cells; `None` is SQL NULL
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Same as `column_index` but missing columns are an error
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            DataSpyError::data_processing(format!(
                "Result is missing column '{}' (has: {})",
                name,
                self.columns.join(", ")
            ))
        })
    }

    /// Cell value by row index and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// All values of one column, top to bottom
    pub fn column_values(&self, column: &str) -> Result<Vec<Option<String>>> {
        let idx = self.require_column(column)?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(idx).cloned().flatten())
            .collect())
    }

    /// Whether two tables have the same header, ignoring case
    pub fn same_shape(&self, other: &Table) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

/// Shared cancellation signal for in-flight and pending queries
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail fast once cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DataSpyError::Cancelled)
        } else {
            Ok(())
        }
    }
}
