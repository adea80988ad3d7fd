//! Typed diff records built from query results

use crate::error::{DataSpyError, Result};
use crate::metadata::TableIdentity;
use crate::query::SideLabels;
use crate::store::Table;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema-level counts and ratios for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDiffRecord {
    pub table_name: String,
    pub rowcount_dev: i64,
    pub rowcount_prod: i64,
    pub rowcount_diff_pct: Option<f64>,
    pub column_count_dev: i64,
    pub column_count_prod: i64,
    pub column_count_diff_pct: Option<f64>,
    pub distinct_pkey_dev: i64,
    pub distinct_pkey_prod: i64,
    pub distinct_pkey_diff_pct: Option<f64>,
}

impl SummaryDiffRecord {
    pub fn from_table(table: &Table) -> Result<Vec<Self>> {
        let mut records = Vec::with_capacity(table.row_count());

        for row in 0..table.row_count() {
            records.push(Self {
                table_name: required_text(table, row, "table_name")?,
                rowcount_dev: required_int(table, row, "rowcount_dev")?,
                rowcount_prod: required_int(table, row, "rowcount_prod")?,
                rowcount_diff_pct: optional_float(table, row, "rowcount_diff_pct")?,
                column_count_dev: required_int(table, row, "column_count_dev")?,
                column_count_prod: required_int(table, row, "column_count_prod")?,
                column_count_diff_pct: optional_float(table, row, "column_count_diff_pct")?,
                distinct_pkey_dev: required_int(table, row, "distinct_pkey_dev")?,
                distinct_pkey_prod: required_int(table, row, "distinct_pkey_prod")?,
                distinct_pkey_diff_pct: optional_float(table, row, "distinct_pkey_diff_pct")?,
            });
        }

        Ok(records)
    }

    /// Whether every count matches between dev and prod
    pub fn is_identical(&self) -> bool {
        self.rowcount_dev == self.rowcount_prod
            && self.column_count_dev == self.column_count_prod
            && self.distinct_pkey_dev == self.distinct_pkey_prod
    }
}

/// One statistic of one column, pivoted into a prod value and a dev value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDiffRecord {
    pub table_name: String,
    pub column_name: String,
    pub test_name: String,
    pub prod_label: String,
    pub prod_value: Option<String>,
    pub dev_label: String,
    pub dev_value: Option<String>,
    pub diff: Option<f64>,
}

impl ColumnDiffRecord {
    /// Parse a pivoted column-test result whose value columns are named by `labels`
    pub fn from_table(table: &Table, labels: &SideLabels) -> Result<Vec<Self>> {
        let prod_label = labels.prod.as_str();
        let dev_label = labels.dev.as_str();
        table.require_column(prod_label)?;
        table.require_column(dev_label)?;

        let mut records = Vec::with_capacity(table.row_count());
        for row in 0..table.row_count() {
            records.push(Self {
                table_name: required_text(table, row, "table_name")?,
                column_name: required_text(table, row, "column_name")?,
                test_name: required_text(table, row, "test")?,
                prod_label: prod_label.to_string(),
                prod_value: table.get(row, prod_label).map(str::to_string),
                dev_label: dev_label.to_string(),
                dev_value: table.get(row, dev_label).map(str::to_string),
                diff: optional_float(table, row, "diff")?,
            });
        }

        Ok(records)
    }

    /// True when both sides produced the same value
    pub fn values_match(&self) -> bool {
        self.prod_value == self.dev_value
    }
}

/// Classification of a primary key across the two sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowDiffType {
    /// Key only in dev
    Addition,
    /// Key only in prod
    Deletion,
    /// Key on both sides; values are not compared
    Equal,
}

impl RowDiffType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Addition => "addition",
            Self::Deletion => "deletion",
            Self::Equal => "equal",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "addition" => Ok(Self::Addition),
            "deletion" => Ok(Self::Deletion),
            "equal" => Ok(Self::Equal),
            other => Err(DataSpyError::data_processing(format!(
                "Unknown row diff type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RowDiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-class row counts of a materialised row-level diff table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDiffSummary {
    pub table_name: String,
    pub target: String,
    pub additions: u64,
    pub deletions: u64,
    pub equal: u64,
}

impl RowDiffSummary {
    /// Fold a `diff_type, row_count` result into totals; absent classes count as zero
    pub fn from_counts(table_name: &str, target: &TableIdentity, counts: &Table) -> Result<Self> {
        let mut summary = Self {
            table_name: table_name.to_string(),
            target: target.qualified(),
            additions: 0,
            deletions: 0,
            equal: 0,
        };

        for row in 0..counts.row_count() {
            let diff_type = RowDiffType::parse(&required_text(counts, row, "diff_type")?)?;
            let count = required_int(counts, row, "row_count")?;
            let count = u64::try_from(count).map_err(|_| {
                DataSpyError::data_processing(format!("Negative row count {}", count))
            })?;

            match diff_type {
                RowDiffType::Addition => summary.additions += count,
                RowDiffType::Deletion => summary.deletions += count,
                RowDiffType::Equal => summary.equal += count,
            }
        }

        Ok(summary)
    }

    pub fn total(&self) -> u64 {
        self.additions + self.deletions + self.equal
    }

    pub fn has_changes(&self) -> bool {
        self.additions > 0 || self.deletions > 0
    }
}

/// Stack per-column results in the order given
///
/// Every part must have the same header. Rows are never dropped or
/// reordered, including rows whose statistics are NULL.
pub fn concat_tables(parts: Vec<Table>) -> Result<Table> {
    let mut parts = parts.into_iter();
    let mut combined = match parts.next() {
        Some(first) => first,
        None => return Ok(Table::default()),
    };

    for part in parts {
        if !combined.same_shape(&part) {
            return Err(DataSpyError::pivot_shape(format!(
                "cannot concatenate [{}] with [{}]",
                part.columns.join(", "),
                combined.columns.join(", ")
            )));
        }
        combined.rows.extend(part.rows);
    }

    Ok(combined)
}

fn required_text(table: &Table, row: usize, column: &str) -> Result<String> {
    table.require_column(column)?;
    table.get(row, column).map(str::to_string).ok_or_else(|| {
        DataSpyError::data_processing(format!("Column '{}' is NULL in row {}", column, row))
    })
}

fn required_int(table: &Table, row: usize, column: &str) -> Result<i64> {
    let value = required_text(table, row, column)?;
    parse_int(&value).ok_or_else(|| {
        DataSpyError::data_processing(format!(
            "Column '{}' holds '{}', expected an integer",
            column, value
        ))
    })
}

fn optional_float(table: &Table, row: usize, column: &str) -> Result<Option<f64>> {
    table.require_column(column)?;
    match table.get(row, column) {
        None => Ok(None),
        Some(value) => value.trim().parse::<f64>().map(Some).map_err(|_| {
            DataSpyError::data_processing(format!(
                "Column '{}' holds '{}', expected a number",
                column, value
            ))
        }),
    }
}

// Counts may come back as DECIMAL text such as "12.0"
fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    value.parse::<i64>().ok().or_else(|| {
        let float = value.parse::<f64>().ok()?;
        (float.fract() == 0.0).then(|| float as i64)
    })
}
