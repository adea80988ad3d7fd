//! Per-column test selection

use crate::classify::{ColumnDescriptor, SemanticClass};
use crate::error::Result;
use crate::ident::Ident;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// One aggregate statistic computed on both sides of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Avg,
    Sum,
    Min,
    Max,
    CountNulls,
    Unique,
}

impl TestKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::CountNulls => "count_nulls",
            Self::Unique => "unique",
        }
    }

    /// Aggregate expression over `column` for one side
    pub fn value_formula(&self, column: &Ident) -> String {
        let column = column.quoted();
        match self {
            Self::Avg => format!("ROUND(CAST(AVG({}) AS DOUBLE), 2)", column),
            Self::Sum => format!("ROUND(CAST(SUM({}) AS DOUBLE), 2)", column),
            Self::Min => format!("MIN({})", column),
            Self::Max => format!("MAX({})", column),
            Self::CountNulls => format!("SUM(CASE WHEN {} IS NULL THEN 1 ELSE 0 END)", column),
            Self::Unique => format!("COUNT(DISTINCT {})", column),
        }
    }

    /// Statistics run for each semantic class, in execution order
    pub fn bundle(class: SemanticClass) -> &'static [TestKind] {
        match class {
            SemanticClass::Numeric => &[
                Self::Avg,
                Self::Sum,
                Self::Min,
                Self::Max,
                Self::CountNulls,
            ],
            SemanticClass::Text => &[Self::CountNulls, Self::Unique],
            SemanticClass::Boolean => &[Self::CountNulls],
            SemanticClass::Temporal => &[Self::Min, Self::Max],
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the pivoted dev and prod values are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffFormula {
    /// `(dev - prod) / prod`, NULL when prod is zero
    PercentageChange,
    /// Whole hours from dev to prod
    HourDifference,
}

impl DiffFormula {
    pub fn for_test(class: SemanticClass, test: TestKind) -> Self {
        match (class, test) {
            (SemanticClass::Temporal, TestKind::Min | TestKind::Max) => Self::HourDifference,
            _ => Self::PercentageChange,
        }
    }

    /// Expression over the two pivoted label columns
    pub fn render(&self, dev_label: &Ident, prod_label: &Ident) -> String {
        let dev = dev_label.quoted();
        let prod = prod_label.quoted();
        match self {
            Self::PercentageChange => format!(
                "ROUND((CAST({dev} AS DOUBLE) - CAST({prod} AS DOUBLE)) / NULLIF(CAST({prod} AS DOUBLE), 0), 2)",
                dev = dev,
                prod = prod
            ),
            Self::HourDifference => format!(
                "date_diff('hour', CAST({dev} AS TIMESTAMP), CAST({prod} AS TIMESTAMP))",
                dev = dev,
                prod = prod
            ),
        }
    }
}

/// A single (column, statistic) obligation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffTestSpec {
    pub column: Ident,
    pub semantic_class: SemanticClass,
    pub test: TestKind,
    pub diff: DiffFormula,
}

impl DiffTestSpec {
    pub fn new(column: Ident, semantic_class: SemanticClass, test: TestKind) -> Self {
        Self {
            column,
            semantic_class,
            test,
            diff: DiffFormula::for_test(semantic_class, test),
        }
    }

    pub fn test_name(&self) -> &'static str {
        self.test.name()
    }

    pub fn value_formula(&self) -> String {
        self.test.value_formula(&self.column)
    }
}

/// Columns worth comparing: present on both sides and flagged for audit,
/// in dev column order
pub fn candidate_columns<'a>(
    dev_columns: &'a IndexMap<String, String>,
    prod_columns: &IndexMap<String, String>,
    audited: &HashSet<String>,
) -> Vec<(&'a str, &'a str)> {
    dev_columns
        .iter()
        .filter(|(name, _)| prod_columns.contains_key(*name) && audited.contains(*name))
        .map(|(name, raw_type)| (name.as_str(), raw_type.as_str()))
        .collect()
}

/// Build the ordered list of column tests for one table
///
/// `dev_columns` and `prod_columns` map lower-cased column names to their raw
/// store types. Only candidates are classified, using the dev type, so a
/// column that is never compared cannot fail the table.
pub fn plan(
    table: &str,
    dev_columns: &IndexMap<String, String>,
    prod_columns: &IndexMap<String, String>,
    audited: &HashSet<String>,
) -> Result<Vec<DiffTestSpec>> {
    let mut specs = Vec::new();

    for (name, raw_type) in candidate_columns(dev_columns, prod_columns, audited) {
        let descriptor = ColumnDescriptor::classify(table, name, raw_type)?;

        if let Some(prod_type) = prod_columns.get(name) {
            if !prod_type.eq_ignore_ascii_case(raw_type) {
                log::warn!(
                    "{}.{} is {} in dev but {} in prod; planning with the dev type",
                    table,
                    name,
                    raw_type,
                    prod_type
                );
            }
        }

        let column = Ident::new(name)?;
        for test in TestKind::bundle(descriptor.semantic_class) {
            specs.push(DiffTestSpec::new(
                column.clone(),
                descriptor.semantic_class,
                *test,
            ));
        }
    }

    Ok(specs)
}
