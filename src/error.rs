//! Error types for dataspy operations

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataSpyError>;

#[derive(Error, Debug)]
pub enum DataSpyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Invalid table pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Missing metadata for table '{table}': no {key} declared")]
    MissingMetadata { table: String, key: String },

    #[error("Unknown column type '{raw_type}' for {table}.{column}")]
    UnknownType {
        table: String,
        column: String,
        raw_type: String,
    },

    #[error("No tables matching '{pattern}' exist in both schemas")]
    EmptyComparisonSet { pattern: String },

    #[error("Query failed for {}: {message}", describe_target(.table, .column))]
    QueryExecution {
        table: String,
        column: Option<String>,
        message: String,
    },

    #[error("Query exceeded the {}s timeout", .timeout.as_secs_f64())]
    QueryTimeout { timeout: Duration },

    #[error("Pivot shape mismatch: {message}")]
    PivotShapeMismatch { message: String },

    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("Column alias collision: '{alias}' would be rendered twice")]
    AliasCollision { alias: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Data processing error: {message}")]
    DataProcessing { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

fn describe_target(table: &str, column: &Option<String>) -> String {
    match column {
        Some(column) => format!("{}.{}", table, column),
        None => table.to_string(),
    }
}

impl DataSpyError {
    pub fn missing_metadata(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingMetadata {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn unknown_type(
        table: impl Into<String>,
        column: impl Into<String>,
        raw_type: impl Into<String>,
    ) -> Self {
        Self::UnknownType {
            table: table.into(),
            column: column.into(),
            raw_type: raw_type.into(),
        }
    }

    pub fn empty_comparison_set(pattern: impl Into<String>) -> Self {
        Self::EmptyComparisonSet {
            pattern: pattern.into(),
        }
    }

    pub fn query_execution(
        table: impl Into<String>,
        column: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueryExecution {
            table: table.into(),
            column: column.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn pivot_shape(msg: impl Into<String>) -> Self {
        Self::PivotShapeMismatch {
            message: msg.into(),
        }
    }

    pub fn invalid_identifier(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn alias_collision(alias: impl Into<String>) -> Self {
        Self::AliasCollision {
            alias: alias.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn data_processing(msg: impl Into<String>) -> Self {
        Self::DataProcessing {
            message: msg.into(),
        }
    }

    /// Whether the failure should abort the whole batch rather than one table
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Config { .. })
    }
}
