//! Semantic classification of store column types

use crate::error::{DataSpyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse data-type bucket that decides which statistics a column gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticClass {
    Numeric,
    Text,
    Boolean,
    Temporal,
}

impl SemanticClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Temporal => "temporal",
        }
    }
}

impl fmt::Display for SemanticClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column as reported by the store, with its semantic class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub raw_type: String,
    pub semantic_class: SemanticClass,
}

impl ColumnDescriptor {
    /// Classify a raw column; unknown types carry the table and column name
    pub fn classify(table: &str, name: &str, raw_type: &str) -> Result<Self> {
        let semantic_class = classify(raw_type)
            .map_err(|_| DataSpyError::unknown_type(table, name, raw_type))?;
        Ok(Self {
            name: name.to_string(),
            raw_type: raw_type.to_string(),
            semantic_class,
        })
    }
}

/// Map a store-reported type string to its semantic class
///
/// Matching ignores case, surrounding whitespace and any parameter list, so
/// `DECIMAL(18,2)` and `varchar(255)` classify like their bare names.
pub fn classify(raw_type: &str) -> Result<SemanticClass> {
    let normalized = normalize(raw_type);

    let class = match normalized.as_str() {
        "number" | "numeric" | "decimal" | "float" | "float4" | "float8" | "double"
        | "double precision" | "real" | "int" | "integer" | "bigint" | "smallint"
        | "tinyint" | "byteint" | "hugeint" | "utinyint" | "usmallint" | "uinteger"
        | "ubigint" | "uhugeint" => SemanticClass::Numeric,

        "text" | "varchar" | "string" | "char" | "character" | "character varying"
        | "bpchar" => SemanticClass::Text,

        "boolean" | "bool" => SemanticClass::Boolean,

        "date" | "datetime" | "timestamp" | "timestamp_ntz" | "timestamp_ltz"
        | "timestamp_tz" | "timestamptz" | "timestamp with time zone" | "timestamp_s"
        | "timestamp_ms" | "timestamp_ns" => SemanticClass::Temporal,

        _ => {
            return Err(DataSpyError::unknown_type("", "", raw_type));
        }
    };

    Ok(class)
}

fn normalize(raw_type: &str) -> String {
    let lowered = raw_type.trim().to_lowercase();
    let base = match lowered.find('(') {
        Some(pos) => &lowered[..pos],
        None => lowered.as_str(),
    };
    base.split_whitespace().collect::<Vec<_>>().join(" ")
}
