//! Table identities and catalog lookups

use crate::config::{CatalogConfig, SchemaLocation};
use crate::error::{DataSpyError, Result};
use crate::executor::{DiffExecutor, QueryContext};
use crate::ident::{quote_literal, Ident, KeyExpr};
use chrono::NaiveDate;
use indexmap::IndexMap;
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

pub const PRIMARY_KEY: &str = "primary-key";
pub const FRESHNESS_KEY: &str = "freshness-key";
pub const DATA_DIFF_FLAG: &str = "data-diff";

/// Which copy of the dataset a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Dev,
    Prod,
}

impl Side {
    /// Prefix used for side-tagged column aliases
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Fully qualified location of one copy of a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableIdentity {
    pub database: Ident,
    pub schema: Ident,
    pub table: Ident,
}

impl TableIdentity {
    pub fn new(location: &SchemaLocation, table: Ident) -> Self {
        Self {
            database: location.database.clone(),
            schema: location.schema.clone(),
            table,
        }
    }

    /// `database.schema.table`
    pub fn qualified(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.table)
    }

    /// Another table in the same database and schema
    pub fn sibling(&self, table: Ident) -> Self {
        Self {
            database: self.database.clone(),
            schema: self.schema.clone(),
            table,
        }
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// Catalog-declared keys of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKeys {
    pub primary_key: KeyExpr,
    pub freshness_key: KeyExpr,
}

/// Freshness keys for both sides of a comparison
///
/// Rows count only when their key is strictly before `cutoff`.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessKeys<'a> {
    pub dev: &'a KeyExpr,
    pub prod: &'a KeyExpr,
    pub cutoff: NaiveDate,
}

/// Looks up per-table metadata from the catalog and `information_schema`
pub struct MetadataResolver<'a> {
    executor: &'a DiffExecutor<'a>,
    catalog: &'a CatalogConfig,
}

impl<'a> MetadataResolver<'a> {
    pub fn new(executor: &'a DiffExecutor<'a>, catalog: &'a CatalogConfig) -> Self {
        Self { executor, catalog }
    }

    fn model_meta_table(&self) -> String {
        format!(
            "{}.{}.{}",
            self.catalog.location.database, self.catalog.location.schema, self.catalog.model_meta_table
        )
    }

    fn column_meta_table(&self) -> String {
        format!(
            "{}.{}.{}",
            self.catalog.location.database, self.catalog.location.schema, self.catalog.column_meta_table
        )
    }

    /// Primary and freshness key expressions for a table
    pub fn resolve_identity_keys(&self, table: &TableIdentity) -> Result<IdentityKeys> {
        Ok(IdentityKeys {
            primary_key: self.resolve_key(table, PRIMARY_KEY)?,
            freshness_key: self.resolve_key(table, FRESHNESS_KEY)?,
        })
    }

    fn resolve_key(&self, table: &TableIdentity, key: &str) -> Result<KeyExpr> {
        let sql = format!(
            "SELECT model_meta[{key}]::VARCHAR AS key_expr\nFROM {meta}\nWHERE LOWER(model_name) = {model}\nLIMIT 1",
            key = quote_literal(key),
            meta = self.model_meta_table(),
            model = table.table.lower().literal(),
        );
        let value = self
            .executor
            .fetch_scalar(QueryContext::table(table.table.as_str()), &sql)?;

        match value {
            Some(expr) if !expr.trim().is_empty() => KeyExpr::new(expr),
            _ => Err(DataSpyError::missing_metadata(table.table.as_str(), key)),
        }
    }

    /// Lower-cased names of the columns flagged for auditing
    pub fn resolve_audited_columns(&self, table: &TableIdentity) -> Result<HashSet<String>> {
        let sql = format!(
            "SELECT column_name\nFROM {meta}\nWHERE LOWER(model_name) = {model}\nAND column_meta[{flag}]::VARCHAR = 'true'",
            meta = self.column_meta_table(),
            model = table.table.lower().literal(),
            flag = quote_literal(DATA_DIFF_FLAG),
        );

        let result = self
            .executor
            .fetch(QueryContext::table(table.table.as_str()), &sql)?;

        Ok(result
            .column_values("column_name")?
            .into_iter()
            .flatten()
            .map(|c| c.to_lowercase())
            .collect())
    }

    /// Column names (lower-cased) and raw types in ordinal order
    pub fn describe_columns(&self, table: &TableIdentity) -> Result<IndexMap<String, String>> {
        let sql = format!(
            "SELECT column_name, data_type\nFROM information_schema.columns\nWHERE LOWER(table_catalog) = {database}\nAND LOWER(table_schema) = {schema}\nAND LOWER(table_name) = {table}\nORDER BY ordinal_position",
            database = table.database.lower().literal(),
            schema = table.schema.lower().literal(),
            table = table.table.lower().literal(),
        );

        let result = self
            .executor
            .fetch(QueryContext::table(table.table.as_str()), &sql)?;

        let names = result.require_column("column_name")?;
        let types = result.require_column("data_type")?;

        let mut columns = IndexMap::new();
        for row in &result.rows {
            if let (Some(Some(name)), Some(Some(raw_type))) = (row.get(names), row.get(types)) {
                columns.insert(name.to_lowercase(), raw_type.clone());
            }
        }

        Ok(columns)
    }

    /// Tables present in both schemas whose names fully match `pattern`
    pub fn tables_to_compare(
        &self,
        dev: &SchemaLocation,
        prod: &SchemaLocation,
        pattern: &str,
    ) -> Result<Vec<Ident>> {
        let matcher = RegexBuilder::new(&format!("^(?:{})$", pattern))
            .case_insensitive(true)
            .build()?;

        let sql = format!(
            "WITH prod_tables AS (\n    SELECT LOWER(table_name) AS table_name\n    FROM information_schema.tables\n    WHERE LOWER(table_catalog) = {prod_db}\n    AND LOWER(table_schema) = {prod_schema}\n)\n\nSELECT DISTINCT LOWER(table_name) AS table_name\nFROM information_schema.tables\nWHERE LOWER(table_catalog) = {dev_db}\nAND LOWER(table_schema) = {dev_schema}\nAND LOWER(table_name) IN (SELECT table_name FROM prod_tables)\nORDER BY table_name",
            prod_db = prod.database.lower().literal(),
            prod_schema = prod.schema.lower().literal(),
            dev_db = dev.database.lower().literal(),
            dev_schema = dev.schema.lower().literal(),
        );
        let result = self
            .executor
            .fetch(QueryContext::table(dev.schema.as_str()), &sql)?;

        let mut tables = Vec::new();
        for name in result.column_values("table_name")?.into_iter().flatten() {
            if !matcher.is_match(&name) {
                continue;
            }
            match Ident::new(name.as_str()) {
                Ok(ident) => tables.push(ident),
                Err(e) => log::warn!("Skipping table with unsupported name: {}", e),
            }
        }

        if tables.is_empty() {
            return Err(DataSpyError::empty_comparison_set(pattern));
        }

        Ok(tables)
    }
}
