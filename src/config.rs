//! Run configuration, built once at startup and passed down explicitly

use crate::error::{DataSpyError, Result};
use crate::ident::Ident;
use chrono::{Local, NaiveDate};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TABLE_REGEX: &str = "fct_.*|dim_.*";
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MODEL_META_TABLE: &str = "model_meta";
pub const DEFAULT_COLUMN_META_TABLE: &str = "column_meta";

/// A database/schema pair inside the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaLocation {
    pub database: Ident,
    pub schema: Ident,
}

impl SchemaLocation {
    pub fn new(database: &str, schema: &str) -> Result<Self> {
        Ok(Self {
            database: Ident::new(database)?,
            schema: Ident::new(schema)?,
        })
    }
}

/// Where the model and column metadata tables live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub location: SchemaLocation,
    pub model_meta_table: Ident,
    pub column_meta_table: Ident,
}

/// A database file attached to the store under a logical name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: Ident,
    pub path: String,
}

/// DuckDB store settings
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Main database file, or `:memory:`
    pub path: String,
    pub attachments: Vec<Attachment>,
    /// Upper bound on simultaneously open sessions
    pub max_sessions: usize,
    pub query_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            attachments: Vec::new(),
            max_sessions: DEFAULT_MAX_CONCURRENCY,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }
}

/// Everything a diff run needs besides the dev location
#[derive(Debug, Clone)]
pub struct DiffConfig {
    pub prod: SchemaLocation,
    pub catalog: CatalogConfig,
    pub store: StoreConfig,
    /// Worker threads for per-table and per-column dispatch
    pub max_concurrency: usize,
    pub table_regex: String,
    /// Write summary and column results back into the dev schema
    pub writeback: bool,
    /// Rows whose freshness key is on or after this date are still loading
    pub freshness_cutoff: NaiveDate,
}

impl DiffConfig {
    /// Minimal configuration with defaults for everything but the prod location
    pub fn new(prod: SchemaLocation) -> Result<Self> {
        let catalog = CatalogConfig {
            location: prod.clone(),
            model_meta_table: Ident::new(DEFAULT_MODEL_META_TABLE)?,
            column_meta_table: Ident::new(DEFAULT_COLUMN_META_TABLE)?,
        };

        Ok(Self {
            prod,
            catalog,
            store: StoreConfig::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            table_regex: DEFAULT_TABLE_REGEX.to_string(),
            writeback: true,
            freshness_cutoff: Local::now().date_naive(),
        })
    }

    /// Build from process environment (after loading `.env`)
    pub fn from_env() -> Result<Self> {
        load_env_file()?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| DataSpyError::config(format!("{} is not set", key)))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let prod = SchemaLocation::new(&required("PROD_DATABASE")?, &required("PROD_SCHEMA")?)?;
        let mut config = Self::new(prod)?;

        if let Some(table) = optional("MODEL_META_TABLE") {
            config.catalog.model_meta_table = Ident::new(table)?;
        }
        if let Some(table) = optional("COLUMN_LEVEL_META_TABLE") {
            config.catalog.column_meta_table = Ident::new(table)?;
        }
        if let Some(database) = optional("DATASPY_CATALOG_DATABASE") {
            config.catalog.location.database = Ident::new(database)?;
        }
        if let Some(schema) = optional("DATASPY_CATALOG_SCHEMA") {
            config.catalog.location.schema = Ident::new(schema)?;
        }

        if let Some(path) = optional("DATASPY_DUCKDB_PATH") {
            config.store.path = substitute_env_vars(&path, &lookup)?;
        }
        if let Some(spec) = optional("DATASPY_ATTACH") {
            config.store.attachments = parse_attachments(&spec, &lookup)?;
        }
        if let Some(value) = optional("DATASPY_MAX_CONCURRENCY") {
            config.set_max_concurrency(parse_positive("DATASPY_MAX_CONCURRENCY", &value)?);
        }
        if let Some(value) = optional("DATASPY_QUERY_TIMEOUT_SECS") {
            let secs = parse_positive("DATASPY_QUERY_TIMEOUT_SECS", &value)?;
            config.store.query_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(regex) = optional("DATASPY_TABLE_REGEX") {
            config.table_regex = regex;
        }
        if let Some(value) = optional("DATASPY_FRESHNESS_CUTOFF") {
            config.freshness_cutoff = parse_date("DATASPY_FRESHNESS_CUTOFF", &value)?;
        }

        Ok(config)
    }

    /// Worker count and session bound move together: the store is the bottleneck
    pub fn set_max_concurrency(&mut self, value: usize) {
        let value = value.max(1);
        self.max_concurrency = value;
        self.store.max_sessions = value;
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(DataSpyError::config(format!(
            "{} must be a positive integer, got '{}'",
            key, value
        ))),
    }
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        DataSpyError::config(format!(
            "{} must be a YYYY-MM-DD date, got '{}': {}",
            key, value, e
        ))
    })
}

/// Parse `name=path[,name=path...]`
pub fn parse_attachments<F>(spec: &str, lookup: &F) -> Result<Vec<Attachment>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut attachments = Vec::new();

    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, path) = entry.split_once('=').ok_or_else(|| {
            DataSpyError::config(format!(
                "Invalid attachment '{}': expected name=path",
                entry
            ))
        })?;

        let name = Ident::new(name.trim())?;
        if attachments.iter().any(|a: &Attachment| a.name.eq_ignore_case(&name)) {
            return Err(DataSpyError::config(format!(
                "Database '{}' is attached twice",
                name
            )));
        }

        attachments.push(Attachment {
            name,
            path: substitute_env_vars(path.trim(), lookup)?,
        });
    }

    Ok(attachments)
}

/// Substitute `{VAR_NAME}` placeholders in a path or connection string
pub fn substitute_env_vars<F>(value: &str, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = value.to_string();

    let mut start = 0;
    while let Some(open_pos) = result[start..].find('{') {
        let open_pos = start + open_pos;
        if let Some(close_pos) = result[open_pos..].find('}') {
            let close_pos = open_pos + close_pos;
            let var_name = result[open_pos + 1..close_pos].to_string();

            let var_value = lookup(&var_name).ok_or_else(|| {
                DataSpyError::config(format!(
                    "Environment variable '{}' not found. Make sure it's set in your .env file or environment.",
                    var_name
                ))
            })?;

            result.replace_range(open_pos..=close_pos, &var_value);
            start = open_pos + var_value.len();
        } else {
            start = open_pos + 1;
        }
    }

    Ok(result)
}

/// Load environment variables from .env file if it exists
pub fn load_env_file() -> Result<()> {
    if Path::new(".env").exists() {
        dotenvy::dotenv()
            .map_err(|e| DataSpyError::config(format!("Failed to load .env file: {}", e)))?;
    }

    Ok(())
}
