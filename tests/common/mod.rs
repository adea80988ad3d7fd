//! Common test utilities and helpers

use dataspy::cli::Tier;
use dataspy::commands::run_diff;
use dataspy::config::{Attachment, DiffConfig, SchemaLocation, StoreConfig};
use dataspy::ident::Ident;
use dataspy::output::DiffReport;
use dataspy::progress::ProgressReporter;
use dataspy::query::date_literal;
use dataspy::{CancelFlag, DiffEngine, DuckDbStore, Result, Store, Table};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

pub const DEV_DB: &str = "dev_db";
pub const DEV_SCHEMA: &str = "dev_jane";
pub const PROD_DB: &str = "prod_db";
pub const PROD_SCHEMA: &str = "analytics";

/// Load date used for seeded rows; always before today
pub const LOADED_AT: &str = "2024-01-01";

/// Two in-memory databases attached as `dev_db` and `prod_db`, with the
/// catalog tables living in the prod schema
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub store: DuckDbStore,
    pub config: DiffConfig,
}

impl TestFixture {
    pub fn new() -> Result<Self> {
        Self::with_concurrency(4)
    }

    pub fn with_concurrency(max_concurrency: usize) -> Result<Self> {
        let temp_dir = TempDir::new()?;

        let mut config = DiffConfig::new(SchemaLocation::new(PROD_DB, PROD_SCHEMA)?)?;
        config.set_max_concurrency(max_concurrency);
        config.store = StoreConfig {
            path: ":memory:".to_string(),
            attachments: vec![
                Attachment {
                    name: Ident::new(DEV_DB)?,
                    path: ":memory:".to_string(),
                },
                Attachment {
                    name: Ident::new(PROD_DB)?,
                    path: ":memory:".to_string(),
                },
            ],
            max_sessions: max_concurrency,
            query_timeout: Duration::from_secs(60),
        };

        let store = DuckDbStore::open(&config.store, CancelFlag::new())?;
        store.execute(&format!(
            "CREATE SCHEMA {dev_db}.{dev_schema};
CREATE SCHEMA {prod_db}.{prod_schema};
CREATE TABLE {prod_db}.{prod_schema}.model_meta (
    model_name VARCHAR,
    model_meta STRUCT(\"primary-key\" VARCHAR, \"freshness-key\" VARCHAR)
);
CREATE TABLE {prod_db}.{prod_schema}.column_meta (
    model_name VARCHAR,
    column_name VARCHAR,
    column_meta STRUCT(\"data-diff\" BOOLEAN)
);",
            dev_db = DEV_DB,
            dev_schema = DEV_SCHEMA,
            prod_db = PROD_DB,
            prod_schema = PROD_SCHEMA,
        ))?;

        Ok(Self {
            temp_dir,
            store,
            config,
        })
    }

    pub fn dev(&self) -> SchemaLocation {
        SchemaLocation::new(DEV_DB, DEV_SCHEMA).expect("valid dev location")
    }

    pub fn dev_table(&self, table: &str) -> String {
        format!("{}.{}.{}", DEV_DB, DEV_SCHEMA, table)
    }

    pub fn prod_table(&self, table: &str) -> String {
        format!("{}.{}.{}", PROD_DB, PROD_SCHEMA, table)
    }

    pub fn execute(&self, sql: &str) -> Result<()> {
        self.store.execute(sql)
    }

    pub fn query(&self, sql: &str) -> Result<Table> {
        self.store.execute_to_table(sql)
    }

    pub fn scalar(&self, sql: &str) -> Result<Option<String>> {
        self.store.execute_scalar(sql)
    }

    /// Create the same table definition on both sides
    pub fn create_table_pair(&self, table: &str, columns: &str) -> Result<()> {
        self.execute(&format!(
            "CREATE TABLE {} ({});\nCREATE TABLE {} ({});",
            self.dev_table(table),
            columns,
            self.prod_table(table),
            columns
        ))
    }

    pub fn insert_dev(&self, table: &str, values: &str) -> Result<()> {
        self.execute(&format!("INSERT INTO {} VALUES {}", self.dev_table(table), values))
    }

    pub fn insert_prod(&self, table: &str, values: &str) -> Result<()> {
        self.execute(&format!("INSERT INTO {} VALUES {}", self.prod_table(table), values))
    }

    /// Declare primary and freshness keys for a model
    pub fn register_model(&self, table: &str, primary_key: &str, freshness_key: &str) -> Result<()> {
        self.execute(&format!(
            "INSERT INTO {} VALUES ('{}', {{'primary-key': '{}', 'freshness-key': '{}'}})",
            self.prod_table("model_meta"),
            table,
            primary_key,
            freshness_key
        ))
    }

    /// Flag columns of a model for column-level comparison
    pub fn audit_columns(&self, table: &str, columns: &[&str]) -> Result<()> {
        for column in columns {
            self.execute(&format!(
                "INSERT INTO {} VALUES ('{}', '{}', {{'data-diff': true}})",
                self.prod_table("column_meta"),
                table,
                column
            ))?;
        }
        Ok(())
    }

    /// `table(id INTEGER, amount DOUBLE, loaded_at DATE)` with the given ids on each side
    pub fn seed_keyed_table(&self, table: &str, dev_ids: &[i64], prod_ids: &[i64]) -> Result<()> {
        self.create_table_pair(table, "id INTEGER, amount DOUBLE, loaded_at DATE")?;
        self.register_model(table, "id", "loaded_at")?;

        let rows = |ids: &[i64]| {
            ids.iter()
                .map(|id| format!("({}, {}.0, DATE '{}')", id, id * 10, LOADED_AT))
                .collect::<Vec<_>>()
                .join(", ")
        };
        if !dev_ids.is_empty() {
            self.insert_dev(table, &rows(dev_ids))?;
        }
        if !prod_ids.is_empty() {
            self.insert_prod(table, &rows(prod_ids))?;
        }
        Ok(())
    }

    /// Date literal `offset_days` after the run's freshness cutoff
    pub fn cutoff_date(&self, offset_days: i64) -> String {
        date_literal(self.config.freshness_cutoff + chrono::Duration::days(offset_days))
    }

    pub fn engine(&self) -> Result<DiffEngine<'_>> {
        DiffEngine::new(&self.store, &self.config, self.dev(), CancelFlag::new())
    }

    /// Run the selected tiers without progress bars
    pub fn run(&self, tier: Tier) -> Result<DiffReport> {
        let mut progress = ProgressReporter::new_minimal();
        run_diff(
            &self.store,
            &self.config,
            self.dev(),
            tier,
            CancelFlag::new(),
            &mut progress,
        )
    }

    pub fn report_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

pub fn ident(name: &str) -> Ident {
    Ident::new(name).expect("valid identifier")
}
