//! DuckDB-backed store with pooled sessions and per-query timeouts

use crate::config::StoreConfig;
use crate::error::{DataSpyError, Result};
use crate::ident::quote_literal;
use crate::store::{CancelFlag, Store, Table};
use chrono::{DateTime, NaiveDate};
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::{Connection, DuckdbConnectionManager};
use r2d2::{CustomizeConnection, Pool};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const WATCHDOG_TICK: Duration = Duration::from_millis(50);

/// Days between 0001-01-01 and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Pooled connections to one DuckDB instance
///
/// The manager clones a root connection, so every session shares attached
/// databases and catalog state.
pub type SessionPool = Pool<DuckdbConnectionManager>;

/// Per-connection settings applied whenever the pool opens a session
#[derive(Debug)]
struct SessionSetup;

impl CustomizeConnection<Connection, duckdb::Error> for SessionSetup {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), duckdb::Error> {
        conn.execute_batch("SET enable_progress_bar=false;")
    }
}

/// Store implementation over an embedded DuckDB instance
pub struct DuckDbStore {
    pool: SessionPool,
    query_timeout: Duration,
    cancel: CancelFlag,
}

impl DuckDbStore {
    /// Open the main database and attach the configured ones
    pub fn open(config: &StoreConfig, cancel: CancelFlag) -> Result<Self> {
        let manager = if config.path == ":memory:" {
            DuckdbConnectionManager::memory()?
        } else {
            DuckdbConnectionManager::file(&config.path)?
        };

        let pool = Pool::builder()
            .max_size(config.max_sessions.max(1) as u32)
            .connection_customizer(Box::new(SessionSetup))
            .build(manager)?;

        // Attached databases belong to the instance, not the session
        let conn = pool.get()?;
        for attachment in &config.attachments {
            let sql = format!(
                "ATTACH {} AS {}",
                quote_literal(&attachment.path),
                attachment.name
            );
            conn.execute_batch(&sql).map_err(|e| {
                DataSpyError::config(format!(
                    "Failed to attach '{}' as {}: {}",
                    attachment.path, attachment.name, e
                ))
            })?;
            log::info!("Attached {} as {}", attachment.path, attachment.name);
        }
        drop(conn);

        Ok(Self {
            pool,
            query_timeout: config.query_timeout,
            cancel,
        })
    }

    /// In-memory store with default settings
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&StoreConfig::default(), CancelFlag::new())
    }

    #[cfg(test)]
    fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Run `f` on a pooled session while a watchdog enforces timeout and cancellation
    fn with_session<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.cancel.check()?;
        let session = self.pool.get()?;

        let handle = session.interrupt_handle();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let cancel = self.cancel.clone();
        let deadline = Instant::now() + self.query_timeout;

        let watchdog = thread::spawn(move || loop {
            match done_rx.recv_timeout(WATCHDOG_TICK) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return false,
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() || Instant::now() >= deadline {
                        handle.interrupt();
                        return true;
                    }
                }
            }
        });

        let result = f(&session);
        let _ = done_tx.send(());
        let interrupted = watchdog.join().unwrap_or(false);

        match result {
            Err(_) if interrupted && self.cancel.is_cancelled() => Err(DataSpyError::Cancelled),
            Err(_) if interrupted => Err(DataSpyError::QueryTimeout {
                timeout: self.query_timeout,
            }),
            other => other,
        }
    }
}

impl Store for DuckDbStore {
    fn execute(&self, sql: &str) -> Result<()> {
        self.with_session(|conn| {
            conn.execute_batch(sql)?;
            Ok(())
        })
    }

    fn execute_to_table(&self, sql: &str) -> Result<Table> {
        self.with_session(|conn| query_table(conn, sql))
    }
}

/// Run a query and stringify every cell
fn query_table(conn: &Connection, sql: &str) -> Result<Table> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;

    let columns: Vec<String> = rows
        .as_ref()
        .map(|s| s.column_names())
        .unwrap_or_default();
    let column_count = columns.len();

    let mut table = Table::new(columns);
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(column_count);
        for i in 0..column_count {
            cells.push(cell_to_string(row.get_ref(i)?));
        }
        table.rows.push(cells);
    }

    Ok(table)
}

fn cell_to_string(value: ValueRef<'_>) -> Option<String> {
    let text = match value {
        ValueRef::Null => return None,
        ValueRef::Boolean(b) => b.to_string(),
        ValueRef::TinyInt(i) => i.to_string(),
        ValueRef::SmallInt(i) => i.to_string(),
        ValueRef::Int(i) => i.to_string(),
        ValueRef::BigInt(i) => i.to_string(),
        ValueRef::HugeInt(i) => i.to_string(),
        ValueRef::UTinyInt(i) => i.to_string(),
        ValueRef::USmallInt(i) => i.to_string(),
        ValueRef::UInt(i) => i.to_string(),
        ValueRef::UBigInt(i) => i.to_string(),
        ValueRef::Float(f) => f.to_string(),
        ValueRef::Double(f) => f.to_string(),
        ValueRef::Decimal(d) => d.to_string(),
        ValueRef::Text(s) => String::from_utf8_lossy(s).to_string(),
        ValueRef::Blob(b) => format!("<blob:{} bytes>", b.len()),
        ValueRef::Date32(days) => format_date(days),
        ValueRef::Timestamp(unit, ts) => format_timestamp(unit, ts),
        other => format!("{:?}", other),
    };
    Some(text)
}

fn format_date(days: i32) -> String {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
        .map(|d| d.to_string())
        .unwrap_or_else(|| days.to_string())
}

fn format_timestamp(unit: TimeUnit, value: i64) -> String {
    let micros = match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    };
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.naive_utc().to_string())
        .unwrap_or_else(|| value.to_string())
}
