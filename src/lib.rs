//! # dataspy
//!
//! Compares a development copy of a dataset against its production baseline
//! and reports schema-level, column-level and row-level differences.

pub mod aggregate;
pub mod classify;
pub mod cli;
pub mod commands;
pub mod config;
pub mod duckdb_store;
pub mod engine;
pub mod error;
pub mod executor;
pub mod ident;
pub mod metadata;
pub mod output;
pub mod planner;
pub mod progress;
pub mod query;
pub mod store;

pub use config::{DiffConfig, SchemaLocation};
pub use duckdb_store::DuckDbStore;
pub use engine::{BatchReport, DiffEngine, TableOutcome};
pub use error::{DataSpyError, Result};
pub use store::{CancelFlag, Store, Table};
