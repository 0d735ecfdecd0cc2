//! sqlscope library
//!
//! Promise-style queries and scoped transactions over pooled SQL connections
//! (MySQL, PostgreSQL, SQLite). A transaction handler receives a
//! [`TransactionScope`] that can only run queries; begin, commit, rollback
//! and connection release are handled for it.

pub mod config;
pub mod database;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, DatabaseOptions, PoolOptions};
pub use database::Database;
pub use db::{QueryExecutor, QueryHandle, TransactionScope};
pub use error::{DbError, DbResult};
pub use models::{DatabaseType, NamedParams, ParamBinding, RowSet, SqlValue};
