//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Collaborator traits for pools and connections
//! - `sqlx`-backed pools and row decoding
//! - Named-parameter formatting and query execution
//! - Transaction scopes and the transaction lifecycle

pub mod connection;
pub mod executor;
pub mod format;
pub mod pool;
pub(crate) mod queue;
pub mod scope;
pub mod transaction;
pub mod types;

pub use connection::{ConnectionPool, PooledConnection, QueryTarget};
pub use executor::{QueryExecutor, fingerprint};
pub use format::{escape_literal, paramify, query_format};
pub use pool::{DbConnection, DbPool};
pub use scope::{QueryHandle, TransactionScope};
pub use transaction::{run_transaction, run_transaction_sync};
