//! Collaborator traits for pools and pooled connections.
//!
//! The transaction layer only needs a handful of primitives from the
//! underlying driver: run a query, acquire a connection, and begin, commit,
//! roll back, release or discard that connection. [`crate::db::DbPool`] provides
//! them over `sqlx`; tests provide scripted in-memory versions.

use crate::error::DbResult;
use crate::models::{DatabaseType, StatementResult};
use std::future::Future;

/// Anything SQL text can be run against: a pool or a single connection.
pub trait QueryTarget: Send {
    /// Backend dialect, used for literal escaping.
    fn database_type(&self) -> DatabaseType;

    /// Run already-formatted SQL once, returning one result per statement.
    fn run_query(
        &mut self,
        sql: &str,
    ) -> impl Future<Output = DbResult<Vec<StatementResult>>> + Send;
}

/// A connection checked out of a pool.
///
/// Commands issued on one connection complete in submission order.
pub trait PooledConnection: QueryTarget + Sized + 'static {
    fn begin_transaction(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    /// Hand the connection back to its pool. Consumes the handle.
    fn release(self) -> impl Future<Output = DbResult<()>> + Send;

    /// Close the connection so the pool never hands it out again. Used when
    /// a transaction may still be open on it.
    fn discard(self) -> impl Future<Output = DbResult<()>> + Send;
}

/// A shared pool. Clones refer to the same underlying pool.
pub trait ConnectionPool: QueryTarget + Clone + Sync + 'static {
    type Connection: PooledConnection;

    fn get_connection(&self) -> impl Future<Output = DbResult<Self::Connection>> + Send;

    /// Close the pool, waiting for checked-out connections to come back.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
