//! The [`Database`] facade.
//!
//! Ties a connection pool to a [`QueryExecutor`] configured from
//! [`DatabaseOptions`], and exposes plain queries, both transaction modes
//! and the parameter helpers.

use crate::config::DatabaseOptions;
use crate::db::connection::ConnectionPool;
use crate::db::executor::QueryExecutor;
use crate::db::format;
use crate::db::pool::DbPool;
use crate::db::scope::TransactionScope;
use crate::db::transaction::{run_transaction, run_transaction_sync};
use crate::error::DbResult;
use crate::models::{DatabaseType, NamedParams, ParamBinding, RowSet, SqlValue};
use std::future::Future;

/// Query and transaction entry point over a pool.
///
/// Cloning is cheap: clones share the pool.
#[derive(Debug, Clone)]
pub struct Database<P = DbPool> {
    pool: P,
    executor: QueryExecutor,
}

impl Database<DbPool> {
    /// Resolve `options` and open a `sqlx` pool.
    pub async fn connect(options: &DatabaseOptions) -> DbResult<Self> {
        let resolved = options.resolve()?;
        let pool = DbPool::connect(&resolved).await?;
        let executor = QueryExecutor::new()
            .with_multiple_statements(resolved.multiple_statements)
            .with_verbose(resolved.show_debug_info);
        Ok(Self::with_pool(pool, executor))
    }
}

impl<P: ConnectionPool> Database<P> {
    /// Wrap an existing pool.
    pub fn with_pool(pool: P, executor: QueryExecutor) -> Self {
        Self { pool, executor }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn executor(&self) -> QueryExecutor {
        self.executor
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.database_type()
    }

    /// Run one query on any free pooled connection.
    ///
    /// Plain queries are not serialized against each other.
    pub async fn query(&self, sql: &str, params: Option<&NamedParams>) -> DbResult<RowSet> {
        let mut pool = self.pool.clone();
        self.executor.execute(&mut pool, sql, params).await
    }

    /// Run `handler` in a transaction; its future's result decides between
    /// commit and rollback. See [`run_transaction`].
    pub async fn transaction<F, Fut, T>(&self, handler: F) -> DbResult<T>
    where
        F: FnOnce(TransactionScope) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        run_transaction(&self.pool, self.executor, handler).await
    }

    /// Run a handler that only issues queries; the transaction commits once
    /// they all succeed. See [`run_transaction_sync`].
    pub async fn transaction_sync<F, T>(&self, handler: F) -> DbResult<T>
    where
        F: FnOnce(&TransactionScope) -> T,
    {
        run_transaction_sync(&self.pool, self.executor, handler).await
    }

    /// Build `:prefix0, :prefix1, ...` placeholders for `list`.
    pub fn paramify<I, T>(&self, list: I, prefix: &str) -> ParamBinding
    where
        I: IntoIterator<Item = T>,
        T: Into<SqlValue>,
    {
        format::paramify(list, prefix)
    }

    /// Substitute `:name` parameters with literals escaped for this backend.
    pub fn query_format(&self, sql: &str, values: Option<&NamedParams>) -> String {
        self.executor.format(sql, values, self.database_type())
    }

    /// Close the pool once every checked-out connection has come back.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
