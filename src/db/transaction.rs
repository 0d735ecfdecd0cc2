//! Transaction lifecycle.
//!
//! One attempt acquires a connection, begins a transaction, hands a
//! [`TransactionScope`] to the caller's handler, then commits or rolls back
//! and releases the connection exactly once:
//!
//! ```text
//! ACQUIRING -> BEGUN -> RUNNING -> COMMITTING -> COMMITTED --+
//!                 |         |           |                     +-> RELEASED
//!                 +---------+-----------+-> ROLLING_BACK -----+
//! ```
//!
//! Two entry points differ only in how the end of the handler is detected:
//! [`run_transaction`] waits for the future the handler returns, while
//! [`run_transaction_sync`] closes the scope as soon as the handler returns
//! and waits for the queries it issued.
//!
//! Callers cancel by dropping the returned future, e.g. through
//! `tokio::time::timeout`. The connection is then rolled back and released
//! in the background; work already issued is never committed.

use crate::db::connection::ConnectionPool;
use crate::db::executor::QueryExecutor;
use crate::db::queue::ConnectionQueue;
use crate::db::scope::TransactionScope;
use crate::error::{DbError, DbResult};
use std::future::Future;
use tracing::{debug, warn};

/// Run `handler` inside a transaction and resolve with its output.
///
/// The handler's future decides the outcome: `Ok` commits, `Err` rolls back
/// and is returned unchanged (or wrapped in [`DbError::RollbackFailed`] if
/// the rollback fails too). Queries issued through the scope but never
/// awaited still run before the commit.
pub async fn run_transaction<P, F, Fut, T>(
    pool: &P,
    executor: QueryExecutor,
    handler: F,
) -> DbResult<T>
where
    P: ConnectionPool,
    F: FnOnce(TransactionScope) -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let attempt = Attempt::start(pool, executor).await?;

    let outcome = match attempt.begin().await {
        Ok(()) => handler(attempt.scope.clone()).await,
        Err(err) => Err(err),
    };

    attempt.finish(outcome).await
}

/// Run a synchronous `handler` inside a transaction.
///
/// The handler only issues queries. When it returns, the scope is closed and
/// the queries issued so far are awaited; the first failure rolls the
/// transaction back. Queries issued later, including ones chained onto an
/// earlier query's completion, fail with [`DbError::TransactionClosed`].
pub async fn run_transaction_sync<P, F, T>(
    pool: &P,
    executor: QueryExecutor,
    handler: F,
) -> DbResult<T>
where
    P: ConnectionPool,
    F: FnOnce(&TransactionScope) -> T,
{
    let attempt = Attempt::start(pool, executor).await?;

    let outcome = match attempt.begin().await {
        Ok(()) => {
            let value = handler(&attempt.scope);
            let pending = attempt.scope.close();
            debug!(
                transaction_id = %attempt.transaction_id,
                queries = pending.len(),
                "Waiting for issued queries"
            );
            pending.settle().await.map(|()| value)
        }
        Err(err) => Err(err),
    };

    attempt.finish(outcome).await
}

/// State of one transaction attempt after the connection was acquired.
///
/// Dropping an attempt that has not released its connection (the caller's
/// future was cancelled, or the handler panicked) closes the scope and tells
/// the worker to roll back and hand the connection back on its own.
struct Attempt {
    transaction_id: String,
    scope: TransactionScope,
    queue: ConnectionQueue,
    released: bool,
}

impl Attempt {
    async fn start<P: ConnectionPool>(pool: &P, executor: QueryExecutor) -> DbResult<Self> {
        let conn = pool.get_connection().await?;
        let transaction_id = generate_transaction_id();
        let queue = ConnectionQueue::spawn(conn, executor, transaction_id.clone());
        let scope = TransactionScope::new(transaction_id.clone(), queue.clone());

        debug!(transaction_id = %transaction_id, "Connection acquired");

        Ok(Self {
            transaction_id,
            scope,
            queue,
            released: false,
        })
    }

    async fn begin(&self) -> DbResult<()> {
        self.queue.begin().await?;
        debug!(transaction_id = %self.transaction_id, "Transaction started");
        Ok(())
    }

    /// Commit or roll back depending on `outcome`, then release.
    async fn finish<T>(self, outcome: DbResult<T>) -> DbResult<T> {
        let settled = match outcome {
            Ok(value) => match self.commit().await {
                Ok(()) => Ok(value),
                Err(err) => Err(self.roll_back(err).await),
            },
            Err(err) => Err(self.roll_back(err).await),
        };

        self.release(settled).await
    }

    async fn commit(&self) -> DbResult<()> {
        // completed must be set before COMMIT is enqueued
        let pending = self.scope.close();
        debug!(
            transaction_id = %self.transaction_id,
            queries = pending.len(),
            "Committing transaction"
        );
        self.queue.commit().await?;
        debug!(transaction_id = %self.transaction_id, "Transaction committed");
        Ok(())
    }

    /// Roll back and return the error the caller should see.
    async fn roll_back(&self, original: DbError) -> DbError {
        self.scope.close();
        warn!(
            transaction_id = %self.transaction_id,
            error = %original,
            "Rolling back transaction"
        );

        match self.queue.rollback().await {
            Ok(()) => original,
            Err(rollback) => {
                warn!(
                    transaction_id = %self.transaction_id,
                    error = %rollback,
                    "Rollback failed"
                );
                DbError::rollback_failed(rollback, original)
            }
        }
    }

    /// Hand the connection back to its pool, or close it if the transaction
    /// could not be resolved.
    async fn release<T>(mut self, outcome: DbResult<T>) -> DbResult<T> {
        // the Release command is queued before the first await
        self.released = true;

        match self.queue.release().await {
            Ok(()) => {
                debug!(transaction_id = %self.transaction_id, "Connection released");
                outcome
            }
            Err(err) => {
                warn!(
                    transaction_id = %self.transaction_id,
                    error = %err,
                    "Failed to release connection"
                );
                Err(DbError::release_failed(err, outcome.err()))
            }
        }
    }
}

impl Drop for Attempt {
    fn drop(&mut self) {
        if !self.released {
            self.scope.close();
            self.queue.abandon();
        }
    }
}

/// Generate a unique transaction ID.
fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}
