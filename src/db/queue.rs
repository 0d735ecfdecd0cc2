//! Per-connection command queue.
//!
//! While a transaction is in flight its connection is owned by a worker task.
//! Queries, begin, commit and rollback reach the connection only through an
//! unbounded FIFO channel, so they run in exactly the order they were
//! enqueued. Enqueuing is synchronous: a query accepted by a transaction
//! scope is already ahead of any commit or rollback issued afterwards.
//!
//! The worker also decides how the connection leaves it. A connection whose
//! last `BEGIN` was not followed by a successful `COMMIT` or `ROLLBACK` is
//! closed rather than returned to the pool. If the owning transaction goes
//! away without releasing (its future was dropped, or the handler panicked),
//! the worker rolls back on its own before handing the connection back.

use crate::db::connection::PooledConnection;
use crate::db::executor::QueryExecutor;
use crate::error::{DbError, DbResult};
use crate::models::{NamedParams, RowSet};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub(crate) enum Command {
    Query {
        sql: String,
        params: Option<NamedParams>,
        reply: oneshot::Sender<DbResult<RowSet>>,
        /// Completion signal for the scope's pending set.
        settled: oneshot::Sender<DbResult<()>>,
    },
    Begin(oneshot::Sender<DbResult<()>>),
    Commit(oneshot::Sender<DbResult<()>>),
    Rollback(oneshot::Sender<DbResult<()>>),
    /// Hand the connection back and stop the worker.
    Release(oneshot::Sender<DbResult<()>>),
    /// The transaction was dropped before it released the connection.
    Abandon,
}

/// Sending half of a connection queue.
#[derive(Clone)]
pub(crate) struct ConnectionQueue {
    tx: mpsc::UnboundedSender<Command>,
}

impl ConnectionQueue {
    /// Move `conn` into a worker task and return the queue feeding it.
    pub(crate) fn spawn<C: PooledConnection>(
        conn: C,
        executor: QueryExecutor,
        transaction_id: String,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(conn, executor, transaction_id, rx));
        Self { tx }
    }

    /// Enqueue a command without waiting.
    pub(crate) fn send(&self, command: Command) -> DbResult<()> {
        self.tx
            .send(command)
            .map_err(|_| DbError::internal("Connection worker has stopped"))
    }

    pub(crate) async fn begin(&self) -> DbResult<()> {
        self.round_trip(Command::Begin).await
    }

    pub(crate) async fn commit(&self) -> DbResult<()> {
        self.round_trip(Command::Commit).await
    }

    pub(crate) async fn rollback(&self) -> DbResult<()> {
        self.round_trip(Command::Rollback).await
    }

    /// Return the connection to its pool, or close it if a transaction may
    /// still be open on it.
    pub(crate) async fn release(&self) -> DbResult<()> {
        self.round_trip(Command::Release).await
    }

    pub(crate) fn abandon(&self) {
        // A worker that already exited has nothing left to clean up.
        let _ = self.tx.send(Command::Abandon);
    }

    async fn round_trip(
        &self,
        command: impl FnOnce(oneshot::Sender<DbResult<()>>) -> Command,
    ) -> DbResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply))?;
        rx.await
            .map_err(|_| DbError::internal("Connection worker stopped before replying"))?
    }
}

async fn run_worker<C: PooledConnection>(
    mut conn: C,
    executor: QueryExecutor,
    transaction_id: String,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    // set when BEGIN is issued, cleared by a successful COMMIT or ROLLBACK
    let mut open = false;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Query {
                sql,
                params,
                reply,
                settled,
            } => {
                let result = executor.execute(&mut conn, &sql, params.as_ref()).await;
                let _ = settled.send(result.as_ref().map(|_| ()).map_err(Clone::clone));
                let _ = reply.send(result);
            }
            Command::Begin(reply) => {
                open = true;
                let _ = reply.send(conn.begin_transaction().await);
            }
            Command::Commit(reply) => {
                let result = conn.commit().await;
                open &= result.is_err();
                let _ = reply.send(result);
            }
            Command::Rollback(reply) => {
                let result = conn.rollback().await;
                open &= result.is_err();
                let _ = reply.send(result);
            }
            Command::Release(reply) => {
                let _ = reply.send(hand_back(conn, open, &transaction_id).await);
                debug!(transaction_id = %transaction_id, "Connection worker stopped");
                return;
            }
            Command::Abandon => break,
        }
    }

    warn!(
        transaction_id = %transaction_id,
        "Transaction dropped before completion"
    );
    if open {
        match conn.rollback().await {
            Ok(()) => open = false,
            Err(err) => warn!(
                transaction_id = %transaction_id,
                error = %err,
                "Rollback of dropped transaction failed"
            ),
        }
    }
    if let Err(err) = hand_back(conn, open, &transaction_id).await {
        warn!(
            transaction_id = %transaction_id,
            error = %err,
            "Failed to release connection of dropped transaction"
        );
    }
}

async fn hand_back<C: PooledConnection>(
    conn: C,
    open: bool,
    transaction_id: &str,
) -> DbResult<()> {
    if open {
        warn!(
            transaction_id = %transaction_id,
            "Closing connection left inside a transaction"
        );
        conn.discard().await
    } else {
        conn.release().await
    }
}
