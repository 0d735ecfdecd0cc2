//! Transaction scope handed to transaction handlers.
//!
//! A [`TransactionScope`] exposes a single operation, [`TransactionScope::query`].
//! It never begins, commits, rolls back or releases anything; the lifecycle
//! manager in [`crate::db::transaction`] does. Once the manager closes the
//! scope every further query fails with [`DbError::TransactionClosed`]
//! without reaching the connection.

use crate::db::queue::{Command, ConnectionQueue};
use crate::error::{DbError, DbResult};
use crate::models::{NamedParams, RowSet};
use parking_lot::Mutex;
use std::future::{Future, Ready};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Query access to one in-flight transaction.
///
/// Cloning is cheap; clones share the same connection queue and the same
/// completion state.
#[derive(Clone)]
pub struct TransactionScope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    transaction_id: String,
    queue: ConnectionQueue,
    state: Mutex<ScopeState>,
}

#[derive(Default)]
struct ScopeState {
    completed: bool,
    pending: Vec<oneshot::Receiver<DbResult<()>>>,
}

impl TransactionScope {
    pub(crate) fn new(transaction_id: impl Into<String>, queue: ConnectionQueue) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                transaction_id: transaction_id.into(),
                queue,
                state: Mutex::new(ScopeState::default()),
            }),
        }
    }

    /// Identifier used in logs and in [`DbError::TransactionClosed`].
    pub fn transaction_id(&self) -> &str {
        &self.inner.transaction_id
    }

    /// Check whether the owning transaction has stopped accepting queries.
    pub fn is_completed(&self) -> bool {
        self.inner.state.lock().completed
    }

    /// Run a query inside the transaction.
    ///
    /// The query is enqueued on the transaction's connection immediately and
    /// runs even if the returned handle is dropped. On a completed scope the
    /// handle resolves to [`DbError::TransactionClosed`] and nothing is sent.
    pub fn query(&self, sql: &str, params: Option<&NamedParams>) -> QueryHandle {
        let mut state = self.inner.state.lock();
        if state.completed {
            return QueryHandle::failed(self.closed_error());
        }

        let (reply, rx) = oneshot::channel();
        let (settled, settled_rx) = oneshot::channel();
        let command = Command::Query {
            sql: sql.to_string(),
            params: params.cloned(),
            reply,
            settled,
        };
        if self.inner.queue.send(command).is_err() {
            return QueryHandle::failed(self.closed_error());
        }

        state.pending.push(settled_rx);
        QueryHandle::pending(rx)
    }

    /// Stop accepting queries and take the queries issued so far.
    ///
    /// Holding the state lock while enqueuing in [`Self::query`] makes this a
    /// strict boundary: every accepted query is already in the connection
    /// queue when this returns.
    pub(crate) fn close(&self) -> PendingQuerySet {
        let mut state = self.inner.state.lock();
        state.completed = true;
        PendingQuerySet {
            entries: std::mem::take(&mut state.pending),
        }
    }

    fn closed_error(&self) -> DbError {
        DbError::transaction_closed(&self.inner.transaction_id)
    }
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("transaction_id", &self.inner.transaction_id)
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Completion signals of the queries issued through a scope, in issue order.
pub(crate) struct PendingQuerySet {
    entries: Vec<oneshot::Receiver<DbResult<()>>>,
}

impl PendingQuerySet {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Wait for every query; fail with the first error.
    ///
    /// Queries run one at a time in issue order, so the first failure in
    /// order is also the first to happen.
    pub(crate) async fn settle(self) -> DbResult<()> {
        for entry in self.entries {
            entry.await.map_err(|_| {
                DbError::internal("Connection worker stopped before the query completed")
            })??;
        }
        Ok(())
    }
}

/// Result of [`TransactionScope::query`]; resolves to the query's row set.
pub struct QueryHandle {
    state: HandleState,
}

enum HandleState {
    Failed(Ready<DbResult<RowSet>>),
    Pending(oneshot::Receiver<DbResult<RowSet>>),
}

impl QueryHandle {
    fn failed(err: DbError) -> Self {
        Self {
            state: HandleState::Failed(std::future::ready(Err(err))),
        }
    }

    fn pending(rx: oneshot::Receiver<DbResult<RowSet>>) -> Self {
        Self {
            state: HandleState::Pending(rx),
        }
    }
}

impl Future for QueryHandle {
    type Output = DbResult<RowSet>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Failed(ready) => Pin::new(ready).poll(cx),
            HandleState::Pending(rx) => Pin::new(rx).poll(cx).map(|received| {
                received.unwrap_or_else(|_| {
                    Err(DbError::internal(
                        "Connection worker stopped before the query completed",
                    ))
                })
            }),
        }
    }
}
