//! Scripted in-memory pool used by the lifecycle tests.
//!
//! Every operation appends to a shared event log: `ACQUIRE`, `BEGIN`,
//! `QUERY <sql>`, `POOL <sql>`, `COMMIT`, `ROLLBACK`, `RELEASE`, `DISCARD`
//! (connection closed instead of returned). Queries whose
//! text contains `FAIL` fail with SQLSTATE 42000. Individual steps can be
//! made to fail through [`Failures`].

#![allow(dead_code)]

use parking_lot::Mutex;
use sqlscope::db::{ConnectionPool, PooledConnection, QueryTarget};
use sqlscope::models::{Row, StatementResult};
use sqlscope::{DatabaseType, DbError, DbResult};
use std::sync::Arc;
use std::time::Duration;

/// Steps that should fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct Failures {
    pub acquire: bool,
    pub begin: bool,
    pub commit: bool,
    pub rollback: bool,
    pub release: bool,
}

#[derive(Default)]
struct MockState {
    log: Mutex<Vec<String>>,
    failures: Mutex<Failures>,
    query_delay: Mutex<Option<Duration>>,
    acquired: Mutex<usize>,
}

#[derive(Clone, Default)]
pub struct MockPool {
    state: Arc<MockState>,
}

impl MockPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failures: Failures) -> Self {
        let pool = Self::new();
        *pool.state.failures.lock() = failures;
        pool
    }

    /// Make every query sleep first, so unawaited work is still in flight
    /// when the handler finishes.
    pub fn with_query_delay(self, delay: Duration) -> Self {
        *self.state.query_delay.lock() = Some(delay);
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.state.log.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.log().iter().filter(|e| e.as_str() == event).count()
    }

    pub fn acquired(&self) -> usize {
        *self.state.acquired.lock()
    }

    /// Connections handed back, whether returned to the pool or closed.
    pub fn handed_back(&self) -> usize {
        self.count("RELEASE") + self.count("DISCARD")
    }

    /// Wait until `event` shows up in the log; cleanup after a dropped
    /// transaction runs on the connection's worker task.
    pub async fn wait_for(&self, event: &str) {
        for _ in 0..200 {
            if self.count(event) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{} never logged, got {:?}", event, self.log());
    }

    fn record(&self, event: impl Into<String>) {
        self.state.log.lock().push(event.into());
    }

    fn failures(&self) -> Failures {
        *self.state.failures.lock()
    }

    async fn answer(&self, prefix: &str, sql: &str) -> DbResult<Vec<StatementResult>> {
        let delay = *self.state.query_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(format!("{} {}", prefix, sql));

        if sql.contains("FAIL") {
            return Err(syntax_error());
        }

        let mut row = Row::new();
        row.insert("sql".to_string(), sql.into());
        Ok(vec![StatementResult {
            columns: vec!["sql".to_string()],
            rows: vec![row],
            rows_affected: 1,
            last_insert_id: None,
        }])
    }
}

pub fn syntax_error() -> DbError {
    DbError::database(
        "You have an error in your SQL syntax near 'FAIL'",
        Some("42000".to_string()),
        "Check the SQL syntax",
    )
}

fn step(failing: bool, name: &str) -> DbResult<()> {
    if failing {
        Err(DbError::connection(format!("{} failed", name), "Retry later"))
    } else {
        Ok(())
    }
}

impl QueryTarget for MockPool {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn run_query(&mut self, sql: &str) -> DbResult<Vec<StatementResult>> {
        self.answer("POOL", sql).await
    }
}

impl ConnectionPool for MockPool {
    type Connection = MockConnection;

    async fn get_connection(&self) -> DbResult<MockConnection> {
        step(self.failures().acquire, "acquire")?;
        *self.state.acquired.lock() += 1;
        self.record("ACQUIRE");
        Ok(MockConnection { pool: self.clone() })
    }

    async fn close(&self) {
        self.record("CLOSE");
    }
}

pub struct MockConnection {
    pool: MockPool,
}

impl QueryTarget for MockConnection {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn run_query(&mut self, sql: &str) -> DbResult<Vec<StatementResult>> {
        self.pool.answer("QUERY", sql).await
    }
}

impl PooledConnection for MockConnection {
    async fn begin_transaction(&mut self) -> DbResult<()> {
        self.pool.record("BEGIN");
        step(self.pool.failures().begin, "begin")
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.pool.record("COMMIT");
        step(self.pool.failures().commit, "commit")
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.pool.record("ROLLBACK");
        step(self.pool.failures().rollback, "rollback")
    }

    async fn release(self) -> DbResult<()> {
        self.pool.record("RELEASE");
        step(self.pool.failures().release, "release")
    }

    async fn discard(self) -> DbResult<()> {
        self.pool.record("DISCARD");
        step(self.pool.failures().release, "discard")
    }
}
