//! Query execution.
//!
//! [`QueryExecutor`] runs one query against any [`QueryTarget`]:
//! - `:name` parameters are substituted using the target's dialect
//! - multiple statements per call are rejected unless enabled
//! - elapsed time is recorded on the returned [`RowSet`]
//! - verbose mode emits diagnostics keyed by a fingerprint of the query text
//!
//! Failures from the target are returned unchanged. There are no retries.

use crate::db::connection::QueryTarget;
use crate::db::format::query_format;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, NamedParams, RowSet};
use sha2::{Digest, Sha256};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::tokenizer::{Token, Tokenizer};
use std::time::Instant;
use tracing::{debug, info};

/// Hex digits kept from the SHA-256 of the query text.
const FINGERPRINT_LEN: usize = 32;

/// Query executor shared by the pool path and the transaction path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryExecutor {
    multiple_statements: bool,
    verbose: bool,
}

impl QueryExecutor {
    /// Create an executor with single-statement queries and no diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow or forbid several `;`-separated statements in one call.
    pub fn with_multiple_statements(mut self, allowed: bool) -> Self {
        self.multiple_statements = allowed;
        self
    }

    /// Enable or disable verbose query diagnostics.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn multiple_statements(&self) -> bool {
        self.multiple_statements
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Substitute named parameters, logging the result in verbose mode.
    pub fn format(&self, sql: &str, values: Option<&NamedParams>, db_type: DatabaseType) -> String {
        let formatted = query_format(sql, values, db_type);
        if self.verbose && values.is_some() {
            info!(
                sql = %formatted,
                query_id = %fingerprint(sql),
                "Formatted query"
            );
        }
        formatted
    }

    /// Execute one query against `target`.
    pub async fn execute<T: QueryTarget>(
        &self,
        target: &mut T,
        sql: &str,
        params: Option<&NamedParams>,
    ) -> DbResult<RowSet> {
        let db_type = target.database_type();
        let formatted = self.format(sql, params, db_type);

        if !self.multiple_statements {
            ensure_single_statement(&formatted, db_type)?;
        }

        debug!(
            db_type = %db_type,
            params = params.map_or(0, |p| p.len()),
            "Executing query"
        );

        let start = Instant::now();
        let statements = target.run_query(&formatted).await?;
        let elapsed = start.elapsed();

        if self.verbose {
            info!(
                t = elapsed.as_secs_f64(),
                query_id = %fingerprint(sql),
                "Query"
            );
        }

        Ok(RowSet::new(statements, elapsed.as_millis() as u64))
    }
}

/// Deterministic identifier for a query text, used to correlate diagnostics.
pub fn fingerprint(sql: &str) -> String {
    let mut hex = format!("{:x}", Sha256::digest(sql.as_bytes()));
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Get the SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Count `;`-separated statements, ignoring comments and empty statements.
///
/// Returns `None` when the text cannot be tokenized; the driver then gets to
/// report the problem itself.
pub(crate) fn statement_count(sql: &str, db_type: DatabaseType) -> Option<usize> {
    let dialect = get_dialect(db_type);
    let tokens = Tokenizer::new(dialect.as_ref(), sql).tokenize().ok()?;

    let mut count = 0;
    let mut in_statement = false;
    for token in tokens {
        match token {
            Token::SemiColon => in_statement = false,
            Token::Whitespace(_) | Token::EOF => {}
            _ if !in_statement => {
                count += 1;
                in_statement = true;
            }
            _ => {}
        }
    }
    Some(count)
}

fn ensure_single_statement(sql: &str, db_type: DatabaseType) -> DbResult<()> {
    match statement_count(sql, db_type) {
        Some(count) if count > 1 => Err(DbError::invalid_input(format!(
            "Query contains {} statements but multiple statements are disabled",
            count
        ))),
        _ => Ok(()),
    }
}
