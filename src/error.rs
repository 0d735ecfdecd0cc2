//! Error types for sqlscope.
//!
//! All failures surface as [`DbError`], built with `thiserror`. Driver errors
//! are passed through with their SQLSTATE and server error number intact so
//! callers can compare codes; the transaction layer adds its own variants for
//! closed scopes and for failures during rollback or release.

use thiserror::Error;

/// Code reported by [`DbError::code`] for queries issued on a closed scope.
pub const TRANSACTION_CLOSED_CODE: &str = "E_TRANSACTION_CLOSED";

#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42000" for a MySQL syntax error
        sql_state: Option<String>,
        /// MySQL server error number, e.g. 1064 (ER_PARSE_ERROR)
        error_number: Option<u16>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Transaction is already closed (transaction: {transaction_id})")]
    TransactionClosed { transaction_id: String },

    #[error("Rollback failed: {message} (original error: {original})")]
    RollbackFailed {
        message: String,
        original: Box<DbError>,
    },

    #[error("Connection release failed: {message}")]
    ReleaseFailed {
        message: String,
        original: Option<Box<DbError>>,
    },

    #[error("Transaction aborted: {reason}")]
    Aborted { reason: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            error_number: None,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create the error returned for queries on a completed transaction.
    pub fn transaction_closed(transaction_id: impl Into<String>) -> Self {
        Self::TransactionClosed {
            transaction_id: transaction_id.into(),
        }
    }

    /// Wrap a rollback failure, keeping the error that triggered the rollback.
    pub fn rollback_failed(rollback: DbError, original: DbError) -> Self {
        Self::RollbackFailed {
            message: rollback.to_string(),
            original: Box::new(original),
        }
    }

    /// Wrap a release failure, keeping the earlier error if the attempt had failed.
    pub fn release_failed(release: DbError, original: Option<DbError>) -> Self {
        Self::ReleaseFailed {
            message: release.to_string(),
            original: original.map(Box::new),
        }
    }

    /// Create the error a transaction handler returns to request a rollback.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Machine-comparable code: the driver's SQLSTATE, or
    /// [`TRANSACTION_CLOSED_CODE`] for closed scopes.
    ///
    /// Wrapped errors report the code of the error that caused them.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            Self::TransactionClosed { .. } => Some(TRANSACTION_CLOSED_CODE),
            Self::RollbackFailed { original, .. } => original.code(),
            Self::ReleaseFailed {
                original: Some(original),
                ..
            } => original.code(),
            _ => None,
        }
    }

    /// The error that started the failed attempt, when this one wraps it.
    pub fn original(&self) -> Option<&DbError> {
        match self {
            Self::RollbackFailed { original, .. } => Some(original),
            Self::ReleaseFailed { original, .. } => original.as_deref(),
            _ => None,
        }
    }

    /// Check if this error reports a query on a closed transaction scope.
    pub fn is_transaction_closed(&self) -> bool {
        matches!(self, Self::TransactionClosed { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let error_number = db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| e.number());
                DbError::Database {
                    message: db_err.message().to_string(),
                    sql_state: db_err.code().map(|c| c.to_string()),
                    error_number,
                    suggestion: "Check the SQL syntax and referenced objects".to_string(),
                }
            }
            // DbPool maps this itself, with its configured limit
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Raise acquire_timeout or max_connections",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Create a new Database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            other => DbError::internal(format!("Unexpected database error: {}", other)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
