//! sqlscope - command line entry point.
//!
//! Runs a single query, or several statements inside one transaction, and
//! prints the results as JSON on stdout. Logs go to stderr.

use clap::Parser;
use sqlscope::config::{Command, Config};
use sqlscope::{Database, DbError, NamedParams, RowSet};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Run `statements` in order on one transaction, stopping at the first failure.
async fn run_statements(
    db: &Database,
    statements: &[String],
    params: &NamedParams,
) -> Result<Vec<RowSet>, DbError> {
    db.transaction(|tx| async move {
        let mut results = Vec::with_capacity(statements.len());
        for sql in statements {
            results.push(tx.query(sql, Some(params)).await?);
        }
        Ok::<_, DbError>(results)
    })
    .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    init_tracing(&config);

    info!("Starting sqlscope v{}", env!("CARGO_PKG_VERSION"));

    let db = Database::connect(&config.database_options()).await?;
    let params = config.command.named_params();

    let output = match &config.command {
        Command::Query { sql, .. } => db
            .query(sql, Some(&params))
            .await
            .and_then(|rows| serde_json::to_value(rows).map_err(to_internal)),
        Command::Transaction { statements, .. } => run_statements(&db, statements, &params)
            .await
            .and_then(|rows| serde_json::to_value(rows).map_err(to_internal)),
    };

    db.close().await;

    match output {
        Ok(json) => {
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, code = ?e.code(), "Command failed");
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            Err(e.into())
        }
    }
}

fn to_internal(err: serde_json::Error) -> DbError {
    DbError::internal(format!("Failed to serialize result: {}", err))
}
