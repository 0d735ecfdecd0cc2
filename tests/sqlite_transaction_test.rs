//! Integration tests against a real SQLite file.
//!
//! Verifies that committed work becomes visible to other connections,
//! rolled-back work never does, and driver errors come back unchanged.

use sqlscope::{
    Database, DatabaseOptions, DatabaseType, DbError, NamedParams, PoolOptions, SqlValue,
};
use std::time::Duration;
use tempfile::TempDir;

/// Create a SQLite database with an empty `users` table.
async fn setup_db() -> (Database, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.db");
    let options = DatabaseOptions::from_dsn(format!("sqlite:{}", path.display()));

    let db = Database::connect(&options).await.unwrap();
    db.query(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)",
        None,
    )
    .await
    .unwrap();

    (db, dir)
}

/// Like [`setup_db`], but with a pool that holds a single connection.
async fn setup_single_connection_db(acquire_timeout_secs: Option<u64>) -> (Database, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("single.db");
    let options = DatabaseOptions {
        dsn: Some(format!("sqlite:{}", path.display())),
        pool: PoolOptions {
            max_connections: Some(1),
            acquire_timeout_secs,
            ..PoolOptions::default()
        },
        ..DatabaseOptions::default()
    };

    let db = Database::connect(&options).await.unwrap();
    db.query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", None)
        .await
        .unwrap();

    (db, dir)
}

async fn user_count(db: &Database) -> i64 {
    let rows = db
        .query("SELECT COUNT(*) AS n FROM users", None)
        .await
        .unwrap();
    rows.rows()[0]["n"].as_i64().unwrap()
}

fn params(pairs: &[(&str, SqlValue)]) -> NamedParams {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_connect_reports_backend() {
    let (db, _dir) = setup_db().await;
    assert_eq!(db.database_type(), DatabaseType::SQLite);
    db.close().await;
}

#[tokio::test]
async fn test_query_with_named_params() {
    let (db, _dir) = setup_db().await;

    let insert = db
        .query(
            "INSERT INTO users (name, age) VALUES (:name, :age)",
            Some(&params(&[
                ("name", SqlValue::from("O'Brien")),
                ("age", SqlValue::Int(41)),
            ])),
        )
        .await
        .unwrap();
    assert_eq!(insert.rows_affected(), 1);
    assert_eq!(insert.statements()[0].last_insert_id, Some(1));

    let rows = db
        .query(
            "SELECT name, age FROM users WHERE name = :name",
            Some(&params(&[("name", SqlValue::from("O'Brien"))])),
        )
        .await
        .unwrap();

    assert_eq!(rows.statements()[0].columns, vec!["name", "age"]);
    assert_eq!(rows.rows().len(), 1);
    assert_eq!(rows.rows()[0]["name"], "O'Brien");
    assert_eq!(rows.rows()[0]["age"], 41);
}

#[tokio::test]
async fn test_committed_rows_visible_only_after_commit() {
    let (db, _dir) = setup_db().await;
    let outside = db.clone();

    let seen_inside = db
        .transaction(|tx| async move {
            tx.query("INSERT INTO users (name) VALUES ('alice')", None)
                .await?;
            let inside = tx
                .query("SELECT COUNT(*) AS n FROM users", None)
                .await?
                .rows()[0]["n"]
                .as_i64();
            // another pooled connection still sees the old state
            let before_commit = user_count(&outside).await;
            Ok::<_, DbError>((inside, before_commit))
        })
        .await
        .unwrap();

    assert_eq!(seen_inside, (Some(1), 0));
    assert_eq!(user_count(&db).await, 1);
}

#[tokio::test]
async fn test_failed_transaction_rolls_back() {
    let (db, _dir) = setup_db().await;

    let err = db
        .transaction(|tx| async move {
            tx.query("INSERT INTO users (name) VALUES ('bob')", None)
                .await?;
            tx.query("INSERT INTO no_such_table (x) VALUES (1)", None)
                .await?;
            Ok::<_, DbError>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Database { .. }));
    assert!(err.to_string().contains("no_such_table"));
    assert_eq!(user_count(&db).await, 0);
}

#[tokio::test]
async fn test_aborted_transaction_rolls_back() {
    let (db, _dir) = setup_db().await;

    let err = db
        .transaction(|tx| async move {
            tx.query("INSERT INTO users (name) VALUES ('carol')", None)
                .await?;
            Err::<(), _>(DbError::aborted("changed my mind"))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Aborted { .. }));
    assert_eq!(user_count(&db).await, 0);
}

#[tokio::test]
async fn test_sync_transaction_commits_all_queries() {
    let (db, _dir) = setup_db().await;
    let names = ["dave", "erin", "frank"];

    db.transaction_sync(|tx| {
        for name in names {
            let values = params(&[("name", SqlValue::from(name))]);
            let _ = tx.query("INSERT INTO users (name) VALUES (:name)", Some(&values));
        }
    })
    .await
    .unwrap();

    assert_eq!(user_count(&db).await, 3);
}

#[tokio::test]
async fn test_sync_transaction_rolls_back_on_any_failure() {
    let (db, _dir) = setup_db().await;

    let err = db
        .transaction_sync(|tx| {
            let _ = tx.query("INSERT INTO users (name) VALUES ('gina')", None);
            let _ = tx.query("INSERT INTO users (name) VALUES (NULL)", None);
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Database { .. }));
    assert_eq!(user_count(&db).await, 0);
}

#[tokio::test]
async fn test_paramify_in_list() {
    let (db, _dir) = setup_db().await;
    for name in ["a", "b", "c"] {
        db.query(
            "INSERT INTO users (name) VALUES (:name)",
            Some(&params(&[("name", SqlValue::from(name))])),
        )
        .await
        .unwrap();
    }

    let binding = db.paramify(["a", "c"], "n");
    let sql = format!(
        "SELECT name FROM users WHERE name IN ({}) ORDER BY name",
        binding.placeholder_list()
    );
    let rows = db.query(&sql, Some(&binding.values)).await.unwrap();

    let names: Vec<_> = rows
        .rows()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["a", "c"]);
}

#[tokio::test]
async fn test_multiple_statements_rejected_by_default() {
    let (db, _dir) = setup_db().await;

    let err = db
        .query("INSERT INTO users (name) VALUES ('x'); DELETE FROM users;", None)
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::InvalidInput { .. }));
    assert_eq!(user_count(&db).await, 0);
}

#[tokio::test]
async fn test_multiple_statements_when_enabled() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("multi.db");
    let options = DatabaseOptions {
        dsn: Some(format!("sqlite:{}", path.display())),
        multiple_statements: true,
        ..DatabaseOptions::default()
    };
    let db = Database::connect(&options).await.unwrap();

    let rows = db
        .query(
            "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1); SELECT v FROM t;",
            None,
        )
        .await
        .unwrap();

    assert_eq!(rows.statements().len(), 3);
    assert_eq!(rows.statements()[1].rows_affected, 1);
    assert_eq!(rows.statements()[2].rows[0]["v"], 1);
}

#[tokio::test]
async fn test_cancelled_transaction_is_rolled_back() {
    let (db, _dir) = setup_single_connection_db(None).await;

    let result = tokio::time::timeout(
        Duration::from_millis(200),
        db.transaction(|tx| async move {
            tx.query("INSERT INTO users (name) VALUES ('ghost')", None)
                .await?;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DbError>(())
        }),
    )
    .await;
    assert!(result.is_err());

    // the pool's only connection comes back after the rollback
    assert_eq!(user_count(&db).await, 0);

    db.transaction(|tx| async move {
        tx.query("INSERT INTO users (name) VALUES ('real')", None)
            .await
    })
    .await
    .unwrap();
    assert_eq!(user_count(&db).await, 1);
}

#[tokio::test]
async fn test_acquire_timeout_reports_configured_limit() {
    let (db, _dir) = setup_single_connection_db(Some(1)).await;
    let outside = db.clone();

    // the transaction holds the only connection
    let err = db
        .transaction(|tx| async move {
            tx.query("SELECT 1", None).await?;
            Ok::<_, DbError>(outside.query("SELECT 1", None).await)
        })
        .await
        .unwrap()
        .unwrap_err();

    assert!(
        matches!(err, DbError::Timeout { elapsed_secs: 1, .. }),
        "unexpected error: {err:?}"
    );
    assert_eq!(db.pool().acquire_timeout(), Duration::from_secs(1));
}
