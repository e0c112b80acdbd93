//! SQLite pool construction for the claims store.
//!
//! Every connection gets the same pragma set: foreign keys enforced so
//! source and observation rows cannot outlive their water system, WAL so
//! portal reads keep flowing during provider submissions, and a busy
//! timeout so concurrent writers queue instead of failing fast.

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use aquaclaim_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

const CONNECTION_PRAGMAS: &[&str] = &[
    "PRAGMA foreign_keys = ON",
    "PRAGMA journal_mode = WAL",
    "PRAGMA busy_timeout = 5000",
];

/// Opens the pool described by the database section of the app config.
pub async fn connect(database: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&database.url, database.max_connections, database.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                for pragma in CONNECTION_PRAGMAS {
                    sqlx::query(pragma).execute(&mut *conn).await?;
                }
                Ok(())
            })
        })
        .connect(database_url)
        .await
}
