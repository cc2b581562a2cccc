use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::CoreError;

// Re-export the pool for use in other parts of the core crate
pub use sqlx::SqlitePool as DbPool;

/// Establishes a connection pool to the SQLite database and runs migrations.
///
/// Missing parent directories and the database file are created. Foreign keys
/// are enforced on every connection, and `busy_timeout` makes a writer wait
/// out a concurrent transaction instead of failing immediately.
pub async fn establish_connection(config: &DatabaseConfig) -> Result<DbPool, CoreError> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::debug!(path = %config.path.display(), "Database ready");
    Ok(pool)
}

/// Shorthand for [`establish_connection`] with default pool settings.
pub async fn connect_path(path: impl AsRef<Path>) -> Result<DbPool, CoreError> {
    let config = DatabaseConfig {
        path: path.as_ref().to_path_buf(),
        ..DatabaseConfig::default()
    };
    establish_connection(&config).await
}
