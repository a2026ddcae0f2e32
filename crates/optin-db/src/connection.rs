//! Database connection management.

use crate::error::{DatabaseError, Result};
use crate::migrations;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// SQLite connection pool with migrations applied at startup.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (creating if missing) the database at `path` and run pending
    /// migrations.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the file cannot be opened or a migration
    /// fails.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or_else(|| DatabaseError::Open("database path is not valid UTF-8".to_string()))?;
        let options = SqliteConnectOptions::from_str(path_str)
            .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::Open(e.to_string()))?;

        migrations::run_migrations(&pool).await?;
        tracing::info!("Database ready at {path_str}");
        Ok(Self { pool })
    }

    /// In-memory database for tests.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the pool cannot be created.
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps the shared in-memory database alive
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(|e| DatabaseError::Open(e.to_string()))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::Open(e.to_string()))?;
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool, for repository functions.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the pool gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::debug!("Database pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_connects_and_migrates() {
        let db = Database::in_memory().await.expect("create database");

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' \
             AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .expect("query tables");

        assert_eq!(tables, vec!["api_sessions", "processed_urls", "scraped_urls"]);
    }
}
