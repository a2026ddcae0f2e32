//! Embedded schema migrations.
//!
//! The base schema predates the `error_category`/`details` columns; the
//! second migration adds them, so upgrades from old databases stay
//! additive.

use crate::error::{DatabaseError, Result};
use sqlx::{Pool, Sqlite};

/// Apply all pending migrations.
///
/// Idempotent: applied migrations are tracked in `_sqlx_migrations`.
///
/// # Errors
/// Returns `DatabaseError::Migration` if any migration fails to execute.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    tracing::debug!("Running database migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    Ok(())
}

/// Number of applied migrations (0 before any run).
///
/// # Errors
/// Returns `DatabaseError` if the migrations table cannot be queried.
pub async fn schema_version(pool: &Pool<Sqlite>) -> Result<i64> {
    let table_exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?
        > 0;
    if !table_exists {
        return Ok(0);
    }
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
