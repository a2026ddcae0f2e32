//! API cost sessions: one row per model per run.

use crate::error::Result;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

/// One model's usage within a run, ready for persistence.
#[derive(Debug, Clone)]
pub struct SessionUsage {
    /// Model name
    pub model: String,
    /// Input tokens
    pub input_tokens: i64,
    /// Output tokens
    pub output_tokens: i64,
    /// Cost in USD, stored as a decimal string for precision
    pub cost: String,
    /// API calls made
    pub api_calls: i64,
}

/// Persist a run's per-model usage. Returns the row count written.
///
/// # Errors
/// Returns error if a write fails.
pub async fn save_session(pool: &Pool<Sqlite>, entries: &[SessionUsage]) -> Result<usize> {
    let session_start = Utc::now().to_rfc3339();
    let mut written = 0;
    for entry in entries {
        sqlx::query(
            "INSERT INTO api_sessions (session_start, model, input_tokens, output_tokens, cost, api_calls)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&session_start)
        .bind(&entry.model)
        .bind(entry.input_tokens)
        .bind(entry.output_tokens)
        .bind(&entry.cost)
        .bind(entry.api_calls)
        .execute(pool)
        .await?;
        written += 1;
    }
    Ok(written)
}

/// Total cost across all recorded sessions.
///
/// # Errors
/// Returns error if the query fails.
pub async fn total_cost(pool: &Pool<Sqlite>) -> Result<f64> {
    let rows = sqlx::query("SELECT cost FROM api_sessions")
        .fetch_all(pool)
        .await?;
    let mut total = 0.0;
    for row in rows {
        let cost: String = row.try_get("cost")?;
        total += cost.parse::<f64>().unwrap_or(0.0);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;

    #[tokio::test]
    async fn test_save_and_total() {
        let db = Database::in_memory().await.expect("db");
        let entries = vec![
            SessionUsage {
                model: "gpt-4o-mini".to_string(),
                input_tokens: 10_000,
                output_tokens: 2_000,
                cost: "0.0027".to_string(),
                api_calls: 5,
            },
            SessionUsage {
                model: "gpt-4o".to_string(),
                input_tokens: 1_000,
                output_tokens: 100,
                cost: "0.0035".to_string(),
                api_calls: 1,
            },
        ];
        let written = save_session(db.pool(), &entries).await.expect("save");
        assert_eq!(written, 2);

        let total = total_cost(db.pool()).await.expect("total");
        assert!((total - 0.0062).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_session_writes_nothing() {
        let db = Database::in_memory().await.expect("db");
        let written = save_session(db.pool(), &[]).await.expect("save");
        assert_eq!(written, 0);
        assert!(total_cost(db.pool()).await.expect("total").abs() < f64::EPSILON);
    }
}
