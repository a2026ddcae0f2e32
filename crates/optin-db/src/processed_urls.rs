//! Processed-URL records: one row per attempted signup.

use crate::error::Result;
use chrono::Utc;
use optin_core::Outcome;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};

/// One processed URL row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedUrl {
    /// Row id
    pub id: i64,
    /// The URL
    pub url: String,
    /// Source: csv, meta or database
    pub source: String,
    /// success / failed / skipped
    pub status: String,
    /// Selectors that were filled
    pub fields_filled: Vec<String>,
    /// Failure/skip reason
    pub error_message: Option<String>,
    /// Taxonomy category
    pub error_category: Option<String>,
    /// Extra context
    pub details: Option<String>,
    /// RFC3339 timestamp
    pub processed_at: String,
}

/// Whether this URL already has a row.
///
/// # Errors
/// Returns error if the query fails.
pub async fn is_url_processed(pool: &Pool<Sqlite>, url: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_urls WHERE url = ?")
        .bind(url)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Insert or update a processed-URL record (upsert on url).
///
/// # Errors
/// Returns error if the write fails.
pub async fn add_processed_url(
    pool: &Pool<Sqlite>,
    url: &str,
    source: &str,
    outcome: &Outcome,
    details: Option<&str>,
) -> Result<i64> {
    let fields_json = serde_json::to_string(&outcome.fields_filled)?;
    let status = outcome.status.as_str();
    let category = outcome.primary_category.map(|c| c.as_str());
    let details = details.or(outcome.details.as_deref());
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        "INSERT INTO processed_urls (url, source, status, fields_filled, error_message, error_category, details, processed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(url) DO UPDATE SET
             status = excluded.status,
             fields_filled = excluded.fields_filled,
             error_message = excluded.error_message,
             error_category = excluded.error_category,
             details = excluded.details,
             processed_at = excluded.processed_at",
    )
    .bind(url)
    .bind(source)
    .bind(status)
    .bind(&fields_json)
    .bind(outcome.primary_error.as_deref())
    .bind(category)
    .bind(details)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Most recent processed rows, newest first.
///
/// # Errors
/// Returns error if the query fails or stored JSON is corrupt.
pub async fn get_processed_urls(pool: &Pool<Sqlite>, limit: i64) -> Result<Vec<ProcessedUrl>> {
    let rows = sqlx::query(
        "SELECT id, url, source, status, fields_filled, error_message, error_category, details, processed_at
         FROM processed_urls ORDER BY processed_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let fields_json: Option<String> = row.try_get("fields_filled")?;
        let fields_filled = match fields_json {
            Some(json) if !json.is_empty() => serde_json::from_str(&json)?,
            _ => Vec::new(),
        };
        records.push(ProcessedUrl {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            source: row.try_get("source")?,
            status: row.try_get("status")?,
            fields_filled,
            error_message: row.try_get("error_message")?,
            error_category: row.try_get("error_category")?,
            details: row.try_get("details")?,
            processed_at: row.try_get("processed_at")?,
        });
    }
    Ok(records)
}

/// Counts by status.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessedStats {
    /// Total rows
    pub total: i64,
    /// status = success
    pub successful: i64,
    /// status = failed
    pub failed: i64,
    /// status = skipped
    pub skipped: i64,
}

/// Aggregate counts over all processed rows.
///
/// # Errors
/// Returns error if the query fails.
pub async fn get_stats(pool: &Pool<Sqlite>) -> Result<ProcessedStats> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total,
                SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END) AS successful,
                SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) AS failed,
                SUM(CASE WHEN status = 'skipped' THEN 1 ELSE 0 END) AS skipped
         FROM processed_urls",
    )
    .fetch_one(pool)
    .await?;
    Ok(ProcessedStats {
        total: row.try_get("total")?,
        successful: row.try_get::<Option<i64>, _>("successful")?.unwrap_or(0),
        failed: row.try_get::<Option<i64>, _>("failed")?.unwrap_or(0),
        skipped: row.try_get::<Option<i64>, _>("skipped")?.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use optin_core::{ErrorCategory, Outcome, OutcomeStatus};

    fn success_outcome() -> Outcome {
        let mut outcome = Outcome::skipped(ErrorCategory::NoForm, "x");
        outcome.status = OutcomeStatus::Success;
        outcome.primary_error = None;
        outcome.primary_category = None;
        outcome.fields_filled = vec!["#email".to_string()];
        outcome.field_types_filled = vec!["email".to_string()];
        outcome.submit_attempts = 1;
        outcome.form_submitted = true;
        outcome
    }

    #[tokio::test]
    async fn test_round_trip() {
        let db = Database::in_memory().await.expect("db");
        let outcome = success_outcome();

        add_processed_url(db.pool(), "https://a.test/", "csv", &outcome, Some("Newsletter"))
            .await
            .expect("insert");

        assert!(is_url_processed(db.pool(), "https://a.test/")
            .await
            .expect("check"));
        assert!(!is_url_processed(db.pool(), "https://b.test/")
            .await
            .expect("check"));

        let rows = get_processed_urls(db.pool(), 10).await.expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "success");
        assert_eq!(rows[0].fields_filled, vec!["#email"]);
        assert_eq!(rows[0].details.as_deref(), Some("Newsletter"));
    }

    #[tokio::test]
    async fn test_upsert_on_url() {
        let db = Database::in_memory().await.expect("db");
        let first = Outcome::skipped(ErrorCategory::NoForm, "no form");
        add_processed_url(db.pool(), "https://a.test/", "csv", &first, None)
            .await
            .expect("insert");

        let second = success_outcome();
        add_processed_url(db.pool(), "https://a.test/", "csv", &second, None)
            .await
            .expect("upsert");

        let rows = get_processed_urls(db.pool(), 10).await.expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "success");
    }

    #[tokio::test]
    async fn test_stats() {
        let db = Database::in_memory().await.expect("db");
        add_processed_url(db.pool(), "https://a.test/", "csv", &success_outcome(), None)
            .await
            .expect("insert");
        let skipped = Outcome::skipped(ErrorCategory::BlogArticle, "blog");
        add_processed_url(db.pool(), "https://b.test/", "csv", &skipped, None)
            .await
            .expect("insert");

        let stats = get_stats(db.pool()).await.expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_error_category_persisted() {
        let db = Database::in_memory().await.expect("db");
        let outcome = Outcome::skipped(ErrorCategory::AppStore, "App store URL: apps.apple.com");
        add_processed_url(db.pool(), "https://apps.apple.com/x", "meta", &outcome, None)
            .await
            .expect("insert");
        let rows = get_processed_urls(db.pool(), 1).await.expect("select");
        assert_eq!(rows[0].error_category.as_deref(), Some("app_store"));
    }
}
