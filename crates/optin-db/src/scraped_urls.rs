//! The scraped-URL queue feeding the pipeline.

use crate::error::Result;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

/// Queue a scraped URL. Duplicates are ignored; returns whether a row was
/// inserted.
///
/// # Errors
/// Returns error if the write fails.
pub async fn add_scraped_url(
    pool: &Pool<Sqlite>,
    url: &str,
    ad_id: Option<&str>,
    advertiser: Option<&str>,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "INSERT OR IGNORE INTO scraped_urls (url, ad_id, advertiser, scraped_at, processed)
         VALUES (?, ?, ?, ?, 0)",
    )
    .bind(url)
    .bind(ad_id)
    .bind(advertiser)
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Queue a batch of URLs, skipping duplicates. Returns the insert count.
///
/// # Errors
/// Returns error if a write fails.
pub async fn add_scraped_urls_batch(
    pool: &Pool<Sqlite>,
    urls: &[(String, Option<String>, Option<String>)],
) -> Result<usize> {
    let mut added = 0;
    for (url, ad_id, advertiser) in urls {
        if add_scraped_url(pool, url, ad_id.as_deref(), advertiser.as_deref()).await? {
            added += 1;
        }
    }
    Ok(added)
}

/// Oldest unprocessed URLs, up to `limit`.
///
/// # Errors
/// Returns error if the query fails.
pub async fn get_unprocessed_urls(pool: &Pool<Sqlite>, limit: i64) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT url FROM scraped_urls WHERE processed = 0 ORDER BY scraped_at ASC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|row| row.try_get::<String, _>("url").map_err(Into::into))
        .collect()
}

/// Mark a queued URL processed.
///
/// # Errors
/// Returns error if the write fails.
pub async fn mark_url_processed(pool: &Pool<Sqlite>, url: &str) -> Result<()> {
    sqlx::query("UPDATE scraped_urls SET processed = 1 WHERE url = ?")
        .bind(url)
        .execute(pool)
        .await?;
    Ok(())
}

/// Queue counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrapedStats {
    /// Total queued rows
    pub total: i64,
    /// Rows already processed
    pub processed: i64,
    /// Rows still pending
    pub pending: i64,
}

/// Aggregate queue counts.
///
/// # Errors
/// Returns error if the query fails.
pub async fn get_stats(pool: &Pool<Sqlite>) -> Result<ScrapedStats> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total,
                SUM(CASE WHEN processed = 1 THEN 1 ELSE 0 END) AS processed
         FROM scraped_urls",
    )
    .fetch_one(pool)
    .await?;
    let total: i64 = row.try_get("total")?;
    let processed: i64 = row.try_get::<Option<i64>, _>("processed")?.unwrap_or(0);
    Ok(ScrapedStats {
        total,
        processed,
        pending: total - processed,
    })
}
