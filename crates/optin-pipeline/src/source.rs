//! URL sources.
//!
//! CSV files (only a url-like column is required) and the scraped-URL
//! queue. The meta source belongs to the external scraper; when selected,
//! the pipeline announces the switch with the `DATASOURCE_CHANGE:database`
//! token and drains the queue the scraper filled.

use crate::error::{PipelineError, Result};
use optin_core::DataSource;
use optin_db::{scraped_urls, Database};
use std::path::Path;

/// Column names accepted as the URL column, in preference order.
const URL_COLUMNS: &[&str] = &["url", "link", "landing_page", "website"];

/// One URL to process, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    /// The URL
    pub url: String,
    /// Source tag persisted with the outcome: csv, meta or database
    pub source: String,
}

/// Parse URLs from a CSV file. Rows without an http(s) URL are ignored.
///
/// # Errors
/// Returns error if the file cannot be read or no URL column exists.
pub fn load_csv_urls(path: impl AsRef<Path>) -> Result<Vec<UrlEntry>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| PipelineError::Csv(format!("cannot read {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::Csv(e.to_string()))?
        .clone();
    let url_index = headers
        .iter()
        .position(|h| URL_COLUMNS.contains(&h.to_lowercase().as_str()))
        .ok_or_else(|| {
            PipelineError::Csv(format!(
                "no URL column found (expected one of: {})",
                URL_COLUMNS.join(", ")
            ))
        })?;

    let mut urls = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| PipelineError::Csv(e.to_string()))?;
        if let Some(url) = record.get(url_index) {
            let url = url.trim();
            if url.starts_with("http") {
                urls.push(UrlEntry {
                    url: url.to_string(),
                    source: "csv".to_string(),
                });
            }
        }
    }
    tracing::info!("Parsed {} URLs from CSV", urls.len());
    Ok(urls)
}

/// Load the URL sequence for a run from the configured source.
///
/// # Errors
/// Returns error if the source cannot be read.
pub async fn load_urls(
    source: DataSource,
    csv_path: &str,
    db: &Database,
    limit: i64,
) -> Result<Vec<UrlEntry>> {
    match source {
        DataSource::Csv => {
            if csv_path.is_empty() {
                return Err(PipelineError::Config(
                    "csv source selected but no csv_path configured".to_string(),
                ));
            }
            load_csv_urls(csv_path)
        }
        DataSource::Meta => {
            // Scraping is an external collaborator that fills the queue;
            // switch to draining it and tell the front end.
            tracing::info!("DATASOURCE_CHANGE:database");
            drain_queue(db, limit).await
        }
        DataSource::Database => drain_queue(db, limit).await,
    }
}

async fn drain_queue(db: &Database, limit: i64) -> Result<Vec<UrlEntry>> {
    let urls = scraped_urls::get_unprocessed_urls(db.pool(), limit).await?;
    tracing::info!("Loaded {} unprocessed URLs from the queue", urls.len());
    Ok(urls
        .into_iter()
        .map(|url| UrlEntry {
            url,
            source: "database".to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_csv_with_url_column() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "id,url,notes").expect("write");
        writeln!(file, "1,https://a.test/,first").expect("write");
        writeln!(file, "2,not-a-url,second").expect("write");
        writeln!(file, "3,https://b.test/,third").expect("write");

        let urls = load_csv_urls(file.path()).expect("parse");
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].url, "https://a.test/");
        assert_eq!(urls[0].source, "csv");
    }

    #[test]
    fn test_csv_alternate_column_names() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "name,landing_page").expect("write");
        writeln!(file, "x,https://landing.test/").expect("write");

        let urls = load_csv_urls(file.path()).expect("parse");
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].url, "https://landing.test/");
    }

    #[test]
    fn test_csv_missing_url_column() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "name,email").expect("write");
        writeln!(file, "x,a@b.c").expect("write");

        let err = load_csv_urls(file.path()).unwrap_err();
        assert!(err.to_string().contains("no URL column"));
    }

    #[tokio::test]
    async fn test_database_source_drains_queue() {
        let db = Database::in_memory().await.expect("db");
        optin_db::scraped_urls::add_scraped_url(db.pool(), "https://q.test/", None, None)
            .await
            .expect("queue");

        let urls = load_urls(DataSource::Database, "", &db, 10)
            .await
            .expect("load");
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].source, "database");
    }

    #[tokio::test]
    async fn test_meta_source_switches_to_queue() {
        let db = Database::in_memory().await.expect("db");
        let urls = load_urls(DataSource::Meta, "", &db, 10).await.expect("load");
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn test_csv_source_requires_path() {
        let db = Database::in_memory().await.expect("db");
        let err = load_urls(DataSource::Csv, "", &db, 10).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
