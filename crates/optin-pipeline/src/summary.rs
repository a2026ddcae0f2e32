//! Run statistics and the end-of-run summary.

use optin_core::ErrorCategory;
use optin_llm::CostSummary;
use std::collections::BTreeMap;
use std::time::Duration;

/// Counters accumulated across one run.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    /// URLs the agent actually attempted
    pub total_attempts: i64,
    /// Successful signups
    pub successful_signups: i64,
    /// Failed attempts
    pub failed_attempts: i64,
    /// URLs skipped as duplicates before processing
    pub duplicates_skipped: i64,
    /// Skips by taxonomy category
    pub skips_by_category: BTreeMap<String, i64>,
}

impl RunStats {
    /// Record one skip under its category.
    pub fn note_skip(&mut self, category: Option<ErrorCategory>) {
        let key = category.map_or_else(|| "other".to_string(), |c| c.as_str().to_string());
        *self.skips_by_category.entry(key).or_insert(0) += 1;
    }

    /// Total skipped URLs.
    #[must_use]
    pub fn total_skipped(&self) -> i64 {
        self.skips_by_category.values().sum()
    }
}

/// Emit the textual run summary.
pub fn print_summary(stats: &RunStats, costs: &CostSummary, elapsed: Duration) {
    tracing::info!("Run summary");
    tracing::info!("  elapsed: {:.0}s", elapsed.as_secs_f64());
    tracing::info!("  attempts: {}", stats.total_attempts);
    tracing::info!("  successful signups: {}", stats.successful_signups);
    tracing::info!("  failed: {}", stats.failed_attempts);
    tracing::info!("  duplicates skipped: {}", stats.duplicates_skipped);
    if !stats.skips_by_category.is_empty() {
        tracing::info!("  skipped: {}", stats.total_skipped());
        for (category, count) in &stats.skips_by_category {
            tracing::info!("    {category}: {count}");
        }
    }
    if costs.total_calls > 0 {
        tracing::info!(
            "  API spend: ${:.4} across {} calls",
            costs.total_cost,
            costs.total_calls
        );
        for (model, usage) in &costs.by_model {
            tracing::info!(
                "    {model}: {} in / {} out tokens, ${:.4} ({} calls)",
                usage.input_tokens,
                usage.output_tokens,
                usage.cost,
                usage.calls
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_accounting() {
        let mut stats = RunStats::default();
        stats.note_skip(Some(ErrorCategory::NoForm));
        stats.note_skip(Some(ErrorCategory::NoForm));
        stats.note_skip(Some(ErrorCategory::AppStore));
        stats.note_skip(None);

        assert_eq!(stats.total_skipped(), 4);
        assert_eq!(stats.skips_by_category.get("no_form"), Some(&2));
        assert_eq!(stats.skips_by_category.get("app_store"), Some(&1));
        assert_eq!(stats.skips_by_category.get("other"), Some(&1));
    }
}
