//! API cost accounting.
//!
//! One tracker per run, owned by the pipeline orchestrator and shared with
//! the planner. A snapshot is persisted in the api_sessions table at run end.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Price per 1M tokens for a model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    /// USD per 1M input tokens
    pub input_per_m: f64,
    /// USD per 1M output tokens
    pub output_per_m: f64,
}

/// Known model prices. Unknown models are priced as gpt-4o-mini.
pub const MODEL_PRICING: &[(&str, ModelPricing)] = &[
    (
        "gpt-4o",
        ModelPricing {
            input_per_m: 2.50,
            output_per_m: 10.00,
        },
    ),
    (
        "gpt-4o-mini",
        ModelPricing {
            input_per_m: 0.15,
            output_per_m: 0.60,
        },
    ),
    (
        "gpt-4-turbo",
        ModelPricing {
            input_per_m: 10.00,
            output_per_m: 30.00,
        },
    ),
];

fn pricing_for(model: &str) -> ModelPricing {
    MODEL_PRICING
        .iter()
        .find(|(name, _)| *name == model)
        .or_else(|| MODEL_PRICING.iter().find(|(name, _)| *name == "gpt-4o-mini"))
        .map(|(_, p)| *p)
        .expect("gpt-4o-mini pricing is always present")
}

/// Accumulated usage for one model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Input tokens consumed
    pub input_tokens: u64,
    /// Output tokens generated
    pub output_tokens: u64,
    /// Accumulated cost in USD
    pub cost: f64,
    /// API calls made
    pub calls: u64,
}

/// Snapshot of a run's API spend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostSummary {
    /// Per-model usage
    pub by_model: BTreeMap<String, ModelUsage>,
    /// Total cost in USD
    pub total_cost: f64,
    /// Total API calls
    pub total_calls: u64,
}

/// Per-run cost accumulator.
#[derive(Debug, Default)]
pub struct CostTracker {
    by_model: BTreeMap<String, ModelUsage>,
    total_calls: u64,
}

impl CostTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one API call's token usage.
    pub fn record(&mut self, model: &str, prompt_tokens: u64, completion_tokens: u64) {
        let pricing = pricing_for(model);
        #[allow(clippy::cast_precision_loss)]
        let call_cost = (prompt_tokens as f64 / 1_000_000.0) * pricing.input_per_m
            + (completion_tokens as f64 / 1_000_000.0) * pricing.output_per_m;

        let usage = self.by_model.entry(model.to_string()).or_default();
        usage.input_tokens += prompt_tokens;
        usage.output_tokens += completion_tokens;
        usage.cost += call_cost;
        usage.calls += 1;
        self.total_calls += 1;

        let total: f64 = self.by_model.values().map(|u| u.cost).sum();
        tracing::info!(
            "API cost ${call_cost:.4} ({prompt_tokens}+{completion_tokens} tok) | total ${total:.4}"
        );
    }

    /// Clear all accumulated usage (start of a new run).
    pub fn reset(&mut self) {
        self.by_model.clear();
        self.total_calls = 0;
    }

    /// Immutable snapshot for persistence and the run summary.
    #[must_use]
    pub fn snapshot(&self) -> CostSummary {
        CostSummary {
            by_model: self.by_model.clone(),
            total_cost: self.by_model.values().map(|u| u.cost).sum(),
            total_calls: self.total_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_arithmetic_at_million_scale() {
        let mut tracker = CostTracker::new();
        tracker.record("gpt-4o", 1_000_000, 1_000_000);
        let summary = tracker.snapshot();
        let usage = summary.by_model.get("gpt-4o").expect("model tracked");
        assert!((usage.cost - 12.50).abs() < 1e-9);
        assert_eq!(usage.calls, 1);
        assert_eq!(summary.total_calls, 1);
    }

    #[test]
    fn test_unknown_model_priced_as_mini() {
        let mut tracker = CostTracker::new();
        tracker.record("some-future-model", 1_000_000, 0);
        let summary = tracker.snapshot();
        let usage = summary.by_model.get("some-future-model").expect("tracked");
        assert!((usage.cost - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_accumulation_and_reset() {
        let mut tracker = CostTracker::new();
        tracker.record("gpt-4o-mini", 1000, 500);
        tracker.record("gpt-4o-mini", 2000, 100);
        let summary = tracker.snapshot();
        let usage = summary.by_model.get("gpt-4o-mini").expect("tracked");
        assert_eq!(usage.input_tokens, 3000);
        assert_eq!(usage.output_tokens, 600);
        assert_eq!(usage.calls, 2);

        tracker.reset();
        let summary = tracker.snapshot();
        assert!(summary.by_model.is_empty());
        assert_eq!(summary.total_calls, 0);
        assert!(summary.total_cost.abs() < f64::EPSILON);
    }
}
