use gradewise_domain::ports::MetricsSink;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whitespace token estimate used for cost accounting.
pub fn token_count(s: &str) -> usize { s.split_whitespace().count() }

/// Process-lifetime counters for the rewrite engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub request_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub rate_limit_hits: u64,
    pub average_response_time_ms: f64,
    pub total_tokens_consumed: u64,
    pub rewrite_failures: u64,
    pub retries_succeeded: u64,
    pub retries_exhausted: u64,
    #[serde(skip)]
    timed_responses: u64,
}

impl PerformanceMetrics {
    /// Folds one response time into the running average.
    pub fn record_response_time(&mut self, elapsed_ms: f64) {
        self.timed_responses += 1;
        let n = self.timed_responses as f64;
        self.average_response_time_ms += (elapsed_ms - self.average_response_time_ms) / n;
    }

    pub fn record_tokens(&mut self, tokens: u64) {
        self.total_tokens_consumed = self.total_tokens_consumed.saturating_add(tokens);
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 { 0.0 } else { self.cache_hits as f64 / lookups as f64 }
    }
}

#[derive(Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<String, f64>>,
    histograms: Mutex<HashMap<String, Vec<f64>>>,
}

impl MetricsSink for InMemoryMetrics {
    fn inc_counter(&self, name: &str, value: f64) {
        *self.counters.lock().entry(name.to_string()).or_insert(0.0) += value;
    }
    fn observe_histogram(&self, name: &str, value: f64) {
        self.histograms.lock().entry(name.to_string()).or_default().push(value);
    }
}

impl InMemoryMetrics {
    pub fn counter_value(&self, name: &str) -> f64 {
        self.counters.lock().get(name).copied().unwrap_or(0.0)
    }
    pub fn histogram_values(&self, name: &str) -> Vec<f64> {
        self.histograms.lock().get(name).cloned().unwrap_or_default()
    }
}
