//! Injected counters for scrape attempts and outcomes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Receives counter increments. Implementations must be cheap and never fail.
pub trait MetricsSink: Send + Sync {
    fn incr(&self, name: &str, amount: u64);
}

/// Logs every increment at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn incr(&self, name: &str, amount: u64) {
        tracing::debug!(target: "oafinder::metrics", counter = name, amount, "metric");
    }
}

/// Keeps counters in memory so tests and the CLI can read them back.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetricsSink {
    counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .map(|c| c.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn incr(&self, name: &str, amount: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name.to_string()).or_insert(0) += amount;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_counts() {
        let sink = MemoryMetricsSink::new();
        sink.incr("scrape.attempted", 1);
        sink.incr("scrape.attempted", 2);
        assert_eq!(sink.get("scrape.attempted"), 3);
        assert_eq!(sink.get("scrape.succeeded"), 0);
        assert_eq!(sink.snapshot().len(), 1);
    }
}
