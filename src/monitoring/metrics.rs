use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const HISTOGRAM_CAPACITY: usize = 1000;

/// Metric value types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
}

/// A single exported metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
    pub timestamp: u64,
}

/// Metrics collector for counters, gauges and latency histograms
pub struct MetricsCollector {
    counters: Arc<RwLock<HashMap<String, u64>>>,
    gauges: Arc<RwLock<HashMap<String, f64>>>,
    histograms: Arc<RwLock<HashMap<String, Vec<f64>>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            gauges: Arc::new(RwLock::new(HashMap::new())),
            histograms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Increment a counter
    pub async fn increment_counter(&self, name: &str, value: u64) {
        let mut counters = self.counters.write().await;
        *counters.entry(name.to_string()).or_insert(0) += value;
    }

    /// Read a counter (zero when never written)
    pub async fn counter(&self, name: &str) -> u64 {
        self.counters.read().await.get(name).copied().unwrap_or(0)
    }

    /// Set a gauge value
    pub async fn set_gauge(&self, name: &str, value: f64) {
        let mut gauges = self.gauges.write().await;
        gauges.insert(name.to_string(), value);
    }

    /// Record a histogram observation, keeping the most recent values only
    pub async fn record_histogram(&self, name: &str, value: f64) {
        let mut histograms = self.histograms.write().await;
        let values = histograms.entry(name.to_string()).or_default();
        values.push(value);
        if values.len() > HISTOGRAM_CAPACITY {
            values.remove(0);
        }
    }

    /// Percentile over recorded observations, nearest-rank.
    /// Returns None when nothing has been recorded.
    pub async fn histogram_percentile(&self, name: &str, percentile: f64) -> Option<f64> {
        let histograms = self.histograms.read().await;
        let values = histograms.get(name)?;
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = rank.saturating_sub(1).min(sorted.len() - 1);
        Some(sorted[index])
    }

    /// Snapshot all counters and gauges, plus avg/min/max per histogram
    pub async fn snapshot(&self) -> Vec<Metric> {
        let timestamp = chrono::Utc::now().timestamp_millis() as u64;
        let mut metrics = Vec::new();

        let counters = self.counters.read().await;
        for (name, value) in counters.iter() {
            metrics.push(Metric {
                name: format!("counter.{}", name),
                value: MetricValue::Counter(*value),
                timestamp,
            });
        }

        let gauges = self.gauges.read().await;
        for (name, value) in gauges.iter() {
            metrics.push(Metric {
                name: format!("gauge.{}", name),
                value: MetricValue::Gauge(*value),
                timestamp,
            });
        }

        let histograms = self.histograms.read().await;
        for (name, values) in histograms.iter() {
            if values.is_empty() {
                continue;
            }
            let sum: f64 = values.iter().sum();
            let avg = sum / values.len() as f64;
            let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
            let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

            for (suffix, value) in [("avg", avg), ("min", min), ("max", max)] {
                metrics.push(Metric {
                    name: format!("histogram.{}.{}", name, suffix),
                    value: MetricValue::Gauge(value),
                    timestamp,
                });
            }
        }

        metrics
    }

    /// Reset all metrics
    pub async fn reset(&self) {
        self.counters.write().await.clear();
        self.gauges.write().await.clear();
        self.histograms.write().await.clear();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
