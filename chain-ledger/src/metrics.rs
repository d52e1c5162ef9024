//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_appends_total` - Blocks appended (genesis included)
//! - `ledger_append_failures_total` - Appends that returned an error
//! - `ledger_append_duration_seconds` - Histogram of append latencies
//! - `ledger_chain_height` - Height of the last appended block
//! - `ledger_verifications_total` - Chain verifications run
//! - `ledger_verification_failures_total` - Verifications that found a fault

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Blocks appended
    pub appends_total: IntCounter,

    /// Failed appends
    pub append_failures: IntCounter,

    /// Append duration histogram
    pub append_duration: Histogram,

    /// Height of the last appended block
    pub chain_height: IntGauge,

    /// Verifications run
    pub verifications_total: IntCounter,

    /// Verifications that returned `Invalid`
    pub verification_failures: IntCounter,

    /// Prometheus registry
    registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let appends_total = IntCounter::new("ledger_appends_total", "Total number of blocks appended")?;
        registry.register(Box::new(appends_total.clone()))?;

        let append_failures = IntCounter::new(
            "ledger_append_failures_total",
            "Total number of failed appends",
        )?;
        registry.register(Box::new(append_failures.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_append_duration_seconds",
                "Histogram of append latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        let chain_height = IntGauge::new("ledger_chain_height", "Height of the chain tip")?;
        registry.register(Box::new(chain_height.clone()))?;

        let verifications_total = IntCounter::new(
            "ledger_verifications_total",
            "Total number of chain verifications",
        )?;
        registry.register(Box::new(verifications_total.clone()))?;

        let verification_failures = IntCounter::new(
            "ledger_verification_failures_total",
            "Total number of verifications that found a fault",
        )?;
        registry.register(Box::new(verification_failures.clone()))?;

        Ok(Self {
            appends_total,
            append_failures,
            append_duration,
            chain_height,
            verifications_total,
            verification_failures,
            registry,
        })
    }

    /// Record a committed block
    pub fn record_append(&self, height: u64, duration_seconds: f64) {
        self.appends_total.inc();
        self.append_duration.observe(duration_seconds);
        self.chain_height.set(i64::try_from(height).unwrap_or(i64::MAX));
    }

    /// Record a failed append
    pub fn record_append_failure(&self) {
        self.append_failures.inc();
    }

    /// Record a verification outcome
    pub fn record_verification(&self, valid: bool) {
        self.verifications_total.inc();
        if !valid {
            self.verification_failures.inc();
        }
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("appends_total", &self.appends_total.get())
            .field("chain_height", &self.chain_height.get())
            .field("verifications_total", &self.verifications_total.get())
            .finish()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("metric names are static and unique")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.appends_total.get(), 0);
        assert_eq!(metrics.verifications_total.get(), 0);
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_append(1, 0.002);
        assert_eq!(a.appends_total.get(), 1);
        assert_eq!(b.appends_total.get(), 0);
    }

    #[test]
    fn test_record_append() {
        let metrics = Metrics::new().unwrap();
        metrics.record_append(1, 0.003);
        metrics.record_append(2, 0.004);
        assert_eq!(metrics.appends_total.get(), 2);
        assert_eq!(metrics.chain_height.get(), 2);
        assert_eq!(metrics.append_duration.get_sample_count(), 2);
    }

    #[test]
    fn test_record_verification() {
        let metrics = Metrics::new().unwrap();
        metrics.record_verification(true);
        metrics.record_verification(false);
        assert_eq!(metrics.verifications_total.get(), 2);
        assert_eq!(metrics.verification_failures.get(), 1);
    }

    #[test]
    fn test_render() {
        let metrics = Metrics::new().unwrap();
        metrics.record_append_failure();
        let text = metrics.render();
        assert!(text.contains("ledger_append_failures_total 1"));
    }
}
