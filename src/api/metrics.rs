//! Provider Metrics
//!
//! Prometheus counters and histograms for lifecycle operations served by
//! the host surface. Each server owns its own registry.

use crate::error::{Error, Result};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Outcome label for a successful operation
pub const OUTCOME_OK: &str = "ok";

pub struct ProviderMetrics {
    registry: Registry,
    operations: IntCounterVec,
    duration: HistogramVec,
}

impl ProviderMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new(
                "powerstore_provider_operations_total",
                "Lifecycle operations by type, operation and outcome",
            ),
            &["kind", "operation", "outcome"],
        )
        .map_err(metrics_error)?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "powerstore_provider_operation_duration_seconds",
                "Duration of lifecycle operations",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
            &["kind", "operation"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(operations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(duration.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            operations,
            duration,
        })
    }

    /// Record one finished operation
    pub fn observe(&self, kind: &str, operation: &str, outcome: &str, elapsed: Duration) {
        self.operations
            .with_label_values(&[kind, operation, outcome])
            .inc();
        self.duration
            .with_label_values(&[kind, operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Number of operations recorded for a label set
    pub fn count(&self, kind: &str, operation: &str, outcome: &str) -> u64 {
        self.operations
            .with_label_values(&[kind, operation, outcome])
            .get()
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<(String, String)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        let body = String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("metrics are not valid UTF-8: {}", e)))?;
        Ok((encoder.format_type().to_string(), body))
    }
}

fn metrics_error(err: prometheus::Error) -> Error {
    Error::Internal(format!("metrics error: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_and_render() {
        let metrics = ProviderMetrics::new().unwrap();
        metrics.observe("powerstore_host", "create", OUTCOME_OK, Duration::from_millis(20));
        metrics.observe("powerstore_host", "create", "remote", Duration::from_millis(5));
        metrics.observe("powerstore_host", "create", OUTCOME_OK, Duration::from_millis(7));

        assert_eq!(metrics.count("powerstore_host", "create", OUTCOME_OK), 2);
        assert_eq!(metrics.count("powerstore_host", "create", "remote"), 1);

        let (content_type, body) = metrics.render().unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("powerstore_provider_operations_total"));
        assert!(body.contains("powerstore_provider_operation_duration_seconds_bucket"));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = ProviderMetrics::new().unwrap();
        let second = ProviderMetrics::new().unwrap();
        first.observe("powerstore_volume", "read", OUTCOME_OK, Duration::ZERO);
        assert_eq!(second.count("powerstore_volume", "read", OUTCOME_OK), 0);
    }
}
