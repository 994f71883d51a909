//! # Prometheus Metrics
//!
//! Operational metrics of the ledger node, scraped by Prometheus at the
//! `/metrics` endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `ce` namespace so they do not collide with the default global
//! registry.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metric handles of the node. Cheap to clone; the handles are shared.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Ledger operations, labelled by `op` (RPC method) and `outcome`
    /// (`ok`, `rejected`, `error`).
    pub operations_total: IntCounterVec,
    /// Event records journaled and broadcast.
    pub events_emitted_total: IntCounter,
    /// Ledgers currently hosted.
    pub ledgers_hosted: IntGauge,
    /// Time spent applying and persisting one mutating operation.
    pub operation_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("ce".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Ledger operations by method and outcome"),
            &["op", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let events_emitted_total = IntCounter::new(
            "events_emitted_total",
            "Total number of ledger events journaled",
        )?;
        registry.register(Box::new(events_emitted_total.clone()))?;

        let ledgers_hosted = IntGauge::new("ledgers_hosted", "Number of ledgers served by this node")?;
        registry.register(Box::new(ledgers_hosted.clone()))?;

        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Latency of mutating ledger operations, including persistence",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            events_emitted_total,
            ledgers_hosted,
            operation_latency_seconds,
        })
    }

    /// Counts one operation.
    pub fn record(&self, op: &str, outcome: &str) {
        self.operations_total.with_label_values(&[op, outcome]).inc();
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_recorded_operations() {
        let m = NodeMetrics::new().unwrap();
        m.record("ledger_transfer", "ok");
        m.record("ledger_transfer", "rejected");
        m.ledgers_hosted.set(2);
        let text = m.encode().unwrap();
        assert!(text.contains("ce_operations_total{op=\"ledger_transfer\",outcome=\"ok\"} 1"));
        assert!(text.contains("ce_ledgers_hosted 2"));
    }
}
