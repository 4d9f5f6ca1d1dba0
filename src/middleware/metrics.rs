//! Prometheus metrics for the gate.
//!
//! Exposes a standard `/metrics` endpoint that Prometheus can scrape.
//! Counters live in the global default registry and are registered once
//! per process on first use.

use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    opts, register_counter_vec, register_histogram, CounterVec, Encoder, Histogram, TextEncoder,
};

use crate::middleware::gate::GateState;

struct GateMetrics {
    decisions_total: CounterVec,
    verify_duration_seconds: Histogram,
}

static METRICS: Lazy<GateMetrics> = Lazy::new(|| {
    let decisions_total = register_counter_vec!(
        opts!("gate_decisions_total", "Gate decisions by resulting state"),
        &["state"]
    )
    .expect("failed to register gate_decisions_total");

    let verify_duration_seconds = register_histogram!(prometheus::histogram_opts!(
        "gate_verify_duration_seconds",
        "Time spent verifying a single session cookie candidate",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]
    ))
    .expect("failed to register gate_verify_duration_seconds");

    GateMetrics {
        decisions_total,
        verify_duration_seconds,
    }
});

pub fn record_decision(state: GateState) {
    METRICS
        .decisions_total
        .with_label_values(&[state.as_str()])
        .inc();
}

pub fn observe_verify(elapsed: Duration) {
    METRICS.verify_duration_seconds.observe(elapsed.as_secs_f64());
}

/// Encode all registered metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_decision_shows_up_in_output() {
        record_decision(GateState::AuthExpired);
        let output = encode_metrics();
        assert!(output.contains("gate_decisions_total"));
        assert!(output.contains("state=\"auth_expired\""));
    }

    #[test]
    fn test_verify_histogram_is_exported() {
        observe_verify(Duration::from_micros(250));
        assert!(encode_metrics().contains("gate_verify_duration_seconds"));
    }
}
