//! Prometheus metrics sink. Names and labels are carried over verbatim
//! from the system this platform's dashboards and alerts target.

use once_cell::sync::Lazy;
use prometheus::{CounterVec, Encoder, GaugeVec, HistogramVec, Registry, TextEncoder, histogram_opts, opts};

pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

pub struct Metrics {
    pub registry: Registry,
    pub requests_total: CounterVec,
    pub errors_total: CounterVec,
    pub latency_seconds: HistogramVec,
    pub retries_total: CounterVec,
    pub retry_exhausted_total: CounterVec,
    pub executor_inflight: GaugeVec,
    pub executor_timeouts_total: CounterVec,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            opts!("inference_requests_total", "Total inference requests accepted"),
            &["model", "version"],
        )
        .unwrap();

        let errors_total = CounterVec::new(
            opts!("inference_errors_total", "Total inference errors by type"),
            &["model", "version", "error_type"],
        )
        .unwrap();

        let latency_seconds = HistogramVec::new(
            histogram_opts!(
                "inference_latency_seconds",
                "Inference latency in seconds",
                vec![0.005, 0.01, 0.02, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]
            ),
            &["model", "version"],
        )
        .unwrap();

        let retries_total = CounterVec::new(
            opts!("inference_retries_total", "Total retried attempts by reason"),
            &["model", "version", "reason"],
        )
        .unwrap();

        let retry_exhausted_total = CounterVec::new(
            opts!(
                "inference_retry_exhausted_total",
                "Total requests that exhausted their retry budget"
            ),
            &["model", "version"],
        )
        .unwrap();

        let executor_inflight = GaugeVec::new(
            opts!("executor_inflight", "Current in-flight executions per device"),
            &["device"],
        )
        .unwrap();

        let executor_timeouts_total = CounterVec::new(
            opts!("executor_timeouts_total", "Total per-attempt timeouts by device"),
            &["device"],
        )
        .unwrap();

        registry.register(Box::new(requests_total.clone())).unwrap();
        registry.register(Box::new(errors_total.clone())).unwrap();
        registry.register(Box::new(latency_seconds.clone())).unwrap();
        registry.register(Box::new(retries_total.clone())).unwrap();
        registry.register(Box::new(retry_exhausted_total.clone())).unwrap();
        registry.register(Box::new(executor_inflight.clone())).unwrap();
        registry.register(Box::new(executor_timeouts_total.clone())).unwrap();

        Self {
            registry,
            requests_total,
            errors_total,
            latency_seconds,
            retries_total,
            retry_exhausted_total,
            executor_inflight,
            executor_timeouts_total,
        }
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).unwrap_or_default();
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_families() {
        METRICS.requests_total.with_label_values(&["echo", "v1"]).inc();
        let text = METRICS.render();
        assert!(text.contains("inference_requests_total"));
    }

    #[test]
    fn inflight_gauge_round_trips_to_zero() {
        let gauge = METRICS.executor_inflight.with_label_values(&["cpu"]);
        let before = gauge.get();
        gauge.inc();
        gauge.dec();
        assert_eq!(gauge.get(), before);
    }
}
