//! Metrics recording implementation using Prometheus.

use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_int_counter_with_registry, CounterVec, Encoder, HistogramVec, IntCounter, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

/// Trait for recording gateway metrics.
pub trait MetricsRecorder: Clone + Send + Sync + 'static {
    /// Records the final outcome of a request sent through the gateway.
    fn record_request(&self, outcome: &str);

    /// Records a refresh call and how long it took.
    fn record_refresh(&self, result: &str, duration_secs: f64);

    /// Records a request parked behind an in-flight refresh.
    fn record_queued(&self);

    /// Records a replay of a request after a refresh.
    fn record_replay(&self, result: &str);

    /// Records a forced logout.
    fn record_logout(&self, reason: &str);
}

/// Prometheus metrics collector.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    requests_total: CounterVec,

    // Refresh metrics
    refresh_total: CounterVec,
    refresh_duration_seconds: HistogramVec,
    queued_total: IntCounter,
    replays_total: CounterVec,

    logouts_total: CounterVec,
}

impl Metrics {
    /// Creates a new metrics instance with its own Prometheus registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let requests_total = register_counter_vec_with_registry!(
            Opts::new(
                "gateway_requests_total",
                "Requests sent through the gateway by final outcome"
            ),
            &["outcome"],
            registry.clone()
        )?;

        let refresh_total = register_counter_vec_with_registry!(
            Opts::new("gateway_refresh_total", "Access token refresh calls"),
            &["result"],
            registry.clone()
        )?;

        let refresh_duration_seconds = register_histogram_vec_with_registry!(
            "gateway_refresh_duration_seconds",
            "Access token refresh duration in seconds",
            &["result"],
            vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            registry.clone()
        )?;

        let queued_total = register_int_counter_with_registry!(
            "gateway_queued_requests_total",
            "Requests queued behind an in-flight refresh",
            registry.clone()
        )?;

        let replays_total = register_counter_vec_with_registry!(
            Opts::new(
                "gateway_replays_total",
                "Requests replayed with a refreshed access token"
            ),
            &["result"],
            registry.clone()
        )?;

        let logouts_total = register_counter_vec_with_registry!(
            Opts::new("gateway_logouts_total", "Sessions ended by the gateway"),
            &["reason"],
            registry.clone()
        )?;

        Ok(Metrics {
            registry,
            requests_total,
            refresh_total,
            refresh_duration_seconds,
            queued_total,
            replays_total,
            logouts_total,
        })
    }

    /// Renders all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# failed to encode metrics: {}\n", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl MetricsRecorder for Metrics {
    fn record_request(&self, outcome: &str) {
        self.requests_total.with_label_values(&[outcome]).inc();
    }

    fn record_refresh(&self, result: &str, duration_secs: f64) {
        self.refresh_total.with_label_values(&[result]).inc();
        self.refresh_duration_seconds
            .with_label_values(&[result])
            .observe(duration_secs);
    }

    fn record_queued(&self) {
        self.queued_total.inc();
    }

    fn record_replay(&self, result: &str) {
        self.replays_total.with_label_values(&[result]).inc();
    }

    fn record_logout(&self, reason: &str) {
        self.logouts_total.with_label_values(&[reason]).inc();
    }
}
