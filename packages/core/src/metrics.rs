//! Prometheus metrics registry for the defect alert monitor.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it
//! to the listener and the HTTP middleware.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry,
};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Inbound messages seen by the listener, valid or not.
    pub messages_received_total: Counter,
    /// Messages dropped because they failed to decode.
    pub decode_errors_total: Counter,
    /// Alerts successfully written to the store.
    pub alerts_stored_total: Counter,
    /// Store writes that failed.
    pub persist_errors_total: Counter,
    /// Current number of alerts held by the recent-alerts cache.
    pub cache_size: Gauge,
    /// 1 while the listener holds an active subscription, 0 otherwise.
    pub listener_subscribed: Gauge,
    /// HTTP request count, labelled by method, path, and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let messages_received_total = Counter::with_opts(Opts::new(
            "defect_monitor_messages_received_total",
            "Inbound broker messages received",
        ))?;

        let decode_errors_total = Counter::with_opts(Opts::new(
            "defect_monitor_decode_errors_total",
            "Inbound messages dropped as undecodable",
        ))?;

        let alerts_stored_total = Counter::with_opts(Opts::new(
            "defect_monitor_alerts_stored_total",
            "Alerts persisted to the store",
        ))?;

        let persist_errors_total = Counter::with_opts(Opts::new(
            "defect_monitor_persist_errors_total",
            "Failed alert store writes",
        ))?;

        let cache_size = Gauge::with_opts(Opts::new(
            "defect_monitor_cache_size",
            "Current size of the recent-alerts cache",
        ))?;

        let listener_subscribed = Gauge::with_opts(Opts::new(
            "defect_monitor_listener_subscribed",
            "Whether the listener holds an active topic subscription",
        ))?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "defect_monitor_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "defect_monitor_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        registry.register(Box::new(messages_received_total.clone()))?;
        registry.register(Box::new(decode_errors_total.clone()))?;
        registry.register(Box::new(alerts_stored_total.clone()))?;
        registry.register(Box::new(persist_errors_total.clone()))?;
        registry.register(Box::new(cache_size.clone()))?;
        registry.register(Box::new(listener_subscribed.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            messages_received_total,
            decode_errors_total,
            alerts_stored_total,
            persist_errors_total,
            cache_size,
            listener_subscribed,
            http_requests_total,
            http_request_duration,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
