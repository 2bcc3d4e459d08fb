//! Prometheus-compatible metrics for the inference server.
//!
//! Tracks request counts, classifications and their latency, and failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Total HTTP requests served.
    http_requests_total: AtomicU64,
    /// Total HTTP errors (4xx + 5xx).
    http_errors_total: AtomicU64,
    /// Total successful classifications.
    classifications_total: AtomicU64,
    /// Cumulative classification time in microseconds.
    classification_micros_total: AtomicU64,
    /// Reports that could not be published to the broker.
    report_failures_total: AtomicU64,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                http_requests_total: AtomicU64::new(0),
                http_errors_total: AtomicU64::new(0),
                classifications_total: AtomicU64::new(0),
                classification_micros_total: AtomicU64::new(0),
                report_failures_total: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn inc_http_requests(&self) {
        self.inner
            .http_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_http_errors(&self) {
        self.inner.http_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classification(&self, elapsed: Duration) {
        self.inner
            .classifications_total
            .fetch_add(1, Ordering::Relaxed);
        self.inner
            .classification_micros_total
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn inc_report_failures(&self) {
        self.inner
            .report_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let m = &self.inner;
        let seconds = m.classification_micros_total.load(Ordering::Relaxed) as f64 / 1_000_000.0;

        format!(
            r#"# HELP hias_uptime_seconds Time since the server started.
# TYPE hias_uptime_seconds gauge
hias_uptime_seconds {}

# HELP hias_http_requests_total Total HTTP requests served.
# TYPE hias_http_requests_total counter
hias_http_requests_total {}

# HELP hias_http_errors_total Total HTTP errors (4xx/5xx).
# TYPE hias_http_errors_total counter
hias_http_errors_total {}

# HELP hias_classifications_total Total successful classifications.
# TYPE hias_classifications_total counter
hias_classifications_total {}

# HELP hias_classification_seconds_total Total time spent classifying.
# TYPE hias_classification_seconds_total counter
hias_classification_seconds_total {:.6}

# HELP hias_report_failures_total Classification reports not delivered to the broker.
# TYPE hias_report_failures_total counter
hias_report_failures_total {}
"#,
            self.uptime_secs(),
            m.http_requests_total.load(Ordering::Relaxed),
            m.http_errors_total.load(Ordering::Relaxed),
            m.classifications_total.load(Ordering::Relaxed),
            seconds,
            m.report_failures_total.load(Ordering::Relaxed),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
