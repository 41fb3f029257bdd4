//! # Prometheus Metrics
//!
//! HTTP-level metrics (request counts, latency, errors) are recorded in
//! middleware. Verification outcomes are counted by the verify handler.
//! Domain gauges (beneficiaries, transactions, pending alerts) are refreshed
//! from the dashboard aggregate on each `/metrics` scrape; see the metrics
//! handler in `lib.rs`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use prometheus::{
    core::Collector, Encoder, GaugeVec, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use ration_core::TransactionStatus;
use ration_engine::DashboardCounts;

/// Shared metrics state backed by a Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    // -- HTTP middleware metrics (push model) --
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_errors_total: IntCounterVec,

    // -- Verification outcomes (push model) --
    verifications_total: IntCounterVec,

    // -- Domain gauges (pull model, updated on /metrics scrape) --
    beneficiaries: GaugeVec,
    transactions: GaugeVec,
    pending_alerts: GaugeVec,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("errors", &self.errors())
            .finish()
    }
}

impl ApiMetrics {
    /// Create a new metrics instance with a fresh Prometheus registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("ration_http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )
        .expect("metric can be created");

        let http_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "ration_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "path"],
        )
        .expect("metric can be created");

        let http_errors_total = IntCounterVec::new(
            Opts::new("ration_http_errors_total", "Total HTTP errors (4xx and 5xx)"),
            &["method", "path", "status"],
        )
        .expect("metric can be created");

        let verifications_total = IntCounterVec::new(
            Opts::new(
                "ration_verifications_total",
                "Completed verifications by transaction status",
            ),
            &["status"],
        )
        .expect("metric can be created");

        let beneficiaries = GaugeVec::new(
            Opts::new("ration_beneficiaries", "Registered beneficiaries by status"),
            &["status"],
        )
        .expect("metric can be created");

        let transactions = GaugeVec::new(
            Opts::new("ration_transactions", "Ledger transactions by status"),
            &["status"],
        )
        .expect("metric can be created");

        let pending_alerts = GaugeVec::new(
            Opts::new("ration_pending_alerts", "Alerts awaiting review by severity"),
            &["severity"],
        )
        .expect("metric can be created");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(http_errors_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(verifications_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(beneficiaries.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(transactions.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(pending_alerts.clone()))
            .expect("metric can be registered");

        Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                http_errors_total,
                verifications_total,
                beneficiaries,
                transactions,
                pending_alerts,
            }),
        }
    }

    /// Return current total request count (sum across all labels).
    pub fn requests(&self) -> u64 {
        sum_counter(&self.inner.http_requests_total)
    }

    /// Return current total error count (sum across all labels).
    pub fn errors(&self) -> u64 {
        sum_counter(&self.inner.http_errors_total)
    }

    /// Return the number of verifications recorded with `status`.
    pub fn verifications(&self, status: TransactionStatus) -> u64 {
        self.inner
            .verifications_total
            .with_label_values(&[status.as_str()])
            .get()
    }

    /// Record an HTTP request (called by the middleware).
    fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
        if status >= 400 {
            self.inner
                .http_errors_total
                .with_label_values(&[method, path, &status_str])
                .inc();
        }
    }

    /// Count one completed verification.
    pub fn record_verification(&self, status: TransactionStatus) {
        self.inner
            .verifications_total
            .with_label_values(&[status.as_str()])
            .inc();
    }

    /// Replace the domain gauges with a fresh dashboard aggregate.
    pub fn set_dashboard(&self, counts: &DashboardCounts) {
        let inner = &self.inner;

        inner.beneficiaries.reset();
        for (status, n) in [
            ("active", counts.active_beneficiaries),
            ("suspended", counts.suspended_beneficiaries),
            ("blocked", counts.blocked_beneficiaries),
        ] {
            inner.beneficiaries.with_label_values(&[status]).set(n as f64);
        }

        inner.transactions.reset();
        for (status, n) in [
            ("success", counts.successful_transactions),
            ("flagged", counts.flagged_transactions),
            ("failed", counts.failed_transactions),
        ] {
            inner.transactions.with_label_values(&[status]).set(n as f64);
        }

        inner.pending_alerts.reset();
        for (severity, n) in [
            ("critical", counts.critical_alerts),
            ("high", counts.high_alerts),
            ("medium", counts.medium_alerts),
        ] {
            inner.pending_alerts.with_label_values(&[severity]).set(n as f64);
        }
    }

    /// Gather all metrics and encode to Prometheus text format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer)
            .map_err(|e| format!("metrics encoding produced invalid UTF-8: {e}"))
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn sum_counter(counter: &IntCounterVec) -> u64 {
    let mut total = 0u64;
    for mf in &counter.collect() {
        for m in mf.get_metric() {
            total += m.get_counter().get_value() as u64;
        }
    }
    total
}

fn is_uuid(segment: &str) -> bool {
    (segment.len() == 36
        && segment.chars().enumerate().all(|(i, c)| {
            if i == 8 || i == 13 || i == 18 || i == 23 {
                c == '-'
            } else {
                c.is_ascii_hexdigit()
            }
        }))
        || (segment.len() == 32 && segment.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Normalize a request path for use as a metric label.
///
/// UUID segments become `{id}` and the card number after
/// `/beneficiaries/` becomes `{card_number}`.
fn normalize_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut previous = "";
    for segment in path.split('/') {
        let label = if is_uuid(segment) {
            "{id}"
        } else if previous == "beneficiaries" && !segment.is_empty() {
            "{card_number}"
        } else {
            segment
        };
        out.push(label);
        previous = segment;
    }
    out.join("/")
}

/// Middleware that records HTTP request metrics via Prometheus.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        let duration = start.elapsed().as_secs_f64();
        let status = response.status().as_u16();
        m.record_request(&method, &path, status, duration);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_metrics_new_starts_at_zero() {
        let m = ApiMetrics::new();
        assert_eq!(m.requests(), 0);
        assert_eq!(m.errors(), 0);
        assert_eq!(m.verifications(TransactionStatus::Success), 0);
    }

    #[test]
    fn record_request_counts_errors_from_400() {
        let m = ApiMetrics::new();
        m.record_request("GET", "/v1/alerts", 200, 0.01);
        m.record_request("GET", "/v1/alerts/{id}", 404, 0.01);
        m.record_request("POST", "/v1/verify", 503, 0.2);
        assert_eq!(m.requests(), 3);
        assert_eq!(m.errors(), 2);
    }

    #[test]
    fn clones_share_the_registry() {
        let m = ApiMetrics::new();
        let c = m.clone();
        c.record_request("GET", "/health/liveness", 200, 0.001);
        assert_eq!(m.requests(), 1);
    }

    #[test]
    fn concurrent_recording() {
        let m = ApiMetrics::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = m.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_request("POST", "/v1/verify", 200, 0.01);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.requests(), 400);
    }

    #[test]
    fn verification_outcomes_by_status() {
        let m = ApiMetrics::new();
        m.record_verification(TransactionStatus::Success);
        m.record_verification(TransactionStatus::Flagged);
        m.record_verification(TransactionStatus::Flagged);
        assert_eq!(m.verifications(TransactionStatus::Flagged), 2);
        assert_eq!(m.verifications(TransactionStatus::Failed), 0);
    }

    #[test]
    fn dashboard_gauges_in_text_output() {
        let m = ApiMetrics::new();
        m.set_dashboard(&DashboardCounts {
            total_beneficiaries: 3,
            active_beneficiaries: 2,
            blocked_beneficiaries: 1,
            pending_alerts: 1,
            critical_alerts: 1,
            ..DashboardCounts::default()
        });
        let text = m.gather_and_encode().unwrap();
        assert!(text.contains("ration_beneficiaries{status=\"active\"} 2"));
        assert!(text.contains("ration_pending_alerts{severity=\"critical\"} 1"));
    }

    #[test]
    fn normalize_path_replaces_ids_and_card_numbers() {
        assert_eq!(
            normalize_path("/v1/alerts/550e8400-e29b-41d4-a716-446655440000/review"),
            "/v1/alerts/{id}/review"
        );
        assert_eq!(
            normalize_path("/v1/transactions/550e8400e29b41d4a716446655440000"),
            "/v1/transactions/{id}"
        );
        assert_eq!(
            normalize_path("/v1/beneficiaries/RC-1001/status"),
            "/v1/beneficiaries/{card_number}/status"
        );
        assert_eq!(normalize_path("/v1/beneficiaries"), "/v1/beneficiaries");
        assert_eq!(normalize_path("/v1/cycles/active"), "/v1/cycles/active");
    }
}
