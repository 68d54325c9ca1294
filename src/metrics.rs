//! Prometheus metrics for peerstore.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.  Without an
//! installed recorder every metric call is a no-op.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "peerstore_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "peerstore_http_request_duration_seconds";

/// Elections run by this node (counter).
pub const ELECTIONS_TOTAL: &str = "peerstore_elections_total";

/// `/new_leader` notifications sent (counter). Labels: outcome.
pub const LEADER_BROADCASTS_TOTAL: &str = "peerstore_leader_broadcasts_total";

/// Heartbeats sent by the leader (counter). Labels: outcome.
pub const HEARTBEATS_SENT_TOTAL: &str = "peerstore_heartbeats_sent_total";

/// Heartbeats received from the leader (counter).
pub const HEARTBEATS_RECEIVED_TOTAL: &str = "peerstore_heartbeats_received_total";

/// Replication pushes to followers (counter). Labels: outcome.
pub const REPLICATION_PUSHES_TOTAL: &str = "peerstore_replication_pushes_total";

/// Requests forwarded to the leader (counter). Labels: route, outcome.
pub const FORWARDED_REQUESTS_TOTAL: &str = "peerstore_forwarded_requests_total";

/// Lock-status polls made by gated reads (counter). Labels: outcome.
pub const READ_GATE_POLLS_TOTAL: &str = "peerstore_read_gate_polls_total";

/// Keys changed by startup resynchronization (counter).
pub const RESYNC_KEYS_TOTAL: &str = "peerstore_resync_keys_total";

/// 1 while this node believes it is the leader (gauge).
pub const IS_LEADER: &str = "peerstore_is_leader";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(ELECTIONS_TOTAL, "Elections run by this node");
    describe_counter!(LEADER_BROADCASTS_TOTAL, "New-leader notifications sent");
    describe_counter!(HEARTBEATS_SENT_TOTAL, "Heartbeats sent to followers");
    describe_counter!(HEARTBEATS_RECEIVED_TOTAL, "Heartbeats received from the leader");
    describe_counter!(REPLICATION_PUSHES_TOTAL, "Replication pushes to followers");
    describe_counter!(FORWARDED_REQUESTS_TOTAL, "Requests forwarded to the leader");
    describe_counter!(READ_GATE_POLLS_TOTAL, "Leader lock-status polls by gated reads");
    describe_counter!(RESYNC_KEYS_TOTAL, "Keys changed by startup resynchronization");
    describe_gauge!(IS_LEADER, "1 while this node believes it is the leader");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize a request path to a route template for metric labels, so
/// record keys do not become label values.
///
/// Examples:
/// - `/heartbeat` -> `/heartbeat`
/// - `/read/bids/a1` -> `/read/{db_type}/{key}`
/// - `/no/such/route` -> `/{unknown}`
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/write" | "/add_user" | "/authenticate_user" | "/replicate" | "/new_leader"
        | "/heartbeat" | "/lock_status" | "/election" | "/data" | "/liveness" | "/metrics"
        | "/openapi.json" => path.to_string(),
        _ if path.starts_with("/read/") => "/read/{db_type}/{key}".to_string(),
        _ => "/{unknown}".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
