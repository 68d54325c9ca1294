//! Axum router construction.
//!
//! The [`app`] function wires the client-facing and peer-facing endpoints to
//! their handlers and returns a ready-to-serve [`axum::Router`].

use std::sync::Arc;

use axum::{
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::generate_request_id;
use crate::handlers::{peer, records};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the peerstore node API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "peerstore node API",
        version = "0.1.0",
        description = "Leader-elected, replicated users/bids key-value node"
    ),
    paths(
        // Client operations
        records::write,
        records::add_user,
        records::read,
        records::authenticate_user,
        // Peer protocol
        peer::replicate,
        peer::new_leader,
        peer::heartbeat,
        peer::lock_status,
        peer::election,
        peer::data,
        // Health
        peer::liveness,
    ),
    tags(
        (name = "Records", description = "Client reads and writes"),
        (name = "Peer", description = "Node-to-node protocol"),
        (name = "Health", description = "Liveness probe"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with every node endpoint.
///
/// `/metrics` and the request metrics middleware are only mounted when
/// `observability.metrics` is enabled.
pub fn app(state: Arc<AppState>) -> Router {
    let metrics_enabled = state.config.observability.metrics;

    let mut router = Router::new()
        // Client-facing
        .route("/write", post(records::write))
        .route("/add_user", post(records::add_user))
        .route("/read/:db_type/:key", get(records::read))
        .route("/authenticate_user", post(records::authenticate_user))
        // Peer-facing
        .route("/replicate", post(peer::replicate))
        .route("/new_leader", post(peer::new_leader))
        .route("/heartbeat", post(peer::heartbeat))
        .route("/lock_status", get(peer::lock_status))
        .route("/election", get(peer::election))
        .route("/data", get(peer::data))
        .route("/liveness", get(peer::liveness))
        .route("/openapi.json", get(openapi_json));

    if metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let router = router
        .with_state(state)
        // common_headers_middleware is inner (stamps every response).
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http());

    if metrics_enabled {
        // metrics_middleware is outer (captures full request lifecycle).
        router.layer(middleware::from_fn(metrics_middleware))
    } else {
        router
    }
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- Common headers middleware -----------------------------------------------

/// Adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `peerstore`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("peerstore"));

    response
}
