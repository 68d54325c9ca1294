//! Node-to-node protocol handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use metrics::counter;
use tracing::{debug, info};

use crate::cluster::messages::{ElectionInfo, Liveness, LockStatus, Message, NewLeader, RecordWrite};
use crate::errors::NodeError;
use crate::handlers::parse_body;
use crate::metrics::HEARTBEATS_RECEIVED_TOTAL;
use crate::store::Snapshot;
use crate::AppState;

/// Apply a record pushed by the leader.  Never forwarded, never
/// re-replicated.
#[utoipa::path(
    post,
    path = "/replicate",
    tag = "Peer",
    operation_id = "Replicate",
    request_body = RecordWrite,
    responses(
        (status = 200, description = "Record applied locally", body = Message),
        (status = 400, description = "Malformed body or unknown db_type")
    )
)]
pub async fn replicate(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<Message>, NodeError> {
    let record: RecordWrite = parse_body(&body)?;
    state.coordinator.replicate(&record)?;
    Ok(Json(Message::new("Replication successful")))
}

/// Adopt the announced leader.  An empty body or a null `leader_ip`
/// clears it.
#[utoipa::path(
    post,
    path = "/new_leader",
    tag = "Peer",
    operation_id = "NewLeader",
    request_body = NewLeader,
    responses(
        (status = 200, description = "Leader recorded", body = Message),
        (status = 400, description = "Malformed body")
    )
)]
pub async fn new_leader(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<Message>, NodeError> {
    let announcement: NewLeader = if body.iter().all(u8::is_ascii_whitespace) {
        NewLeader::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| NodeError::Validation(format!("Invalid request body: {e}")))?
    };

    match &announcement.leader_ip {
        Some(leader) => info!(%leader, "Leader announced"),
        None => info!("Leader cleared by peer announcement"),
    }
    state.node.set_leader(announcement.leader_ip);
    Ok(Json(Message::new("Leader update received")))
}

#[utoipa::path(
    post,
    path = "/heartbeat",
    tag = "Peer",
    operation_id = "Heartbeat",
    responses((status = 200, description = "Heartbeat recorded", body = Message))
)]
pub async fn heartbeat(State(state): State<Arc<AppState>>) -> Json<Message> {
    state.node.record_heartbeat();
    counter!(HEARTBEATS_RECEIVED_TOTAL).increment(1);
    debug!("Heartbeat received");
    Json(Message::new("Heartbeat received"))
}

#[utoipa::path(
    get,
    path = "/lock_status",
    tag = "Peer",
    operation_id = "LockStatus",
    responses((status = 200, description = "Current write flag", body = LockStatus))
)]
pub async fn lock_status(State(state): State<Arc<AppState>>) -> Json<LockStatus> {
    Json(LockStatus {
        write_in_progress: state.node.write_in_progress(),
    })
}

#[utoipa::path(
    get,
    path = "/election",
    tag = "Peer",
    operation_id = "Election",
    responses((status = 200, description = "Address and uptime of this node", body = ElectionInfo))
)]
pub async fn election(State(state): State<Arc<AppState>>) -> Json<ElectionInfo> {
    Json(ElectionInfo {
        ip: state.node.address().to_string(),
        uptime: state.node.uptime_secs(),
    })
}

/// Full replica, used by followers to resynchronize at startup.
#[utoipa::path(
    get,
    path = "/data",
    tag = "Peer",
    operation_id = "Data",
    responses(
        (status = 200, description = "Both namespaces as JSON objects"),
        (status = 500, description = "Replica could not be read")
    )
)]
pub async fn data(State(state): State<Arc<AppState>>) -> Result<Json<Snapshot>, NodeError> {
    Ok(Json(state.store.snapshot()?))
}

#[utoipa::path(
    get,
    path = "/liveness",
    tag = "Health",
    operation_id = "Liveness",
    responses((status = 200, description = "Process is serving", body = Liveness))
)]
pub async fn liveness(State(state): State<Arc<AppState>>) -> Json<Liveness> {
    Json(Liveness {
        message: "endpoint is live".to_string(),
        uptime: state.node.uptime_secs(),
    })
}
