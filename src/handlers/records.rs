//! Client-facing record handlers.
//!
//! Writes are routed through the [`Coordinator`](crate::coordinator::Coordinator):
//! on a follower they are forwarded to the leader and its answer relayed,
//! on the leader they are applied and replicated.  Reads and
//! authentication wait for an idle leader, then answer from the local
//! replica.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;

use crate::cluster::messages::{Credentials, Message, RecordValue, RecordWrite};
use crate::coordinator::Routed;
use crate::errors::NodeError;
use crate::handlers::parse_body;
use crate::store::Namespace;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/write",
    tag = "Records",
    operation_id = "Write",
    request_body = RecordWrite,
    responses(
        (status = 200, description = "Write applied by the leader", body = Message),
        (status = 400, description = "Malformed body or unknown db_type"),
        (status = 500, description = "Leader unreachable or storage failure")
    )
)]
pub async fn write(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, NodeError> {
    let record: RecordWrite = parse_body(&body)?;
    match state.coordinator.write(record, body).await? {
        Routed::Local(namespace) => Ok(Json(Message::new(format!(
            "Write successful to {namespace} database"
        )))
        .into_response()),
        Routed::Forwarded(response) => Ok(response.into_response()),
    }
}

#[utoipa::path(
    post,
    path = "/add_user",
    tag = "Records",
    operation_id = "AddUser",
    request_body = Credentials,
    responses(
        (status = 200, description = "User registered", body = Message),
        (status = 400, description = "User already exists or malformed body"),
        (status = 500, description = "Leader unreachable or storage failure")
    )
)]
pub async fn add_user(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, NodeError> {
    let credentials: Credentials = parse_body(&body)?;
    let username = credentials.username.clone();
    match state.coordinator.add_user(credentials, body).await? {
        Routed::Local(()) => Ok(Json(Message::new(format!(
            "User {username} added successfully."
        )))
        .into_response()),
        Routed::Forwarded(response) => Ok(response.into_response()),
    }
}

#[utoipa::path(
    get,
    path = "/read/{db_type}/{key}",
    tag = "Records",
    operation_id = "Read",
    params(
        ("db_type" = String, Path, description = "Namespace: users or bids"),
        ("key" = String, Path, description = "Record key")
    ),
    responses(
        (status = 200, description = "Record found", body = RecordValue),
        (status = 400, description = "Unknown db_type"),
        (status = 404, description = "Record not found"),
        (status = 503, description = "Leader stayed busy or unreachable")
    )
)]
pub async fn read(
    State(state): State<Arc<AppState>>,
    Path((db_type, key)): Path<(String, String)>,
) -> Result<Json<RecordValue>, NodeError> {
    let namespace: Namespace = db_type.parse()?;
    let value = state.coordinator.read(namespace, &key).await?;
    Ok(Json(RecordValue { key, value }))
}

#[utoipa::path(
    post,
    path = "/authenticate_user",
    tag = "Records",
    operation_id = "AuthenticateUser",
    request_body = Credentials,
    responses(
        (status = 200, description = "Credentials match", body = Message),
        (status = 401, description = "Invalid username or password"),
        (status = 503, description = "Leader stayed busy or unreachable")
    )
)]
pub async fn authenticate_user(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Message>, NodeError> {
    let credentials: Credentials = parse_body(&body)?;
    state.coordinator.authenticate(&credentials).await?;
    Ok(Json(Message::new("Authentication successful.")))
}
