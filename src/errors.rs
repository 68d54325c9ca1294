//! Client-visible error types.
//!
//! Every variant maps to a fixed HTTP status.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(NodeError::NotFound { .. })`; the body is always
//! `{"error": "<message>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::cluster::PeerError;
use crate::store::StoreError;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Failures surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum NodeError {
    /// No record under this key in this namespace.
    #[error("Record not found")]
    NotFound { namespace: String, key: String },

    /// `add_user` for a name that is already registered.
    #[error("User {username} already exists.")]
    UserExists { username: String },

    /// `db_type` named neither `users` nor `bids`.
    #[error("Invalid db_type '{0}', expected 'users' or 'bids'")]
    InvalidNamespace(String),

    /// Malformed or incomplete request body.
    #[error("{0}")]
    Validation(String),

    /// Unknown user or wrong password.
    #[error("Invalid username or password.")]
    InvalidCredentials,

    /// A gated read could not find an idle leader within its budget.
    #[error("{operation} request timed out")]
    TimedOut { operation: &'static str },

    /// The leader could not be reached to forward a write.
    #[error("Failed to forward request to the leader")]
    LeaderUnreachable {
        leader: String,
        #[source]
        source: PeerError,
    },

    /// The local replica could not be read or written.
    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for NodeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidNamespace(name) => NodeError::InvalidNamespace(name),
            other => NodeError::Storage(other),
        }
    }
}

impl NodeError {
    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            NodeError::NotFound { .. } => StatusCode::NOT_FOUND,
            NodeError::UserExists { .. } => StatusCode::BAD_REQUEST,
            NodeError::InvalidNamespace(_) => StatusCode::BAD_REQUEST,
            NodeError::Validation(_) => StatusCode::BAD_REQUEST,
            NodeError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            NodeError::TimedOut { .. } => StatusCode::SERVICE_UNAVAILABLE,
            NodeError::LeaderUnreachable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            NodeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            NodeError::LeaderUnreachable { leader, source } => {
                error!(%leader, "Failed to forward request to leader: {source}")
            }
            NodeError::Storage(_) => error!("{self}"),
            NodeError::TimedOut { .. } => warn!("{self}"),
            _ => {}
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            NodeError::NotFound {
                namespace: "bids".into(),
                key: "a1".into()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            NodeError::UserExists {
                username: "alice".into()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(NodeError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            NodeError::TimedOut { operation: "Read" }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_invalid_namespace_is_distinct_from_not_found() {
        let err: NodeError = StoreError::InvalidNamespace("auctions".into()).into();
        assert!(matches!(err, NodeError::InvalidNamespace(ref n) if n == "auctions"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_storage_failure_is_500() {
        let err: NodeError = StoreError::Io {
            path: "/data/bids.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert!(matches!(err, NodeError::Storage(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(
            NodeError::TimedOut { operation: "Read" }.to_string(),
            "Read request timed out"
        );
    }
}
