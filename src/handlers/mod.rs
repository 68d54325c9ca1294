//! HTTP handlers.
//!
//! [`records`] holds the client-facing endpoints (writes, reads,
//! authentication); [`peer`] holds the node-to-node protocol endpoints.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use garde::Validate;
use serde::de::DeserializeOwned;

use crate::cluster::messages::Forwarded;
use crate::errors::NodeError;

pub mod peer;
pub mod records;

/// Decode a JSON body and run its field validation.
pub(crate) fn parse_body<T>(body: &[u8]) -> Result<T, NodeError>
where
    T: DeserializeOwned + Validate,
    T::Context: Default,
{
    let value: T = serde_json::from_slice(body)
        .map_err(|e| NodeError::Validation(format!("Invalid request body: {e}")))?;
    value
        .validate()
        .map_err(|report| NodeError::Validation(format!("Invalid request body: {report}")))?;
    Ok(value)
}

/// Relay the leader's status and body unchanged.
impl IntoResponse for Forwarded {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            self.body,
        )
            .into_response()
    }
}
