//! JSON bodies exchanged between nodes and with clients.

use bytes::Bytes;
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::store::{Namespace, StoreError};

/// Body of `POST /write` and `POST /replicate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct RecordWrite {
    #[garde(length(min = 1))]
    pub key: String,
    /// Opaque document stored under `key`.
    #[garde(skip)]
    #[schema(value_type = Object)]
    pub value: Value,
    /// Target namespace: `users` or `bids`.
    #[garde(length(min = 1))]
    pub db_type: String,
}

impl RecordWrite {
    pub fn new(namespace: Namespace, key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            db_type: namespace.as_str().to_string(),
        }
    }

    pub fn namespace(&self) -> Result<Namespace, StoreError> {
        self.db_type.parse()
    }
}

/// Body of `POST /add_user` and `POST /authenticate_user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct Credentials {
    #[garde(length(min = 1))]
    pub username: String,
    #[garde(skip)]
    pub password: String,
}

/// Response of `GET /election`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ElectionInfo {
    /// Address of the responding node.
    pub ip: String,
    /// Seconds since the responding node started.
    pub uptime: f64,
}

/// Body of `POST /new_leader`.  A missing leader clears the receiver's
/// cached leader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewLeader {
    #[serde(default)]
    pub leader_ip: Option<String>,
}

/// Response of `GET /lock_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LockStatus {
    #[serde(default)]
    pub write_in_progress: bool,
}

/// Response of `GET /liveness`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Liveness {
    pub message: String,
    pub uptime: f64,
}

/// Response of `GET /read/{db_type}/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordValue {
    pub key: String,
    #[schema(value_type = Object)]
    pub value: Value,
}

/// Generic `{"message": ...}` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Endpoints a follower forwards to the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardRoute {
    Write,
    AddUser,
}

impl ForwardRoute {
    pub fn path(&self) -> &'static str {
        match self {
            ForwardRoute::Write => "/write",
            ForwardRoute::AddUser => "/add_user",
        }
    }
}

/// The leader's answer to a forwarded request, relayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forwarded {
    pub status: u16,
    pub body: Bytes,
}
