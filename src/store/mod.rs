//! Durable per-node replica of the `users` and `bids` namespaces.
//!
//! [`replica::ReplicaStore`] keeps each namespace as a flat JSON document on
//! disk and re-reads it at the start of every operation, so the files are the
//! source of truth.  [`snapshot::Snapshot`] is the in-memory form of both
//! namespaces and carries the leader-wins merge used for resynchronization.

pub mod namespace;
pub mod replica;
pub mod snapshot;

pub use namespace::Namespace;
pub use replica::ReplicaStore;
pub use snapshot::Snapshot;

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the replica store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `db_type` named neither `users` nor `bids`.
    #[error("unknown namespace '{0}', expected 'users' or 'bids'")]
    InvalidNamespace(String),

    /// Reading or writing a namespace file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A namespace file exists but is not a JSON object.
    #[error("corrupt namespace file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
