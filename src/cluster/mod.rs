//! Cluster coordination: leader election, heartbeats and replication.
//!
//! There is no consensus protocol here.  The node with the highest uptime
//! wins an election (ties go to the greater address), the leader proves it
//! is alive with periodic heartbeats, and every accepted write is pushed to
//! the followers on a best-effort basis.

pub mod address;
pub mod election;
pub mod heartbeat;
pub mod messages;
pub mod node;
pub mod replication;
pub mod transport;

pub use node::Node;
pub use transport::{HttpTransport, PeerError, PeerTransport};
