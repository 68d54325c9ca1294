//! peerstore library: a leader-elected, replicated users/bids key-value node.
//!
//! Every node keeps a full replica of two JSON namespaces on disk.  One node
//! is elected leader (highest uptime, ties broken by address) and serializes
//! all writes; followers forward writes to it, receive replicated records,
//! and gate their reads on the leader being idle.

use std::sync::Arc;

pub mod clock;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod retry;
pub mod serialization;
pub mod server;
pub mod store;

use crate::clock::Clock;
use crate::cluster::{Node, PeerTransport};
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::store::ReplicaStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Election, heartbeat and write-flag state of this node.
    pub node: Arc<Node>,
    /// Local replica of both namespaces.
    pub store: Arc<ReplicaStore>,
    /// Routes writes and gates reads.
    pub coordinator: Coordinator,
}

impl AppState {
    /// Open the replica under `config.storage.data_dir` and build the node
    /// from the configured identity and peers.
    pub fn new(
        config: Config,
        transport: Arc<dyn PeerTransport>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(ReplicaStore::open(&config.storage.data_dir)?);
        let node = Arc::new(Node::new(
            config.node.address.clone(),
            config.other_peers(),
            transport,
            clock,
            config.timing.clone(),
        ));
        let coordinator = Coordinator::new(node.clone(), store.clone());
        Ok(Self {
            config,
            node,
            store,
            coordinator,
        })
    }
}
