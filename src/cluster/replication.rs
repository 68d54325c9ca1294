//! Leader-to-follower propagation.
//!
//! Single writes are pushed to every follower once, without waiting for or
//! retrying acknowledgements.  A follower that misses a push only catches up
//! through a later write to the same key or through the startup
//! resynchronization, which merges the leader's full snapshot into the local
//! replica with the leader winning every difference.

use std::sync::Arc;

use metrics::counter;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::messages::RecordWrite;
use super::{Node, PeerError};
use crate::metrics::{REPLICATION_PUSHES_TOTAL, RESYNC_KEYS_TOTAL};
use crate::store::{ReplicaStore, StoreError};

/// Why a startup resynchronization did not complete.
#[derive(Debug, thiserror::Error)]
pub enum ResyncError {
    #[error("could not fetch leader snapshot: {0}")]
    Fetch(#[from] PeerError),
    #[error("could not merge leader snapshot: {0}")]
    Merge(#[from] StoreError),
}

impl Node {
    /// Push `record` to every peer.  Returns the number of peers that
    /// acknowledged it.
    pub async fn replicate_to_followers(&self, record: &RecordWrite) -> usize {
        let timeout = self.timing().peer_call_timeout();
        let mut pushes = JoinSet::new();
        for peer in self.peers() {
            let transport = self.transport().clone();
            let peer = peer.clone();
            let record = record.clone();
            pushes.spawn(async move {
                let result = transport.replicate(&peer, &record, timeout).await;
                (peer, result)
            });
        }

        let mut delivered = 0;
        while let Some(joined) = pushes.join_next().await {
            match joined {
                Ok((peer, Ok(()))) => {
                    debug!(%peer, key = %record.key, db_type = %record.db_type, "Replicated record");
                    counter!(REPLICATION_PUSHES_TOTAL, "outcome" => "ok").increment(1);
                    delivered += 1;
                }
                Ok((peer, Err(e))) => {
                    warn!(%peer, key = %record.key, "Failed to replicate: {e}");
                    counter!(REPLICATION_PUSHES_TOTAL, "outcome" => "error").increment(1);
                }
                Err(e) => warn!("Replication task failed: {e}"),
            }
        }
        delivered
    }

    /// Fire-and-forget variant of [`Node::replicate_to_followers`].
    pub fn replicate_in_background(self: &Arc<Self>, record: RecordWrite) -> JoinHandle<usize> {
        let node = self.clone();
        tokio::spawn(async move { node.replicate_to_followers(&record).await })
    }
}

/// Merge `leader`'s full snapshot into `store`.  Keys that only exist locally
/// are kept.  Returns the number of keys added or overwritten.
pub async fn resynchronize(
    node: &Node,
    store: &ReplicaStore,
    leader: &str,
) -> Result<usize, ResyncError> {
    info!(%leader, "Synchronizing data with leader");
    let snapshot = node
        .transport()
        .fetch_snapshot(leader, node.timing().sync_timeout())
        .await?;
    let changed = store.merge(&snapshot)?;
    counter!(RESYNC_KEYS_TOTAL).increment(changed as u64);
    info!(%leader, changed, "Synchronization complete");
    Ok(changed)
}
