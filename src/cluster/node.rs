//! Per-node protocol state.
//!
//! One [`Node`] is shared (behind an `Arc`) by the request handlers, the
//! heartbeat sender and the heartbeat monitor.  Each mutable field has its
//! own primitive: the cached leader sits behind a `RwLock`, the last
//! heartbeat instant behind a `Mutex`, and the write-in-progress flag is a
//! plain `AtomicBool` that is set and cleared, never counted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::TimingConfig;

use super::transport::PeerTransport;

/// Identity, peer set and mutable protocol state of this process.
pub struct Node {
    /// Address peers use to reach this node.
    address: String,
    /// Every other node.  Fixed for the process lifetime.
    peers: Vec<String>,
    clock: Arc<dyn Clock>,
    started_at: Instant,
    /// Last agreed leader, if any.
    leader: RwLock<Option<String>>,
    last_heartbeat: Mutex<Instant>,
    write_in_progress: AtomicBool,
    /// Serializes elections started on this node.
    pub(super) election_lock: tokio::sync::Mutex<()>,
    transport: Arc<dyn PeerTransport>,
    timing: TimingConfig,
}

impl Node {
    pub fn new(
        address: impl Into<String>,
        peers: Vec<String>,
        transport: Arc<dyn PeerTransport>,
        clock: Arc<dyn Clock>,
        timing: TimingConfig,
    ) -> Self {
        let address = address.into();
        let peers = peers.into_iter().filter(|p| *p != address).collect();
        let started_at = clock.now();
        Self {
            address,
            peers,
            clock,
            started_at,
            leader: RwLock::new(None),
            last_heartbeat: Mutex::new(started_at),
            write_in_progress: AtomicBool::new(false),
            election_lock: tokio::sync::Mutex::new(()),
            transport,
            timing,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    pub fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.transport
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Time since this process started, by the injected clock.
    pub fn uptime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.uptime().as_secs_f64()
    }

    /// The cached leader, without triggering an election.
    pub fn known_leader(&self) -> Option<String> {
        self.leader.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_leader(&self, leader: Option<String>) {
        let is_self = leader.as_deref() == Some(self.address.as_str());
        *self.leader.write().unwrap_or_else(|e| e.into_inner()) = leader;
        metrics::gauge!(crate::metrics::IS_LEADER).set(if is_self { 1.0 } else { 0.0 });
    }

    /// Whether the cached leader is this node.
    pub fn is_leader(&self) -> bool {
        self.leader
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_deref()
            == Some(self.address.as_str())
    }

    /// Stamp "last heartbeat received = now".
    pub fn record_heartbeat(&self) {
        *self.last_heartbeat.lock().unwrap_or_else(|e| e.into_inner()) = self.clock.now();
    }

    /// Time since the last heartbeat was recorded.
    pub fn heartbeat_age(&self) -> Duration {
        let last = *self.last_heartbeat.lock().unwrap_or_else(|e| e.into_inner());
        self.clock.now().saturating_duration_since(last)
    }

    pub fn write_in_progress(&self) -> bool {
        self.write_in_progress.load(Ordering::SeqCst)
    }

    pub fn set_write_in_progress(&self, busy: bool) {
        self.write_in_progress.store(busy, Ordering::SeqCst);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use crate::cluster::transport::mock::MockTransport;

    pub const SELF_ADDR: &str = "10.0.0.2:5001";

    /// A node at [`SELF_ADDR`] with the given peers, a scripted transport
    /// and a manual clock.
    pub fn test_node(peers: &[&str]) -> (Arc<Node>, Arc<MockTransport>, Arc<ManualClock>) {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new());
        let node = Node::new(
            SELF_ADDR,
            peers.iter().map(|p| p.to_string()).collect(),
            transport.clone(),
            clock.clone(),
            TimingConfig::default(),
        );
        (Arc::new(node), transport, clock)
    }
}
