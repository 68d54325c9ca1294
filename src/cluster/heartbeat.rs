//! Leader liveness: heartbeat sender and follower-side monitor.
//!
//! Two loops run on every node for its whole lifetime.  The sender only
//! does work while the node believes it is the leader; the monitor only does
//! work while it believes it is a follower.

use std::sync::Arc;

use metrics::counter;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::Node;
use crate::metrics::HEARTBEATS_SENT_TOTAL;

impl Node {
    /// One sender round: if this node is the leader, `POST /heartbeat` to
    /// every peer.  Returns the number of peers that acknowledged.
    pub async fn send_heartbeats(&self) -> usize {
        if self.current_leader().await != self.address() {
            return 0;
        }

        let timeout = self.timing().peer_call_timeout();
        let mut sends = JoinSet::new();
        for peer in self.peers() {
            // Leadership may have moved while this round was being sent.
            if !self.is_leader() {
                break;
            }
            let transport = self.transport().clone();
            let peer = peer.clone();
            sends.spawn(async move {
                let result = transport.heartbeat(&peer, timeout).await;
                (peer, result)
            });
        }

        let mut delivered = 0;
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((peer, Ok(()))) => {
                    debug!(%peer, "Sent heartbeat");
                    counter!(HEARTBEATS_SENT_TOTAL, "outcome" => "ok").increment(1);
                    delivered += 1;
                }
                Ok((peer, Err(e))) => {
                    warn!(%peer, "Heartbeat not delivered: {e}");
                    counter!(HEARTBEATS_SENT_TOTAL, "outcome" => "error").increment(1);
                }
                Err(e) => warn!("Heartbeat task failed: {e}"),
            }
        }
        delivered
    }

    /// One monitor round: a follower whose last heartbeat is older than the
    /// timeout starts an election.  Returns whether an election ran.
    ///
    /// The heartbeat window restarts when the election starts, so a leader
    /// that stays silent causes one election per timeout window.
    pub async fn check_leader_liveness(&self) -> bool {
        let leader = self.current_leader().await;
        if leader == self.address() {
            return false;
        }

        let age = self.heartbeat_age();
        if age <= self.timing().heartbeat_timeout() || self.is_leader() {
            return false;
        }

        info!(%leader, age_ms = age.as_millis() as u64, "Leader failed, starting election");
        self.record_heartbeat();
        self.run_election().await;
        true
    }
}

/// Handles to the two background loops.
pub struct HeartbeatTasks {
    sender: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

impl HeartbeatTasks {
    /// Stop both loops.
    pub fn abort(&self) {
        self.sender.abort();
        self.monitor.abort();
    }
}

/// Start the heartbeat sender and monitor loops for `node`.
pub fn spawn(node: Arc<Node>) -> HeartbeatTasks {
    let sender_node = node.clone();
    let sender = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sender_node.timing().heartbeat_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sender_node.send_heartbeats().await;
        }
    });

    let monitor = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(node.timing().monitor_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            node.check_leader_liveness().await;
        }
    });

    HeartbeatTasks { sender, monitor }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::node::test_support::*;
    use crate::cluster::transport::mock::Call;
    use std::time::Duration;

    const LEADER: &str = "10.0.0.1:5001";
    const OTHER: &str = "10.0.0.3:5001";

    fn elections(calls: &[Call]) -> usize {
        calls
            .iter()
            .filter(|c| matches!(c, Call::Election(p) if p == LEADER))
            .count()
    }

    #[tokio::test]
    async fn test_leader_sends_to_every_peer() {
        let (node, transport, _) = test_node(&[LEADER, OTHER]);
        node.set_leader(Some(SELF_ADDR.into()));
        transport.set_unreachable(OTHER);

        assert_eq!(node.send_heartbeats().await, 1);

        let calls = transport.calls();
        assert!(calls.contains(&Call::Heartbeat(LEADER.into())));
        assert!(calls.contains(&Call::Heartbeat(OTHER.into())));
    }

    #[tokio::test]
    async fn test_follower_sends_nothing() {
        let (node, transport, _) = test_node(&[LEADER, OTHER]);
        node.set_leader(Some(LEADER.into()));

        assert_eq!(node.send_heartbeats().await, 0);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_heartbeat_does_not_trigger_election() {
        let (node, transport, clock) = test_node(&[LEADER]);
        node.set_leader(Some(LEADER.into()));
        clock.advance(Duration::from_secs(15));

        assert!(!node.check_leader_liveness().await);
        assert_eq!(elections(&transport.calls()), 0);
    }

    #[tokio::test]
    async fn test_one_election_per_timeout_window() {
        let (node, transport, clock) = test_node(&[LEADER]);
        node.set_leader(Some(LEADER.into()));
        transport.set_election(LEADER, LEADER, 1000.0);

        clock.advance(Duration::from_secs(16));
        assert!(node.check_leader_liveness().await);
        assert_eq!(elections(&transport.calls()), 1);

        // Next monitor tick, 10s later: still inside the restarted window.
        clock.advance(Duration::from_secs(10));
        assert!(!node.check_leader_liveness().await);
        assert_eq!(elections(&transport.calls()), 1);

        // Another full silent window triggers exactly one more.
        clock.advance(Duration::from_secs(10));
        assert!(node.check_leader_liveness().await);
        assert_eq!(elections(&transport.calls()), 2);
    }

    #[tokio::test]
    async fn test_received_heartbeat_keeps_follower_quiet() {
        let (node, transport, clock) = test_node(&[LEADER]);
        node.set_leader(Some(LEADER.into()));

        for _ in 0..5 {
            clock.advance(Duration::from_secs(10));
            node.record_heartbeat();
            assert!(!node.check_leader_liveness().await);
        }
        assert_eq!(elections(&transport.calls()), 0);
    }

    #[tokio::test]
    async fn test_leader_never_times_itself_out() {
        let (node, transport, clock) = test_node(&[LEADER]);
        node.set_leader(Some(SELF_ADDR.into()));
        clock.advance(Duration::from_secs(3600));

        assert!(!node.check_leader_liveness().await);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_leader_is_replaced() {
        let (node, transport, clock) = test_node(&[LEADER, OTHER]);
        node.set_leader(Some(LEADER.into()));
        transport.set_unreachable(LEADER);
        transport.set_election(OTHER, OTHER, 5.0);
        clock.advance(Duration::from_secs(20));

        assert!(node.check_leader_liveness().await);
        // Self has 20s of uptime against the survivor's 5s.
        assert_eq!(node.known_leader().as_deref(), Some(SELF_ADDR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loops_run_and_abort() {
        let (node, transport, _) = test_node(&[LEADER]);
        node.set_leader(Some(SELF_ADDR.into()));

        let tasks = spawn(node.clone());
        tokio::time::sleep(Duration::from_secs(11)).await;
        tasks.abort();

        let beats = transport
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Heartbeat(_)))
            .count();
        // Ticks at 0s, 5s and 10s.
        assert_eq!(beats, 3);
    }
}
