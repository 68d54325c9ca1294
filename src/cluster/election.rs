//! Uptime-ranked leader election.
//!
//! Every peer is polled for `(address, uptime)`; the longest-running node
//! wins and equal uptimes go to the greater address.  The local node is
//! always a candidate, so an election always produces a leader even when no
//! peer answers.  The winner is cached locally and broadcast to all peers
//! without confirmation.

use std::cmp::Ordering;

use metrics::counter;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::address::compare_addresses;
use super::messages::ElectionInfo;
use super::Node;
use crate::metrics::{ELECTIONS_TOTAL, LEADER_BROADCASTS_TOTAL};

/// Pick the winner among `candidates`: highest uptime, then greatest address.
///
/// The result does not depend on the order of `candidates`.
pub fn pick_winner(candidates: &[ElectionInfo]) -> Option<&ElectionInfo> {
    candidates.iter().max_by(|a, b| rank(a, b))
}

fn rank(a: &ElectionInfo, b: &ElectionInfo) -> Ordering {
    a.uptime
        .total_cmp(&b.uptime)
        .then_with(|| compare_addresses(&a.ip, &b.ip))
}

impl Node {
    /// The last agreed leader, running an election first when none is known.
    pub async fn current_leader(&self) -> String {
        if let Some(leader) = self.known_leader() {
            return leader;
        }
        let _guard = self.election_lock.lock().await;
        // Another election may have finished while we waited.
        if let Some(leader) = self.known_leader() {
            return leader;
        }
        self.elect().await
    }

    /// Poll all peers, adopt the winner and broadcast it.
    pub async fn run_election(&self) -> String {
        let _guard = self.election_lock.lock().await;
        self.elect().await
    }

    /// Startup election: repeat with a fixed backoff until a leader is known.
    pub async fn elect_until_resolved(&self) -> String {
        loop {
            self.run_election().await;
            if let Some(leader) = self.known_leader() {
                return leader;
            }
            info!("Waiting for leader election");
            tokio::time::sleep(self.timing().startup_backoff()).await;
        }
    }

    async fn elect(&self) -> String {
        let me = ElectionInfo {
            ip: self.address().to_string(),
            uptime: self.uptime_secs(),
        };
        debug!(address = %me.ip, uptime = me.uptime, "Starting election");

        let timeout = self.timing().election_poll_timeout();
        let mut polls = JoinSet::new();
        for peer in self.peers() {
            let transport = self.transport().clone();
            let peer = peer.clone();
            polls.spawn(async move {
                let result = transport.election_info(&peer, timeout).await;
                (peer, result)
            });
        }

        let mut candidates = vec![me];
        while let Some(joined) = polls.join_next().await {
            match joined {
                Ok((peer, Ok(info))) if !info.ip.is_empty() => {
                    debug!(%peer, address = %info.ip, uptime = info.uptime, "Election reply");
                    candidates.push(info);
                }
                Ok((peer, Ok(_))) => warn!(%peer, "Peer reported an empty address, ignoring"),
                Ok((peer, Err(e))) => warn!(%peer, "Peer absent from election: {e}"),
                Err(e) => warn!("Election poll task failed: {e}"),
            }
        }

        let winner = pick_winner(&candidates)
            .map(|c| c.ip.clone())
            .unwrap_or_else(|| self.address().to_string());

        info!(leader = %winner, candidates = candidates.len(), "Elected leader");
        counter!(ELECTIONS_TOTAL).increment(1);
        self.set_leader(Some(winner.clone()));
        self.broadcast(&winner).await;
        winner
    }

    /// Best-effort `/new_leader` to every peer.  No retry, no confirmation.
    pub async fn broadcast(&self, leader: &str) {
        let timeout = self.timing().broadcast_timeout();
        let mut sends = JoinSet::new();
        for peer in self.peers() {
            let transport = self.transport().clone();
            let peer = peer.clone();
            let leader = leader.to_string();
            sends.spawn(async move {
                let result = transport.announce_leader(&peer, &leader, timeout).await;
                (peer, result)
            });
        }

        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((peer, Ok(()))) => {
                    debug!(%peer, %leader, "Notified peer about new leader");
                    counter!(LEADER_BROADCASTS_TOTAL, "outcome" => "ok").increment(1);
                }
                Ok((peer, Err(e))) => {
                    warn!(%peer, "Failed to notify peer about new leader: {e}");
                    counter!(LEADER_BROADCASTS_TOTAL, "outcome" => "error").increment(1);
                }
                Err(e) => warn!("Broadcast task failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::node::test_support::*;
    use crate::cluster::transport::mock::Call;
    use std::time::Duration;

    fn info(ip: &str, uptime: f64) -> ElectionInfo {
        ElectionInfo {
            ip: ip.to_string(),
            uptime,
        }
    }

    #[test]
    fn test_pick_winner_tie_goes_to_greater_address() {
        let a = info("10.0.0.1:5001", 10.0);
        let b = info("10.0.0.2:5001", 25.0);
        let c = info("10.0.0.3:5001", 25.0);

        for order in [
            vec![a.clone(), b.clone(), c.clone()],
            vec![c.clone(), b.clone(), a.clone()],
            vec![b.clone(), a.clone(), c.clone()],
        ] {
            assert_eq!(pick_winner(&order).unwrap().ip, "10.0.0.3:5001");
        }
    }

    #[test]
    fn test_pick_winner_highest_uptime() {
        let candidates = vec![info("10.0.0.9:5001", 3.0), info("10.0.0.1:5001", 40.0)];
        assert_eq!(pick_winner(&candidates).unwrap().ip, "10.0.0.1:5001");
        assert!(pick_winner(&[]).is_none());
    }

    #[tokio::test]
    async fn test_election_excludes_silent_peers() {
        let (node, transport, clock) = test_node(&["10.0.0.1:5001", "10.0.0.3:5001"]);
        clock.advance(Duration::from_secs(30));
        transport.set_election("10.0.0.1:5001", "10.0.0.1:5001", 12.0);
        transport.set_unreachable("10.0.0.3:5001");

        let leader = node.run_election().await;

        assert_eq!(leader, SELF_ADDR);
        assert!(node.is_leader());
    }

    #[tokio::test]
    async fn test_election_adopts_and_broadcasts_winner() {
        let (node, transport, clock) = test_node(&["10.0.0.1:5001", "10.0.0.3:5001"]);
        clock.advance(Duration::from_secs(25));
        transport.set_election("10.0.0.1:5001", "10.0.0.1:5001", 10.0);
        transport.set_election("10.0.0.3:5001", "10.0.0.3:5001", 25.0);

        let leader = node.run_election().await;

        assert_eq!(leader, "10.0.0.3:5001");
        assert_eq!(node.known_leader().as_deref(), Some("10.0.0.3:5001"));

        let mut announced: Vec<String> = transport
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Announce { peer, leader } => {
                    assert_eq!(leader, "10.0.0.3:5001");
                    Some(peer)
                }
                _ => None,
            })
            .collect();
        announced.sort();
        assert_eq!(announced, vec!["10.0.0.1:5001", "10.0.0.3:5001"]);
    }

    #[tokio::test]
    async fn test_broadcast_failures_are_not_fatal() {
        let (node, transport, _) = test_node(&["10.0.0.1:5001"]);
        transport.set_unreachable("10.0.0.1:5001");

        let leader = node.run_election().await;

        assert_eq!(leader, SELF_ADDR);
    }

    #[tokio::test]
    async fn test_current_leader_uses_cache() {
        let (node, transport, _) = test_node(&["10.0.0.1:5001"]);
        node.set_leader(Some("10.0.0.1:5001".into()));

        assert_eq!(node.current_leader().await, "10.0.0.1:5001");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_current_leader_elects_lazily() {
        let (node, transport, _) = test_node(&["10.0.0.1:5001"]);
        transport.set_election("10.0.0.1:5001", "10.0.0.1:5001", 99.0);

        assert_eq!(node.current_leader().await, "10.0.0.1:5001");
        assert!(transport
            .calls()
            .contains(&Call::Election("10.0.0.1:5001".into())));
    }

    #[tokio::test]
    async fn test_elect_until_resolved_single_node() {
        let (node, _, _) = test_node(&[]);
        assert_eq!(node.elect_until_resolved().await, SELF_ADDR);
    }
}
