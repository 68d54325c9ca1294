//! Outbound peer calls.
//!
//! [`PeerTransport`] is the seam between the protocol logic and the network.
//! [`HttpTransport`] speaks the JSON-over-HTTP peer API with `reqwest`; each
//! call carries its own timeout, chosen by the caller.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use super::messages::{ElectionInfo, ForwardRoute, Forwarded, LockStatus, NewLeader, RecordWrite};
use crate::store::Snapshot;

/// Why a peer could not be used for this round.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("request to {peer} timed out")]
    Timeout { peer: String },

    #[error("could not connect to {peer}: {message}")]
    Connect { peer: String, message: String },

    #[error("{peer} answered with status {status}")]
    Status { peer: String, status: u16 },

    #[error("transport error talking to {peer}: {message}")]
    Transport { peer: String, message: String },

    #[error("malformed response from {peer}: {message}")]
    Decode { peer: String, message: String },
}

impl PeerError {
    /// Classify a `reqwest` failure.
    pub fn from_reqwest(peer: &str, err: reqwest::Error) -> Self {
        let peer = peer.to_string();
        if err.is_timeout() {
            PeerError::Timeout { peer }
        } else if err.is_connect() {
            PeerError::Connect {
                peer,
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            PeerError::Status {
                peer,
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            PeerError::Decode {
                peer,
                message: err.to_string(),
            }
        } else {
            PeerError::Transport {
                peer,
                message: err.to_string(),
            }
        }
    }
}

/// Boxed future returned by every transport call.
pub type PeerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PeerError>> + Send + 'a>>;

/// Peer-to-peer calls used by the election, heartbeat, replication and
/// routing logic.
pub trait PeerTransport: Send + Sync + 'static {
    /// `GET /election`.
    fn election_info(&self, peer: &str, timeout: Duration) -> PeerFuture<'_, ElectionInfo>;

    /// `POST /new_leader`.
    fn announce_leader(&self, peer: &str, leader: &str, timeout: Duration) -> PeerFuture<'_, ()>;

    /// `POST /heartbeat`.
    fn heartbeat(&self, peer: &str, timeout: Duration) -> PeerFuture<'_, ()>;

    /// `POST /replicate`.
    fn replicate(&self, peer: &str, record: &RecordWrite, timeout: Duration)
        -> PeerFuture<'_, ()>;

    /// `GET /lock_status`.
    fn lock_status(&self, peer: &str, timeout: Duration) -> PeerFuture<'_, LockStatus>;

    /// `GET /data`.
    fn fetch_snapshot(&self, peer: &str, timeout: Duration) -> PeerFuture<'_, Snapshot>;

    /// Re-send a client body to the leader and return its answer unchanged,
    /// whatever the status code.
    fn forward(
        &self,
        peer: &str,
        route: ForwardRoute,
        body: Bytes,
        timeout: Duration,
    ) -> PeerFuture<'_, Forwarded>;
}

/// JSON-over-HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self { client })
    }

    fn url(peer: &str, path: &str) -> String {
        if peer.starts_with("http://") || peer.starts_with("https://") {
            format!("{}{}", peer.trim_end_matches('/'), path)
        } else {
            format!("http://{peer}{path}")
        }
    }
}

impl PeerTransport for HttpTransport {
    fn election_info(&self, peer: &str, timeout: Duration) -> PeerFuture<'_, ElectionInfo> {
        let peer = peer.to_string();
        Box::pin(async move {
            let resp = self
                .client
                .get(Self::url(&peer, "/election"))
                .timeout(timeout)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PeerError::from_reqwest(&peer, e))?;
            resp.json::<ElectionInfo>()
                .await
                .map_err(|e| PeerError::from_reqwest(&peer, e))
        })
    }

    fn announce_leader(&self, peer: &str, leader: &str, timeout: Duration) -> PeerFuture<'_, ()> {
        let peer = peer.to_string();
        let body = NewLeader {
            leader_ip: Some(leader.to_string()),
        };
        Box::pin(async move {
            self.client
                .post(Self::url(&peer, "/new_leader"))
                .json(&body)
                .timeout(timeout)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PeerError::from_reqwest(&peer, e))?;
            Ok(())
        })
    }

    fn heartbeat(&self, peer: &str, timeout: Duration) -> PeerFuture<'_, ()> {
        let peer = peer.to_string();
        Box::pin(async move {
            self.client
                .post(Self::url(&peer, "/heartbeat"))
                .timeout(timeout)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PeerError::from_reqwest(&peer, e))?;
            Ok(())
        })
    }

    fn replicate(
        &self,
        peer: &str,
        record: &RecordWrite,
        timeout: Duration,
    ) -> PeerFuture<'_, ()> {
        let peer = peer.to_string();
        let record = record.clone();
        Box::pin(async move {
            self.client
                .post(Self::url(&peer, "/replicate"))
                .json(&record)
                .timeout(timeout)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PeerError::from_reqwest(&peer, e))?;
            Ok(())
        })
    }

    fn lock_status(&self, peer: &str, timeout: Duration) -> PeerFuture<'_, LockStatus> {
        let peer = peer.to_string();
        Box::pin(async move {
            let resp = self
                .client
                .get(Self::url(&peer, "/lock_status"))
                .timeout(timeout)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PeerError::from_reqwest(&peer, e))?;
            resp.json::<LockStatus>()
                .await
                .map_err(|e| PeerError::from_reqwest(&peer, e))
        })
    }

    fn fetch_snapshot(&self, peer: &str, timeout: Duration) -> PeerFuture<'_, Snapshot> {
        let peer = peer.to_string();
        Box::pin(async move {
            let resp = self
                .client
                .get(Self::url(&peer, "/data"))
                .timeout(timeout)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PeerError::from_reqwest(&peer, e))?;
            resp.json::<Snapshot>()
                .await
                .map_err(|e| PeerError::from_reqwest(&peer, e))
        })
    }

    fn forward(
        &self,
        peer: &str,
        route: ForwardRoute,
        body: Bytes,
        timeout: Duration,
    ) -> PeerFuture<'_, Forwarded> {
        let peer = peer.to_string();
        Box::pin(async move {
            let resp = self
                .client
                .post(Self::url(&peer, route.path()))
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| PeerError::from_reqwest(&peer, e))?;
            let status = resp.status().as_u16();
            let body = resp
                .bytes()
                .await
                .map_err(|e| PeerError::from_reqwest(&peer, e))?;
            Ok(Forwarded { status, body })
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_accepts_bare_and_schemed_peers() {
        assert_eq!(
            HttpTransport::url("10.0.0.1:5001", "/election"),
            "http://10.0.0.1:5001/election"
        );
        assert_eq!(
            HttpTransport::url("https://db-0.example/", "/data"),
            "https://db-0.example/data"
        );
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_connect_or_timeout_error() {
        let transport = HttpTransport::new().unwrap();
        // Port 9 on localhost is the discard service and is closed on test hosts.
        let err = transport
            .heartbeat("127.0.0.1:9", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PeerError::Connect { .. } | PeerError::Timeout { .. } | PeerError::Transport { .. }
        ));
    }
}
