//! Request routing and the read consistency gate.
//!
//! Writes go to the leader: a follower forwards the client's body unchanged
//! and relays the leader's answer, the leader applies the write locally with
//! its write-in-progress flag raised and then replicates it.  Reads and
//! authentications are served from the *local* replica once the leader
//! reports that no write is in flight.
//!
//! The gate only covers the leader's own write window.  A follower can still
//! serve a value that replication has not delivered yet, even when the
//! leader reports idle; this weak guarantee is deliberate and observable.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::cluster::messages::{Credentials, ForwardRoute, Forwarded, RecordWrite};
use crate::cluster::replication::resynchronize;
use crate::cluster::Node;
use crate::errors::NodeError;
use crate::metrics::{FORWARDED_REQUESTS_TOTAL, READ_GATE_POLLS_TOTAL};
use crate::retry::{retry_until, Attempt, RetryPolicy};
use crate::store::replica::user_document;
use crate::store::{Namespace, ReplicaStore};

/// Where a write request ended up.
#[derive(Debug)]
pub enum Routed<T> {
    /// Applied on this node, which is the leader.
    Local(T),
    /// Handled by the leader; its response is relayed as is.
    Forwarded(Forwarded),
}

/// Ties the node's protocol state to its replica store.
#[derive(Clone)]
pub struct Coordinator {
    node: Arc<Node>,
    store: Arc<ReplicaStore>,
}

impl Coordinator {
    pub fn new(node: Arc<Node>, store: Arc<ReplicaStore>) -> Self {
        Self { node, store }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn store(&self) -> &Arc<ReplicaStore> {
        &self.store
    }

    /// Startup: elect a leader, then pull the leader's snapshot if this node
    /// is a follower.  A failed resynchronization is logged, not fatal.
    pub async fn bootstrap(&self) -> String {
        let leader = self.node.elect_until_resolved().await;
        if leader == self.node.address() {
            info!("No synchronization needed, this node is the leader");
        } else if let Err(e) = resynchronize(&self.node, &self.store, &leader).await {
            error!(%leader, "Failed to synchronize with leader: {e}");
        }
        leader
    }

    /// `POST /write`.  `body` is the client's original request body.
    pub async fn write(&self, record: RecordWrite, body: Bytes) -> Result<Routed<Namespace>, NodeError> {
        let namespace = record.namespace()?;
        let leader = self.node.current_leader().await;
        if leader != self.node.address() {
            return self
                .forward(&leader, ForwardRoute::Write, body)
                .await
                .map(Routed::Forwarded);
        }

        self.node.set_write_in_progress(true);
        let result = self
            .store
            .write(namespace, &record.key, record.value.clone());
        if result.is_ok() {
            self.node.replicate_in_background(record);
        }
        self.node.set_write_in_progress(false);

        result?;
        Ok(Routed::Local(namespace))
    }

    /// `POST /add_user`.  Fails with [`NodeError::UserExists`] on the leader
    /// when the name is taken.
    pub async fn add_user(&self, credentials: Credentials, body: Bytes) -> Result<Routed<()>, NodeError> {
        let leader = self.node.current_leader().await;
        if leader != self.node.address() {
            return self
                .forward(&leader, ForwardRoute::AddUser, body)
                .await
                .map(Routed::Forwarded);
        }

        self.node.set_write_in_progress(true);
        let result = self
            .store
            .add_user(&credentials.username, &credentials.password);
        if let Ok(true) = result {
            self.node.replicate_in_background(RecordWrite::new(
                Namespace::Users,
                credentials.username.clone(),
                user_document(&credentials.password),
            ));
        }
        self.node.set_write_in_progress(false);

        if result? {
            Ok(Routed::Local(()))
        } else {
            Err(NodeError::UserExists {
                username: credentials.username,
            })
        }
    }

    /// `POST /replicate`.  Local upsert only: no forwarding, no flag, no
    /// further replication.
    pub fn replicate(&self, record: &RecordWrite) -> Result<Namespace, NodeError> {
        let namespace = record.namespace()?;
        self.store
            .write(namespace, &record.key, record.value.clone())?;
        debug!(key = %record.key, %namespace, "Applied replicated record");
        Ok(namespace)
    }

    /// `GET /read/{db_type}/{key}`, gated on an idle leader.
    pub async fn read(&self, namespace: Namespace, key: &str) -> Result<Value, NodeError> {
        self.wait_for_idle_leader("Read").await?;
        self.store
            .read(namespace, key)?
            .ok_or_else(|| NodeError::NotFound {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })
    }

    /// `POST /authenticate_user`, gated on an idle leader.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<(), NodeError> {
        self.wait_for_idle_leader("Authentication").await?;
        if self
            .store
            .authenticate(&credentials.username, &credentials.password)?
        {
            Ok(())
        } else {
            Err(NodeError::InvalidCredentials)
        }
    }

    async fn forward(&self, leader: &str, route: ForwardRoute, body: Bytes) -> Result<Forwarded, NodeError> {
        let path = route.path();
        let timeout = self.node.timing().peer_call_timeout();
        match self.node.transport().forward(leader, route, body, timeout).await {
            Ok(response) => {
                debug!(%leader, path, status = response.status, "Forwarded request to leader");
                counter!(FORWARDED_REQUESTS_TOTAL, "route" => path, "outcome" => "ok").increment(1);
                Ok(response)
            }
            Err(source) => {
                counter!(FORWARDED_REQUESTS_TOTAL, "route" => path, "outcome" => "error").increment(1);
                Err(NodeError::LeaderUnreachable {
                    leader: leader.to_string(),
                    source,
                })
            }
        }
    }

    /// Poll the leader's lock status until it reports idle, or give up after
    /// the read budget.  When this node is the leader its own flag is read
    /// directly.
    async fn wait_for_idle_leader(&self, operation: &'static str) -> Result<(), NodeError> {
        let node = &self.node;
        let policy = RetryPolicy {
            budget: node.timing().read_budget(),
            pacing: node.timing().read_pacing(),
        };

        retry_until(policy, move || async move {
            let leader = node.current_leader().await;
            let busy = if leader == node.address() {
                Ok(node.write_in_progress())
            } else {
                node.transport()
                    .lock_status(&leader, node.timing().peer_call_timeout())
                    .await
                    .map(|status| status.write_in_progress)
            };
            match busy {
                Ok(false) => {
                    counter!(READ_GATE_POLLS_TOTAL, "outcome" => "idle").increment(1);
                    Attempt::Ready(())
                }
                Ok(true) => {
                    debug!(%leader, "Leader write in progress, waiting");
                    counter!(READ_GATE_POLLS_TOTAL, "outcome" => "busy").increment(1);
                    Attempt::Retry
                }
                Err(e) => {
                    info!(%leader, "Failed to contact leader: {e}");
                    counter!(READ_GATE_POLLS_TOTAL, "outcome" => "unreachable").increment(1);
                    Attempt::Retry
                }
            }
        })
        .await
        .map_err(|_| NodeError::TimedOut { operation })
    }
}
