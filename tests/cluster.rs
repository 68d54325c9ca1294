//! Multi-node tests over real HTTP on ephemeral ports.

use std::sync::Arc;
use std::time::Duration;

use peerstore::clock::ManualClock;
use peerstore::cluster::HttpTransport;
use peerstore::config::Config;
use peerstore::store::Namespace;
use peerstore::AppState;
use serde_json::{json, Value};

struct TestNode {
    state: Arc<AppState>,
    clock: Arc<ManualClock>,
    address: String,
    _dir: tempfile::TempDir,
}

impl TestNode {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }
}

/// Start one node per entry of `uptimes` (seconds of simulated uptime) and
/// wire every node to every other.  Nothing is bootstrapped yet.
async fn start_cluster(uptimes: &[u64]) -> Vec<TestNode> {
    let mut listeners = Vec::new();
    for _ in uptimes {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listeners.push(listener);
    }
    let addresses: Vec<String> = listeners
        .iter()
        .map(|l| l.local_addr().unwrap().to_string())
        .collect();

    let mut nodes = Vec::new();
    for ((listener, address), uptime) in listeners.into_iter().zip(&addresses).zip(uptimes) {
        nodes.push(start_node(listener, address, addresses.clone(), *uptime).await);
    }
    nodes
}

async fn start_node(
    listener: tokio::net::TcpListener,
    address: &str,
    peers: Vec<String>,
    uptime: u64,
) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.node.address = address.to_string();
    config.cluster.peers = peers;
    config.storage.data_dir = dir.path().to_string_lossy().into_owned();
    config.observability.metrics = false;
    config.timing.election_poll_timeout_ms = 1_000;
    config.timing.broadcast_timeout_ms = 1_000;
    config.timing.peer_call_timeout_ms = 1_000;
    config.timing.sync_timeout_ms = 1_000;
    config.timing.read_budget_ms = 2_000;
    config.timing.read_pacing_ms = 50;
    config.timing.startup_backoff_ms = 100;

    let clock = Arc::new(ManualClock::new());
    let transport = Arc::new(HttpTransport::new().unwrap());
    let state = Arc::new(AppState::new(config, transport, clock.clone()).unwrap());
    // Uptime counts from node creation, so age the node afterwards.
    clock.advance(Duration::from_secs(uptime));

    let app = peerstore::server::app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestNode {
        state,
        clock,
        address: address.to_string(),
        _dir: dir,
    }
}

async fn bootstrap_all(nodes: &[TestNode]) -> Vec<String> {
    let mut tasks = Vec::new();
    for node in nodes {
        let coordinator = node.state.coordinator.clone();
        tasks.push(tokio::spawn(async move { coordinator.bootstrap().await }));
    }
    let mut leaders = Vec::new();
    for task in tasks {
        leaders.push(task.await.unwrap());
    }
    leaders
}

/// Poll a GET endpoint until it answers 200 or two seconds pass.
async fn get_eventually(client: &reqwest::Client, url: &str) -> (u16, Value) {
    let mut last = (0, Value::Null);
    for _ in 0..40 {
        let resp = client.get(url).send().await.unwrap();
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if status == 200 {
            return (status, body);
        }
        last = (status, body);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    last
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_election_endpoint_reports_simulated_uptime() {
    let nodes = start_cluster(&[100, 50, 0]).await;
    let client = reqwest::Client::new();

    let mut reported = Vec::new();
    for node in &nodes {
        let body: Value = client
            .get(node.url("/election"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["ip"], node.address);
        reported.push(body["uptime"].as_f64().unwrap());
    }
    assert_eq!(reported, vec![100.0, 50.0, 0.0]);

    nodes[2].clock.advance(Duration::from_secs(7));
    assert_eq!(nodes[2].state.node.uptime_secs(), 7.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cluster_elects_longest_running_node() {
    let nodes = start_cluster(&[100, 50, 0]).await;

    let leaders = bootstrap_all(&nodes).await;

    for leader in &leaders {
        assert_eq!(leader, &nodes[0].address);
    }
    assert!(nodes[0].state.node.is_leader());
    assert!(!nodes[2].state.node.is_leader());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_uptime_outranks_address() {
    let nodes = start_cluster(&[0, 50, 100]).await;

    let leaders = bootstrap_all(&nodes).await;

    for leader in &leaders {
        assert_eq!(leader, &nodes[2].address);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_equal_uptime_goes_to_greater_port() {
    let nodes = start_cluster(&[30, 30]).await;

    let leaders = bootstrap_all(&nodes).await;

    let expected = nodes
        .iter()
        .max_by_key(|n| n.address.parse::<std::net::SocketAddr>().unwrap().port())
        .unwrap();
    for leader in &leaders {
        assert_eq!(leader, &expected.address);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_write_through_follower_reaches_every_replica() {
    let nodes = start_cluster(&[100, 50, 0]).await;
    bootstrap_all(&nodes).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(nodes[2].url("/write"))
        .json(&json!({"key": "a1", "value": {"highest_bid": 40}, "db_type": "bids"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Write successful to bids database");

    // Applied by the leader before it answered.
    assert_eq!(
        nodes[0].state.store.read(Namespace::Bids, "a1").unwrap(),
        Some(json!({"highest_bid": 40}))
    );

    for node in &nodes[1..] {
        let (status, body) = get_eventually(&client, &node.url("/read/bids/a1")).await;
        assert_eq!(status, 200);
        assert_eq!(body["value"], json!({"highest_bid": 40}));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_user_rejected_through_any_node() {
    let nodes = start_cluster(&[100, 50, 0]).await;
    bootstrap_all(&nodes).await;
    let client = reqwest::Client::new();
    let alice = json!({"username": "alice", "password": "pw"});

    let first = client
        .post(nodes[1].url("/add_user"))
        .json(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 200);

    let second = client
        .post(nodes[2].url("/add_user"))
        .json(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 400);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"], "User alice already exists.");

    let mut authenticated = false;
    for _ in 0..40 {
        let resp = client
            .post(nodes[2].url("/authenticate_user"))
            .json(&alice)
            .send()
            .await
            .unwrap();
        if resp.status().as_u16() == 200 {
            authenticated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(authenticated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_node_resynchronizes_from_leader() {
    let nodes = start_cluster(&[100, 50]).await;
    bootstrap_all(&nodes).await;
    nodes[0]
        .state
        .store
        .write(Namespace::Bids, "a1", json!({"item": "lamp"}))
        .unwrap();
    nodes[0].state.store.add_user("bob", "pw").unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let late = start_node(listener, &address, vec![nodes[0].address.clone()], 0).await;
    late.state
        .store
        .write(Namespace::Bids, "a1", json!({"item": "stale"}))
        .unwrap();
    late.state
        .store
        .write(Namespace::Bids, "only-here", json!(1))
        .unwrap();

    let leader = late.state.coordinator.bootstrap().await;

    assert_eq!(leader, nodes[0].address);
    let snap = late.state.store.snapshot().unwrap();
    assert_eq!(snap.bids["a1"], json!({"item": "lamp"}));
    assert_eq!(snap.bids["only-here"], json!(1));
    assert!(late.state.store.authenticate("bob", "pw").unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lone_node_elects_itself() {
    let nodes = start_cluster(&[0]).await;

    let leaders = bootstrap_all(&nodes).await;

    assert_eq!(leaders, vec![nodes[0].address.clone()]);
    let client = reqwest::Client::new();
    let resp = client.get(nodes[0].url("/liveness")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "endpoint is live");
    assert_eq!(body["uptime"], json!(0.0));
}
