//! Server protocol integration tests against an in-process fake server
//!
//! - get-colonies / update / update_all exchanges
//! - closed stream and silent server handling
//! - connection failure notices
//! - composite mirroring into the local files

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use colony_sync::codec::json;
use colony_sync::config::ServerConfig;
use colony_sync::net::ConnectionState;
use colony_sync::provider::local::{CSV_FILE, JSON_FILE};
use colony_sync::{
    Colony, ColonyListener, ColonyProvider, ColonySet, CompositeProvider, LocalStoreProvider,
    NetworkProvider, SyncError, TaskPool,
};
use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Clone, Copy, PartialEq)]
enum Behavior {
    Answer,
    /// Read the request, never reply
    Silent,
    /// Read the request, then hang up
    HangUp,
}

struct FakeServer {
    addr: SocketAddr,
    colonies: Arc<Mutex<ColonySet>>,
    received: Arc<Mutex<Vec<Value>>>,
}

impl FakeServer {
    async fn start(colonies: ColonySet, behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let colonies = Arc::new(Mutex::new(colonies));
        let received = Arc::new(Mutex::new(Vec::new()));

        let (store, log) = (colonies.clone(), received.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (store, log) = (store.clone(), log.clone());
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut lines = BufReader::new(read).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let request: Value = serde_json::from_str(&line).unwrap();
                        log.lock().push(request.clone());
                        match behavior {
                            Behavior::HangUp => return,
                            Behavior::Silent => continue,
                            Behavior::Answer => {}
                        }

                        let reply = match request["request"].as_str() {
                            Some("get-colonies") => json::encode_envelope(&store.lock()).to_string(),
                            Some("update") => {
                                store.lock().insert(json::decode(&request["colony"]).unwrap());
                                "success".to_string()
                            }
                            Some("update_all") => {
                                let elements = request["colonies"].as_array().unwrap();
                                *store.lock() = json::decode_all(elements);
                                "success".to_string()
                            }
                            _ => "unknown request".to_string(),
                        };
                        if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        Self {
            addr,
            colonies,
            received,
        }
    }

    fn config(&self) -> ServerConfig {
        test_config(self.addr)
    }

    fn requests(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .map(|request| request["request"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

fn test_config(addr: SocketAddr) -> ServerConfig {
    ServerConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        connect_timeout_ms: 500,
        request_timeout_ms: 200,
        backoff_initial_ms: 10,
        backoff_max_ms: 40,
        max_connect_attempts: Some(2),
        request_attempts: 2,
        ..ServerConfig::default()
    }
}

fn server_colonies() -> ColonySet {
    let mut visited = Colony::new(1, 10.0, 20.0, true);
    visited.set_visited(true);
    vec![visited, Colony::new(2, 30.0, 40.0, false)]
        .into_iter()
        .collect()
}

#[derive(Default)]
struct NoticeLog {
    notices: Mutex<Vec<String>>,
}

impl ColonyListener for NoticeLog {
    fn colonies_changed(&self, _colonies: &Arc<ColonySet>) {}

    fn notice(&self, message: &str) {
        self.notices.lock().push(message.to_string());
    }
}

// =============================================================================
// NetworkProvider
// =============================================================================

#[tokio::test]
async fn test_refresh_publishes_server_collection() {
    let server = FakeServer::start(server_colonies(), Behavior::Answer).await;
    let pool = TaskPool::current(4).unwrap();
    let provider = NetworkProvider::new(server.config(), pool.clone());
    assert_eq!(provider.connection_state(), ConnectionState::Disconnected);

    let fetched = provider.refresh().await.unwrap();

    assert_eq!(fetched.len(), 2);
    assert!(provider.colonies().get(1).unwrap().is_visited());
    assert_eq!(provider.connection_state(), ConnectionState::Connected);
    assert_eq!(server.requests(), vec!["get-colonies"]);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_connect_fetches_in_background() {
    let server = FakeServer::start(server_colonies(), Behavior::Answer).await;
    let pool = TaskPool::current(4).unwrap();
    let provider = NetworkProvider::connect(server.config(), pool.clone());

    pool.drain().await;
    assert_eq!(provider.colonies().len(), 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_submit_colony_returns_acknowledgement() {
    let server = FakeServer::start(ColonySet::new(), Behavior::Answer).await;
    let pool = TaskPool::current(4).unwrap();
    let provider = NetworkProvider::new(server.config(), pool.clone());

    let ack = provider.submit_colony(&Colony::new(8, 1.0, 2.0, true)).await.unwrap();
    assert_eq!(ack, "success");

    let received = server.received.lock().clone();
    assert_eq!(received[0]["request"], "update");
    assert_eq!(received[0]["colony"]["id"], 8);
    assert!(server.colonies.lock().contains(8));
    pool.shutdown().await;
}

#[tokio::test]
async fn test_requests_share_one_session_in_order() {
    let server = FakeServer::start(server_colonies(), Behavior::Answer).await;
    let pool = TaskPool::current(4).unwrap();
    let provider = NetworkProvider::new(server.config(), pool.clone());

    let colony = Colony::new(3, 0.0, 0.0, true);
    let (a, b, c) = tokio::join!(
        provider.refresh(),
        provider.submit_colony(&colony),
        provider.submit_all(),
    );
    assert!(a.is_ok());
    assert_eq!(b.unwrap(), "success");
    assert_eq!(c.unwrap(), "success");
    assert_eq!(server.requests().len(), 3);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_update_colony_is_visible_and_submitted() {
    let server = FakeServer::start(server_colonies(), Behavior::Answer).await;
    let pool = TaskPool::current(4).unwrap();
    let provider = NetworkProvider::new(server.config(), pool.clone());

    provider.update_colony(Colony::new(5, 1.0, 1.0, true));
    assert!(provider.colonies().contains(5));

    pool.drain().await;
    assert!(server.colonies.lock().contains(5));
    pool.shutdown().await;
}

#[tokio::test]
async fn test_closed_stream_is_not_waited_on() {
    let server = FakeServer::start(server_colonies(), Behavior::HangUp).await;
    let pool = TaskPool::current(4).unwrap();
    let provider = NetworkProvider::new(server.config(), pool.clone());

    let result = provider.refresh().await;

    assert!(matches!(result, Err(SyncError::ConnectionClosed)));
    assert_eq!(provider.connection_state(), ConnectionState::Disconnected);
    // one retry on a fresh connection
    assert_eq!(server.requests().len(), 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let server = FakeServer::start(server_colonies(), Behavior::Silent).await;
    let pool = TaskPool::current(4).unwrap();
    let provider = NetworkProvider::new(server.config(), pool.clone());

    let result = provider.refresh().await;

    assert!(matches!(result, Err(SyncError::Timeout(_))));
    assert!(provider.colonies().is_empty());
    pool.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_server_gives_up_with_notices() {
    // grab a free port, then close it
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let pool = TaskPool::current(4).unwrap();
    let provider = NetworkProvider::new(test_config(addr), pool.clone());
    let log = Arc::new(NoticeLog::default());
    provider.hub().add_listener(log.clone());

    let result = provider.refresh().await;

    assert!(matches!(result, Err(SyncError::Connection(_))));
    let notices = log.notices.lock().clone();
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.starts_with("Connection error:")));
    pool.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_cancels_reconnect() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let config = ServerConfig {
        max_connect_attempts: None,
        backoff_initial_ms: 60_000,
        backoff_max_ms: 60_000,
        ..test_config(addr)
    };
    let pool = TaskPool::current(4).unwrap();
    let provider = NetworkProvider::new(config, pool.clone());

    let refresh = tokio::spawn({
        let provider = provider.clone();
        async move { provider.refresh().await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    pool.shutdown().await;

    let result = tokio::time::timeout(std::time::Duration::from_secs(5), refresh)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled)));
}

// =============================================================================
// CompositeProvider
// =============================================================================

#[tokio::test]
async fn test_composite_mirrors_server_into_local_files() {
    let server = FakeServer::start(server_colonies(), Behavior::Answer).await;
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CSV_FILE), "1,10,20,A,,\n99,5,5, ,,\n").unwrap();

    let pool = TaskPool::current(4).unwrap();
    let local = LocalStoreProvider::open(dir.path(), pool.clone());
    let network = NetworkProvider::new(server.config(), pool.clone());
    let composite = CompositeProvider::new(local, network);

    composite.network().refresh().await.unwrap();

    let colonies = composite.colonies();
    let ids: Vec<i32> = colonies.ids().collect();
    assert_eq!(ids, vec![1, 99, 2]);
    // server copy wins
    assert!(colonies.get(1).unwrap().is_visited());

    pool.drain().await;
    let text = fs::read_to_string(dir.path().join(JSON_FILE)).unwrap();
    assert_eq!(json::decode_envelope(&text).unwrap().len(), 3);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_composite_update_colony_reaches_both_copies() {
    let server = FakeServer::start(server_colonies(), Behavior::Answer).await;
    let dir = TempDir::new().unwrap();

    let pool = TaskPool::current(4).unwrap();
    let local = LocalStoreProvider::open(dir.path(), pool.clone());
    let network = NetworkProvider::new(server.config(), pool.clone());
    let composite = CompositeProvider::new(local, network);
    composite.network().refresh().await.unwrap();

    let mut colony = composite.colonies().get(2).unwrap().clone();
    colony.set_active(true);
    composite.update_colony(colony);

    assert!(composite.colonies().get(2).unwrap().is_active());
    pool.drain().await;
    assert!(server.colonies.lock().get(2).unwrap().is_active());

    let text = fs::read_to_string(dir.path().join(JSON_FILE)).unwrap();
    assert!(json::decode_envelope(&text).unwrap().get(2).unwrap().is_active());
    pool.shutdown().await;
}

#[tokio::test]
async fn test_composite_update_colonies_pushes_merged_collection() {
    let server = FakeServer::start(server_colonies(), Behavior::Answer).await;
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CSV_FILE), "77,1,1,A,,\n").unwrap();

    let pool = TaskPool::current(4).unwrap();
    let local = LocalStoreProvider::open(dir.path(), pool.clone());
    let network = NetworkProvider::new(server.config(), pool.clone());
    let composite = CompositeProvider::new(local, network);
    composite.network().refresh().await.unwrap();

    composite.update_colonies();
    pool.drain().await;

    let on_server = server.colonies.lock().clone();
    assert_eq!(on_server.len(), 3);
    assert!(on_server.contains(77));
    assert_eq!(server.requests(), vec!["get-colonies", "update_all"]);
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_composite_keeps_latest_update_with_slow_listener() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    let server = FakeServer::start(ColonySet::new(), Behavior::Answer).await;
    let dir = TempDir::new().unwrap();

    let pool = TaskPool::current(4).unwrap();
    let local = LocalStoreProvider::open(dir.path(), pool.clone());
    let network = NetworkProvider::new(server.config(), pool.clone());

    // Registered ahead of the mirror; stalls on its first delivery only
    let first = Arc::new(AtomicBool::new(true));
    let stall = first.clone();
    network.hub().add_listener(Arc::new(move |_: &Arc<ColonySet>| {
        if stall.swap(false, Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(200));
        }
    }));

    let composite = Arc::new(CompositeProvider::new(local, network));

    let older = {
        let composite = composite.clone();
        std::thread::spawn(move || composite.update_colony(Colony::new(1, 1.0, 0.0, true)))
    };
    std::thread::sleep(Duration::from_millis(50));
    let newer = {
        let composite = composite.clone();
        std::thread::spawn(move || composite.update_colony(Colony::new(1, 2.0, 0.0, true)))
    };
    older.join().unwrap();
    newer.join().unwrap();

    assert_eq!(composite.network().colonies().get(1).unwrap().x(), 2.0);
    assert_eq!(composite.colonies().get(1).unwrap().x(), 2.0);

    pool.drain().await;
    let text = fs::read_to_string(dir.path().join(JSON_FILE)).unwrap();
    assert_eq!(json::decode_envelope(&text).unwrap().get(1).unwrap().x(), 2.0);
    pool.shutdown().await;
}
