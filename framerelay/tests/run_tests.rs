//! Tests for the server and client runners

use framerelay::*;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_listening(port: u16) {
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server did not start on port {}", port);
}

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("framerelay-{}-{}", name, std::process::id()))
}

fn png_count(dir: &PathBuf) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
                .count()
        })
        .unwrap_or(0)
}

fn local_server_config(port: u16, transform: TransformKind) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        transform,
        ice_servers: Vec::new(),
        loopback_candidates: true,
        ..ServerConfig::default()
    }
}

// ============================================================================
// SERVER RUNNER
// ============================================================================

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let port = free_port().await;
    let (stop, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(run_server(
        local_server_config(port, TransformKind::Edges),
        async move {
            let _ = stop_rx.await;
        },
    ));

    wait_listening(port).await;
    stop.send(()).unwrap();
    tokio_test::assert_ok!(task.await.unwrap());
}

#[tokio::test]
async fn test_server_rejects_invalid_config() {
    let config = ServerConfig {
        stats_interval_secs: 0,
        ..ServerConfig::default()
    };
    let err = tokio_test::assert_err!(run_server(config, async {}).await);
    assert!(matches!(err, RelayError::Configuration { .. }));
}

// ============================================================================
// CLIENT RUNNER
// ============================================================================

#[tokio::test]
async fn test_client_fails_without_server() {
    let config = ClientConfig {
        server: "127.0.0.1".to_string(),
        port: free_port().await,
        test_pattern: true,
        width: 64,
        height: 48,
        ice_servers: Vec::new(),
        loopback_candidates: true,
        ..ClientConfig::default()
    };
    let err = run_client(config, std::future::pending()).await.unwrap_err();
    assert!(err.is_signaling());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_client_saves_relayed_frames() {
    let port = free_port().await;
    let (stop, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(run_server(
        local_server_config(port, TransformKind::Flip),
        async move {
            let _ = stop_rx.await;
        },
    ));
    wait_listening(port).await;

    let dir = scratch_dir("run-client");
    let _ = std::fs::remove_dir_all(&dir);
    let config = ClientConfig {
        server: "127.0.0.1".to_string(),
        port,
        test_pattern: true,
        width: 64,
        height: 48,
        snapshot_dir: Some(dir.clone()),
        snapshot_every: 1,
        ice_servers: Vec::new(),
        loopback_candidates: true,
        ..ClientConfig::default()
    };

    let watched = dir.clone();
    let state = run_client(config, async move {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
        while png_count(&watched) < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(state, ConnectionState::Closed);
    assert!(png_count(&dir) >= 2, "no frames were relayed back");

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
    std::fs::remove_dir_all(&dir).unwrap();
}
