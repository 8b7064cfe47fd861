//! TCP proxy behavior through a live listener.

use std::sync::Arc;
use std::time::Duration;

use sandbox_executor::proxy::{run_listener, ProxyController};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// One-connection upstream that echoes four bytes back.
async fn spawn_echo_upstream() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        conn.write_all(&buf).await.unwrap();
    });
    port
}

async fn spawn_proxy(controller: Arc<ProxyController>) -> (u16, CancellationToken, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(run_listener(listener, controller, shutdown.clone()));
    (port, shutdown, task)
}

#[tokio::test]
async fn forwards_bytes_to_bound_target() {
    let controller = Arc::new(ProxyController::new());
    let (proxy_port, shutdown, task) = spawn_proxy(controller.clone()).await;

    let upstream_port = spawn_echo_upstream().await;
    controller.bind(upstream_port.to_string()).unwrap();

    let mut conn = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
    conn.write_all(b"ping").await.unwrap();

    let mut buf = [0u8; 4];
    timeout(WAIT_LIMIT, conn.read_exact(&mut buf))
        .await
        .expect("proxied response should arrive")
        .unwrap();
    assert_eq!(&buf, b"ping");

    drop(conn);
    shutdown.cancel();
    timeout(WAIT_LIMIT, task)
        .await
        .expect("listener should stop after cancellation")
        .unwrap();
}

#[tokio::test]
async fn unbound_connections_close_without_data() {
    let controller = Arc::new(ProxyController::new());
    let (proxy_port, shutdown, task) = spawn_proxy(controller).await;

    let mut conn = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
    conn.write_all(b"x").await.unwrap();

    // The proxy tolerates the tiny write, then closes with no payload.
    let mut buf = [0u8; 16];
    let n = timeout(WAIT_LIMIT, conn.read(&mut buf))
        .await
        .expect("connection should close promptly")
        .unwrap();
    assert_eq!(n, 0);

    shutdown.cancel();
    timeout(WAIT_LIMIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn rebinding_changes_the_forward_target() {
    let controller = Arc::new(ProxyController::new());
    let (proxy_port, shutdown, task) = spawn_proxy(controller.clone()).await;

    let first = spawn_echo_upstream().await;
    controller.bind(first.to_string()).unwrap();

    // Rebinding requires an unbind first.
    let second = spawn_echo_upstream().await;
    let conflict = controller.bind(second.to_string()).unwrap_err();
    assert_eq!(conflict.current_port, first.to_string());

    controller.unbind();
    controller.bind(second.to_string()).unwrap();

    let mut conn = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
    conn.write_all(b"pong").await.unwrap();

    let mut buf = [0u8; 4];
    timeout(WAIT_LIMIT, conn.read_exact(&mut buf))
        .await
        .expect("proxied response should arrive")
        .unwrap();
    assert_eq!(&buf, b"pong");

    drop(conn);
    shutdown.cancel();
    timeout(WAIT_LIMIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn unreachable_target_closes_the_client_connection() {
    let controller = Arc::new(ProxyController::new());
    let (proxy_port, shutdown, task) = spawn_proxy(controller.clone()).await;

    // Nothing listens on this target.
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = unused.local_addr().unwrap().port();
    drop(unused);
    controller.bind(dead_port.to_string()).unwrap();

    let mut conn = TcpStream::connect(("127.0.0.1", proxy_port)).await.unwrap();
    let mut buf = [0u8; 1];
    let n = timeout(WAIT_LIMIT, conn.read(&mut buf))
        .await
        .expect("connection should close promptly")
        .unwrap();
    assert_eq!(n, 0);

    shutdown.cancel();
    timeout(WAIT_LIMIT, task).await.unwrap().unwrap();
}
