//! Runtime-rebindable TCP proxy.
//!
//! A single external listener forwards each accepted connection to
//! `localhost:<target_port>`. The target is held by a [`ProxyController`]
//! and mutated through the control plane; connection handlers take a
//! one-shot snapshot of the target at accept time and never observe later
//! changes. With no target bound, connections are held briefly for a tiny
//! probe read (so TCP health checks succeed) and closed without data.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long an unbound connection is held open for a probe read.
const PROBE_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Returned when `bind` is attempted while a target is already set.
#[derive(Debug, Error)]
#[error("Port already bound")]
pub struct AlreadyBound {
    /// The currently bound target port.
    pub current_port: String,
}

/// Holds the proxy's current forward target.
///
/// Empty/non-empty transitions are serialized by the write lock; readers
/// take a snapshot. The listener itself is independent of the target: it is
/// started once at boot and only the target mutates afterwards.
#[derive(Debug, Default)]
pub struct ProxyController {
    target_port: RwLock<Option<String>>,
}

impl ProxyController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the proxy to a target port.
    ///
    /// Fails with the currently bound port if one is already set. The target
    /// is not checked for reachability.
    pub fn bind(&self, port: impl Into<String>) -> Result<(), AlreadyBound> {
        let mut target = self.target_port.write().unwrap();
        match target.as_ref() {
            Some(current) => Err(AlreadyBound {
                current_port: current.clone(),
            }),
            None => {
                *target = Some(port.into());
                Ok(())
            }
        }
    }

    /// Clear the target. Idempotent.
    pub fn unbind(&self) {
        self.target_port.write().unwrap().take();
    }

    /// Snapshot of the current target, if any.
    #[must_use]
    pub fn target(&self) -> Option<String> {
        self.target_port.read().unwrap().clone()
    }
}

/// Accept loop for the proxy listener.
///
/// Runs until `shutdown` is cancelled, then closes the listening socket and
/// waits for the outstanding connection handlers to finish.
pub async fn run_listener(
    listener: TcpListener,
    controller: Arc<ProxyController>,
    shutdown: CancellationToken,
) {
    let mut handlers = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    let controller = controller.clone();
                    handlers.spawn(async move {
                        handle_connection(conn, peer, &controller).await;
                    });
                }
                Err(error) => {
                    warn!(%error, "proxy accept failed");
                }
            },
        }
    }

    // Stop accepting before draining the in-flight connections.
    drop(listener);
    while handlers.join_next().await.is_some() {}
    info!("TCP proxy stopped");
}

async fn handle_connection(mut conn: TcpStream, peer: SocketAddr, controller: &ProxyController) {
    let Some(port) = controller.target() else {
        let mut buf = [0u8; 1];
        let _ = timeout(PROBE_READ_TIMEOUT, conn.read(&mut buf)).await;
        return;
    };

    let mut upstream = match TcpStream::connect(format!("localhost:{port}")).await {
        Ok(upstream) => upstream,
        Err(error) => {
            warn!(%peer, %port, %error, "failed to connect to target port");
            return;
        }
    };

    debug!(%peer, %port, "forwarding connection");

    let (mut conn_rd, mut conn_wr) = conn.split();
    let (mut upstream_rd, mut upstream_wr) = upstream.split();

    // Whichever direction finishes first tears the pipe down; both ends
    // close when the handler returns.
    tokio::select! {
        _ = tokio::io::copy(&mut conn_rd, &mut upstream_wr) => {}
        _ = tokio::io::copy(&mut upstream_rd, &mut conn_wr) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_sets_target() {
        let controller = ProxyController::new();
        assert!(controller.target().is_none());

        controller.bind("9000").unwrap();
        assert_eq!(controller.target().as_deref(), Some("9000"));
    }

    #[test]
    fn test_second_bind_conflicts_with_current_port() {
        let controller = ProxyController::new();
        controller.bind("9000").unwrap();

        let err = controller.bind("9001").unwrap_err();
        assert_eq!(err.current_port, "9000");
        assert_eq!(err.to_string(), "Port already bound");

        // The first binding survives the failed attempt.
        assert_eq!(controller.target().as_deref(), Some("9000"));
    }

    #[test]
    fn test_unbind_is_idempotent_and_allows_rebind() {
        let controller = ProxyController::new();
        controller.bind("9000").unwrap();

        controller.unbind();
        controller.unbind();
        assert!(controller.target().is_none());

        controller.bind("9001").unwrap();
        assert_eq!(controller.target().as_deref(), Some("9001"));
    }
}
