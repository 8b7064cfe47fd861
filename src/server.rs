//! Server assembly and runtime.
//!
//! Runs two listening sockets in one address space: the authenticated HTTP
//! control plane and the raw TCP proxy data plane. Shutdown is signal
//! driven, with a bounded drain for in-flight work.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Extension;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api;
use crate::config::load_config;
use crate::middleware::auth::SharedSecret;
use crate::process::ProcessManager;
use crate::proxy::{self, ProxyController};

/// Bound on draining in-flight work at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the server
pub async fn run() -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;

    let manager = Arc::new(ProcessManager::new());
    let proxy_controller = Arc::new(ProxyController::new());
    let shutdown = CancellationToken::new();

    // Data plane: raw TCP proxy with a runtime-rebindable target.
    let proxy_listener = TcpListener::bind(("0.0.0.0", config.proxy_port))
        .await
        .context("Failed to bind TCP proxy port")?;
    info!(port = config.proxy_port, "TCP proxy listening");
    let proxy_task = tokio::spawn(proxy::run_listener(
        proxy_listener,
        proxy_controller.clone(),
        shutdown.child_token(),
    ));

    // Control plane: authenticated HTTP API.
    let app = api::api_router()
        .layer(Extension(SharedSecret::new(config.sandbox_secret)))
        .layer(Extension(manager))
        .layer(Extension(proxy_controller));

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .context("Failed to bind HTTP port")?;
    info!(port = config.port, "HTTP server listening");

    let http_shutdown = shutdown.child_token();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(http_shutdown.cancelled_owned())
            .await
    });

    shutdown_signal().await;
    info!("Shutting down servers...");
    shutdown.cancel();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, server_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(error))) => warn!(%error, "HTTP server error during shutdown"),
        Ok(Err(error)) => warn!(%error, "HTTP server task failed"),
        Err(_) => warn!("HTTP drain deadline exceeded"),
    }

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, proxy_task).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(%error, "TCP proxy task failed"),
        Err(_) => warn!("TCP proxy drain deadline exceeded"),
    }

    info!("Servers stopped");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
