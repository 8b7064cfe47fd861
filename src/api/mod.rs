//! HTTP API for the sandbox executor.
//!
//! Route groups:
//! - Health probe
//! - One-shot command execution (buffered and streaming)
//! - Filesystem operations
//! - Background process supervision
//! - TCP proxy control

pub mod commands;
pub mod files;
pub mod health;
pub mod processes;
pub mod proxy;

use axum::Router;

pub use commands::commands_routes;
pub use files::files_routes;
pub use health::health_routes;
pub use processes::processes_routes;
pub use proxy::proxy_routes;

/// Create the API router with all endpoints
pub fn api_router() -> Router {
    Router::new()
        .merge(health_routes())
        .merge(commands_routes())
        .merge(files_routes())
        .merge(processes_routes())
        .merge(proxy_routes())
}
