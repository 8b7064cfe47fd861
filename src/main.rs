//! Sandbox executor entry point.

#![forbid(unsafe_code)]

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sandbox_executor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sandbox-executor v{}", env!("CARGO_PKG_VERSION"));

    sandbox_executor::server::run().await
}
