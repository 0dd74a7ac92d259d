//! containerops allocd
//!
//! Serves the allocation tables of one state directory over HTTP.

use anyhow::Result;
use containerops_alloc::TableStore;
use containerops_allocd::{api, config, state::AppState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to ALLOCD_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting containerops allocd");
    info!(
        listen_addr = %config.listen_addr,
        state_dir = %config.state_dir.display(),
        lock_timeout_ms = config.allocator.lock_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let store = TableStore::new(config.networks_dir(), config.allocator);
    let app = api::create_router(AppState::new(store));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    info!("allocd stopped");
    Ok(())
}
