//! HTTP serving surface (axum).

pub mod routes;

use anyhow::{Context, Result};
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

use crate::domain::models::ServerConfig;
use crate::services::ProxyFacet;

pub use routes::{router, ApiError, AppState};

/// Serve the proxy until `shutdown` resolves.
pub async fn serve(
    config: &ServerConfig,
    facet: ProxyFacet,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    info!(
        addr = %listener.local_addr()?,
        remote_url = %facet.remote_url(),
        "mirror proxy listening"
    );

    axum::serve(listener, router(AppState { facet }))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    info!("mirror proxy stopped");
    Ok(())
}
