//! sb-server: the local HTTP bridge.
//!
//! # Modules
//!
//! - [`source`] - Per-session streaming source: manifest, playlists, segments, assets
//! - [`registry`] - Live sessions with idle expiry
//! - [`playlist`] - Fetch-once playlist rewriting
//! - [`assets`] - Static page and player script
//! - [`router`] / [`routes`] - Axum surface
//! - [`error`] - Error-to-response mapping

pub mod assets;
pub mod context;
pub mod error;
pub mod middleware;
pub mod playlist;
pub mod registry;
pub mod router;
pub mod routes;
pub mod source;

use std::net::SocketAddr;

use sb_core::config::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

pub use registry::SessionRegistry;
pub use source::StreamingSource;

/// Build the substrate, bind the configured address and serve until a
/// shutdown signal arrives.
pub async fn start(config: Config) -> sb_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let substrate = sb_fetch::build_substrate(&config.substrate)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| sb_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| sb_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    let ctx = AppContext::new(config, substrate);
    let cancel = CancellationToken::new();
    serve(listener, ctx, cancel).await
}

/// Serve the bridge on an already bound listener.
///
/// Returns after `cancel` fires or a shutdown signal arrives. All sessions
/// are shut down before returning, so no transfer files outlive the server.
pub async fn serve(
    listener: TcpListener,
    ctx: AppContext,
    cancel: CancellationToken,
) -> sb_core::Result<()> {
    let cleanup_handle = registry::start_cleanup_task(
        ctx.registry.clone(),
        ctx.config.bridge.cleanup_interval_secs,
        cancel.clone(),
    );

    let app = router::build_router(ctx.clone());
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Bridge listening on {addr}");
    }

    // Sessions are shut down as soon as the signal arrives: pending segment
    // requests resolve empty, which lets in-flight connections drain.
    let registry = ctx.registry.clone();
    let signal = shutdown_signal(cancel.clone());
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            registry.shutdown_all();
        })
        .await;

    cancel.cancel();
    ctx.registry.shutdown_all();
    let _ = cleanup_handle.await;

    result?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
