//! Graceful shutdown.

use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// Waits for SIGINT/SIGTERM and cancels `token` once received. Intended to be
/// spawned as its own task from `main`.
pub async fn wait_for_shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler")
        .recv()
        .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    token.cancel();
}

/// Awaits `drain` up to [`DRAIN_DEADLINE`], logging if it didn't finish in time.
pub async fn drain_with_deadline(name: &str, drain: impl std::future::Future<Output = ()>) {
    if tokio::time::timeout(DRAIN_DEADLINE, drain).await.is_err() {
        tracing::warn!(loop_name = name, "did not drain within deadline, exiting anyway");
    }
}
