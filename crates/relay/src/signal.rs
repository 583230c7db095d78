//! Shutdown signal listening.

use std::future::Future;
use std::io;

use tokio_util::sync::CancellationToken;

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
pub async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    cancel_on(shutdown, termination_signal()).await;
}

/// Cancel `shutdown` once `listener` reports a signal.
///
/// A listener that could not be installed never fires: the relay keeps
/// running instead of stopping right after startup.
pub async fn cancel_on<F>(shutdown: CancellationToken, listener: F)
where
    F: Future<Output = io::Result<()>>,
{
    match listener.await {
        Ok(()) => {
            tracing::info!("Received shutdown signal, stopping after the current tick...");
            shutdown.cancel();
        }
        Err(e) => {
            tracing::error!(error = %e, "Cannot listen for shutdown signals");
            std::future::pending::<()>().await;
        }
    }
}

async fn termination_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM, using Ctrl+C only");
                return tokio::signal::ctrl_c().await;
            }
        };

        let ctrl_c_failed = tokio::select! {
            res = tokio::signal::ctrl_c() => res.err(),
            _ = sigterm.recv() => None,
        };
        if let Some(e) = ctrl_c_failed {
            tracing::warn!(error = %e, "Cannot listen for Ctrl+C, using SIGTERM only");
            sigterm.recv().await;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
