//! Shutdown signal wiring.

use super::CancellationToken;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Waits for SIGINT or SIGTERM (Ctrl-C only on non-unix platforms).
///
/// Returns the name of the signal received.
pub async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(err) = res {
                            error!("failed to listen for Ctrl-C: {err}");
                        }
                        "SIGINT"
                    },
                    _ = term.recv() => "SIGTERM",
                }
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                wait_for_ctrl_c().await
            }
        }
    }
    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await
    }
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl-C: {err}");
        // Without a handler there is nothing to wait for.
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

/// Spawns a task that cancels `token` when a shutdown signal arrives.
pub fn cancel_on_shutdown_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        warn!(signal, "operator interrupt, aborting pipeline");
        token.cancel(format!("received {signal}"));
    })
}
