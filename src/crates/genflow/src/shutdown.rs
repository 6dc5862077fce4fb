//! Graceful shutdown handling
//!
//! SIGINT/SIGTERM cancel the shared [`CancellationToken`]. A workflow run
//! holding a child of that token ends with a `Cancelled` outcome instead of
//! being killed mid-write.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown coordinator for graceful termination
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("shutdown_requested", &self.token.is_cancelled())
            .finish()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for one run; cancelled when shutdown is requested.
    pub fn run_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Request shutdown
    pub fn request_shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("Shutdown requested");
            self.token.cancel();
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for shutdown signal
    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// Install signal handlers for SIGINT and SIGTERM
    ///
    /// This spawns a background task that listens for signals and calls
    /// request_shutdown(). If a handler cannot be installed the task logs a
    /// warning and exits; runs then simply cannot be interrupted gracefully.
    pub fn install_signal_handlers(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();

        tokio::spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};

                let (mut sigint, mut sigterm) =
                    match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                        (Err(e), _) | (_, Err(e)) => {
                            warn!(error = %e, "Failed to install signal handlers");
                            return;
                        }
                    };

                tokio::select! {
                    _ = sigint.recv() => {
                        warn!("Received SIGINT, cancelling run...");
                        coordinator.request_shutdown();
                    }
                    _ = sigterm.recv() => {
                        warn!("Received SIGTERM, cancelling run...");
                        coordinator.request_shutdown();
                    }
                    _ = coordinator.wait_for_shutdown() => {}
                }
            }

            #[cfg(not(unix))]
            {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => match result {
                        Ok(()) => {
                            warn!("Received Ctrl+C, cancelling run...");
                            coordinator.request_shutdown();
                        }
                        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
                    },
                    _ = coordinator.wait_for_shutdown() => {}
                }
            }
        })
    }
}
