//! Server-wide stop signal.
//!
//! One [`CancellationToken`] is shared by the accept loop, every session and
//! every session's heartbeat. Cancelling it closes all connections, which in
//! turn releases every subscription scope.

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Grace period used by [`ShutdownCoordinator::drain`] when none is given.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(10);

/// Owns the server's stop token.
#[derive(Default)]
pub struct ShutdownCoordinator {
    stop: CancellationToken,
}

impl ShutdownCoordinator {
    /// A coordinator that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Child handle for a task that must stop with the server.
    pub fn token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Trigger the stop. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        if !self.stop.is_cancelled() {
            info!("server stop requested");
        }
        self.stop.cancel();
    }

    /// `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_shutting_down(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Resolve when Ctrl-C arrives (triggering the stop) or when someone
    /// else triggers it first.
    pub async fn shutdown_on_ctrl_c(&self) {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => self.shutdown(),
                Err(e) => warn!(error = %e, "ctrl-c handler unavailable"),
            },
            () = self.stop.cancelled() => {}
        }
    }

    /// Trigger the stop and give `tasks` up to `grace` to finish.
    ///
    /// Tasks still running afterwards are aborted. Returns how many were.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, grace: Option<Duration>) -> usize {
        let grace = grace.unwrap_or(DEFAULT_DRAIN_GRACE);
        self.shutdown();

        let aborters: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        let total = aborters.len();
        if tokio::time::timeout(grace, join_all(tasks)).await.is_ok() {
            info!(total, "server tasks drained");
            return 0;
        }

        let stuck = aborters.iter().filter(|a| !a.is_finished()).count();
        warn!(
            stuck,
            grace_ms = grace.as_millis() as u64,
            "aborting server tasks after grace period"
        );
        for aborter in &aborters {
            aborter.abort();
        }
        stuck
    }
}
