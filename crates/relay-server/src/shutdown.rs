//! Process-wide shutdown signal.
//!
//! One [`CancellationToken`] is shared by the HTTP listener and every session.
//! Cancelling it stops accepting connections and ends each session's read
//! loop, which removes its participant from the directory.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owner of the shutdown token.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator with an uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle on the shared token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and wait for `tasks`, giving up after `timeout`.
    ///
    /// Tasks still running at the deadline are aborted. Returns `true` when
    /// every task finished on its own.
    pub async fn graceful_shutdown(&self, tasks: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
        self.shutdown();
        info!(
            tasks = tasks.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "draining"
        );

        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(tasks))
            .await
            .is_ok()
        {
            info!("drain complete");
            return true;
        }

        warn!(?timeout, "drain timed out, aborting remaining tasks");
        for handle in aborts {
            handle.abort();
        }
        false
    }
}
