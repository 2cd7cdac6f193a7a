//! Bounded shutdown of a running engine

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// What happened to in-flight work when the engine stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Messages whose processing ran to the end (acknowledged or not)
    pub completed: usize,
    /// Messages cancelled by the drain timeout, left unacknowledged
    pub cancelled: usize,
    /// Worker tasks that panicked outside reconciliation, left unacknowledged
    #[serde(default)]
    pub panicked: usize,
}

/// Handle to a running engine
///
/// Returned by [`ReconcileEngine::start`](super::ReconcileEngine::start).
/// Dropping it detaches the engine, which then runs until the transport
/// closes.
#[derive(Debug)]
pub struct DrainController {
    stop_tx: oneshot::Sender<Duration>,
    handle: JoinHandle<DrainReport>,
}

impl DrainController {
    pub(crate) fn new(stop_tx: oneshot::Sender<Duration>, handle: JoinHandle<DrainReport>) -> Self {
        Self { stop_tx, handle }
    }

    /// Stop pulling messages and drain in-flight work
    ///
    /// Waits up to `timeout` for running tasks, then cancels the rest. Their
    /// messages stay unacknowledged for the transport to redeliver. Returns
    /// shortly after `timeout` at the latest.
    pub async fn shutdown(self, timeout: Duration) -> Result<DrainReport> {
        // The engine may already have stopped on its own; the report is still
        // waiting in the join handle.
        let _ = self.stop_tx.send(timeout);
        join(self.handle).await
    }

    /// Wait for the engine to stop on its own (transport closed)
    pub async fn wait(self) -> Result<DrainReport> {
        let Self { stop_tx, handle } = self;
        let report = join(handle).await;
        drop(stop_tx);
        report
    }

    /// Whether the engine has already stopped
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn join(handle: JoinHandle<DrainReport>) -> Result<DrainReport> {
    handle
        .await
        .map_err(|e| Error::Other(format!("Engine task failed: {}", e)))
}
