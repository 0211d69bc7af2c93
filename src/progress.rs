//! Progress reporting
//!
//! Progress is a last-write-wins snapshot: a `tokio::sync::watch` channel holds the
//! latest [`ExportProgress`], and an optional callback sees every update.

use crate::types::ExportProgress;
use std::sync::Arc;
use tokio::sync::watch;

/// Callback invoked with every progress snapshot
pub type ProgressCallback = Arc<dyn Fn(&ExportProgress) + Send + Sync>;

/// Publisher side of the progress channel
#[derive(Clone)]
pub struct ProgressReporter {
    tx: watch::Sender<ExportProgress>,
    callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("current", &*self.tx.borrow())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    /// Create a reporter with an empty snapshot
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ExportProgress::default());
        Self { tx, callback: None }
    }

    /// Also invoke `callback` on every update
    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Subscribe to progress snapshots
    pub fn subscribe(&self) -> watch::Receiver<ExportProgress> {
        self.tx.subscribe()
    }

    /// Latest snapshot
    pub fn current(&self) -> ExportProgress {
        self.tx.borrow().clone()
    }

    /// Modify the snapshot in place and publish it
    pub fn update(&self, modify: impl FnOnce(&mut ExportProgress)) {
        self.tx.send_modify(modify);
        if let Some(callback) = &self.callback {
            let snapshot = self.tx.borrow().clone();
            callback(&snapshot);
        }
    }

    /// Replace only the status line
    pub fn status(&self, status: impl Into<String>) {
        let status = status.into();
        self.update(|p| p.status = status);
    }
}
