//! Signal source monitors.
//!
//! Each monitor is a task that acquires one device, turns its output into
//! session inputs, and releases the device when it stops. A monitor that
//! hits a capability error reports its source as unavailable and exits;
//! nothing is retried until the operator re-enables the source.

pub mod location;
pub mod sound;
pub mod voice;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::capability::CapabilityError;
use crate::session::Input;
use crate::state::{SourceKind, SourceStatus};

/// A cloneable signal telling a task to stop.
///
/// A child handle also stops when its parent does, so stopping the session
/// stops every monitor while each monitor can still be stopped on its own.
#[derive(Debug, Clone)]
pub struct StopHandle {
    own: Arc<watch::Sender<bool>>,
    parent: Option<Arc<watch::Sender<bool>>>,
}

impl StopHandle {
    /// Create a new, unsignalled handle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            own: Arc::new(watch::channel(false).0),
            parent: None,
        }
    }

    /// Create a handle that also stops when `self` stops.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            own: Arc::new(watch::channel(false).0),
            parent: Some(Arc::clone(&self.own)),
        }
    }

    /// Signal the task to stop.
    pub fn stop(&self) {
        self.own.send_replace(true);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        *self.own.borrow() || self.parent.as_ref().is_some_and(|p| *p.borrow())
    }

    /// Wait until the stop signal has been sent.
    pub async fn stopped(&self) {
        match &self.parent {
            Some(parent) => {
                tokio::select! {
                    () = wait_for_stop(self.own.subscribe()) => {}
                    () = wait_for_stop(parent.subscribe()) => {}
                }
            }
            None => wait_for_stop(self.own.subscribe()).await,
        }
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_stop(mut rx: watch::Receiver<bool>) {
    // The sender lives as long as the handle, so this only returns on stop
    let _ = rx.wait_for(|stopped| *stopped).await;
}

/// Stop handles of the running monitors, one per source.
#[derive(Debug, Default)]
pub struct MonitorSet {
    handles: BTreeMap<SourceKind, StopHandle>,
}

impl MonitorSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle` for `kind`, stopping whatever ran for it before.
    pub fn replace(&mut self, kind: SourceKind, handle: StopHandle) {
        if let Some(previous) = self.handles.insert(kind, handle) {
            debug!(source = %kind, "Stopping previous monitor");
            previous.stop();
        }
    }

    /// Stop every monitor.
    pub fn stop_all(&self) {
        for handle in self.handles.values() {
            handle.stop();
        }
    }

    /// Number of tracked monitors.
    #[must_use]
    pub fn count(&self) -> usize {
        self.handles.len()
    }

    /// Check if any monitors have not been signalled to stop.
    #[must_use]
    pub fn any_running(&self) -> bool {
        self.handles.values().any(|h| !h.should_stop())
    }
}

/// Where a monitor sends its inputs.
#[derive(Debug, Clone)]
pub(crate) struct Reporter {
    kind: SourceKind,
    tx: mpsc::Sender<Input>,
}

impl Reporter {
    pub(crate) fn new(kind: SourceKind, tx: mpsc::Sender<Input>) -> Self {
        Self { kind, tx }
    }

    /// Send an input; `false` once the session has gone away.
    pub(crate) async fn send(&self, input: Input) -> bool {
        self.tx.send(input).await.is_ok()
    }

    pub(crate) async fn status(&self, status: SourceStatus) -> bool {
        self.send(Input::Status(self.kind, status)).await
    }

    pub(crate) async fn running(&self) -> bool {
        self.status(SourceStatus::Running).await
    }

    pub(crate) async fn idle(&self) -> bool {
        self.status(SourceStatus::Idle).await
    }

    /// Report a capability failure, marking the source unavailable.
    pub(crate) async fn failed(&self, err: &CapabilityError) -> bool {
        tracing::warn!(source = %self.kind, error = %err, "Source unavailable");
        self.status(SourceStatus::unavailable(err)).await
    }
}
