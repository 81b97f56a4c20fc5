//! Location watcher.
//!
//! Forwards every position fix to the session. The session decides whether
//! a fix becomes a `location` event (only while emergency mode is active).
//! When no fix can be obtained the session falls back to the configured
//! default position so the display still has something to show.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::{Reporter, StopHandle};
use crate::capability::Geolocation;
use crate::session::Input;

/// Run the location watcher until stopped, denied, or the watch ends.
pub(crate) async fn run(geolocation: Arc<dyn Geolocation>, reporter: Reporter, stop: StopHandle) {
    let mut watch = match geolocation.watch_position().await {
        Ok(watch) => watch,
        Err(e) => {
            reporter.failed(&e).await;
            reporter.send(Input::PositionFallback).await;
            return;
        }
    };
    if !reporter.running().await {
        return;
    }
    debug!("Location watcher started");

    loop {
        tokio::select! {
            () = stop.stopped() => break,
            update = watch.next_update() => match update {
                Some(Ok(coordinates)) => {
                    trace!(%coordinates, "Position fix");
                    if !reporter.send(Input::Position(coordinates)).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    reporter.failed(&e).await;
                    if !reporter.send(Input::PositionFallback).await {
                        break;
                    }
                    if e.is_permission_error() {
                        break;
                    }
                    warn!(error = %e, "Position fix failed, still watching");
                }
                None => {
                    debug!("Position watch ended");
                    reporter.idle().await;
                    break;
                }
            }
        }
    }

    watch.release();
    debug!("Location watcher stopped");
}
