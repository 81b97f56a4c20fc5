//! Evidence responders started when emergency mode activates.
//!
//! Each responder acquires its device, produces at most one evidence event
//! and releases the device before returning.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::capability::{Camera, Facing, Microphone};
use crate::event::EventData;
use crate::monitor::{Reporter, StopHandle};
use crate::session::Input;
use crate::state::Snapshot;

/// Time the camera is given to adjust exposure before the frame is grabbed.
pub const CAMERA_SETTLE: Duration = Duration::from_millis(300);

/// Why a recording stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cap,
    StreamEnded,
    EpisodeEnded,
    Shutdown,
}

/// Record audio until the cap, the end of the stream, or the end of the episode.
pub(crate) async fn record_audio(
    microphone: Arc<dyn Microphone>,
    cap: Duration,
    frame_interval: Duration,
    episode: u32,
    mut snapshots: watch::Receiver<Arc<Snapshot>>,
    reporter: Reporter,
    stop: StopHandle,
) {
    let mut stream = match microphone.request_audio_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            reporter.failed(&e).await;
            return;
        }
    };
    if !reporter.running().await {
        return;
    }

    let started = Instant::now();
    let deadline = started + cap;
    let mut frames = interval(frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(episode, ?cap, "Audio recording started");

    let reason = loop {
        tokio::select! {
            () = stop.stopped() => break StopReason::Shutdown,
            () = tokio::time::sleep_until(deadline) => break StopReason::Cap,
            ended = episode_ended(&mut snapshots, episode) => {
                break if ended { StopReason::EpisodeEnded } else { StopReason::Shutdown };
            }
            _ = frames.tick() => {
                if stream.next_frame().await.is_none() {
                    break StopReason::StreamEnded;
                }
            }
        }
    };
    let elapsed = started.elapsed().min(cap);
    stream.release();
    debug!(?reason, ?elapsed, "Audio recording stopped");

    if reason == StopReason::Shutdown {
        return;
    }
    reporter.send(Input::Evidence(EventData::audio(elapsed))).await;
    reporter.idle().await;
}

/// Capture one photo from the environment-facing camera.
pub(crate) async fn capture_photo(camera: Arc<dyn Camera>, reporter: Reporter, stop: StopHandle) {
    let mut stream = match camera.request_video_stream(Facing::Environment).await {
        Ok(stream) => stream,
        Err(e) => {
            reporter.failed(&e).await;
            return;
        }
    };
    if !reporter.running().await {
        return;
    }

    tokio::select! {
        () = stop.stopped() => return,
        () = tokio::time::sleep(CAMERA_SETTLE) => {}
    }

    let grabbed = stream.grab_frame().await;
    stream.release();

    match grabbed {
        Ok(photo) => {
            info!(width = photo.width, height = photo.height, "Photo captured");
            reporter
                .send(Input::Evidence(EventData::Photo {
                    width: photo.width,
                    height: photo.height,
                }))
                .await;
            reporter.idle().await;
        }
        Err(e) => {
            reporter.failed(&e).await;
        }
    }
}

/// `true` once `episode` is over, `false` if the session went away.
async fn episode_ended(snapshots: &mut watch::Receiver<Arc<Snapshot>>, episode: u32) -> bool {
    snapshots
        .wait_for(|s| !s.state.active || s.state.episode != episode)
        .await
        .is_ok()
}
