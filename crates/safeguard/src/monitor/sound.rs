//! Sound level monitor.
//!
//! Samples the microphone once per frame, converts each frame to a level
//! and forwards it to the evaluator. Sampling continues while emergency
//! mode is active so the level meter keeps updating.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

use super::{Reporter, StopHandle};
use crate::capability::Microphone;
use crate::evaluator::Signal;
use crate::session::Input;
use crate::sound::process_level;

/// Run the sound monitor until stopped or until the stream ends.
pub(crate) async fn run(
    microphone: Arc<dyn Microphone>,
    frame_interval: Duration,
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
    debug!(?frame_interval, "Sound monitor started");

    let mut frames = interval(frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = stop.stopped() => break,
            _ = frames.tick() => {
                let Some(bins) = stream.next_frame().await else {
                    debug!("Audio stream ended");
                    reporter.idle().await;
                    break;
                };
                let level = process_level(&bins);
                trace!(level, "Sound frame");
                if !reporter.send(Input::Signal(Signal::SoundLevel(level))).await {
                    break;
                }
            }
        }
    }

    stream.release();
    debug!("Sound monitor stopped");
}
