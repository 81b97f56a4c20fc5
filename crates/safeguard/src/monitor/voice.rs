//! Voice command listener.
//!
//! Listens only while emergency mode is inactive. The first transcript
//! update containing a trigger phrase is forwarded to the evaluator and the
//! recognizer is dropped; listening resumes once that episode has been
//! cancelled.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::{Reporter, StopHandle};
use crate::capability::{Acquired, CapabilityError, SpeechRecognizer, TranscriptStream};
use crate::evaluator::Signal;
use crate::keywords::KeywordMatcher;
use crate::session::Input;
use crate::state::{EmergencyState, Snapshot};

/// Why a listening stretch ended.
#[derive(Debug)]
enum Listen {
    /// A trigger phrase was heard and forwarded while `episode` was the
    /// latest published episode.
    Triggered {
        /// Episode number before the forwarded signal.
        episode: u32,
    },
    /// Emergency mode became active from another source.
    Paused,
    /// The recognizer finished on its own.
    Ended,
    /// The recognizer failed permanently.
    Failed(CapabilityError),
    /// The listener was told to stop.
    Stopped,
}

/// Run the voice listener until stopped, failed, or the recognizer ends.
pub(crate) async fn run(
    speech: Arc<dyn SpeechRecognizer>,
    matcher: KeywordMatcher,
    mut snapshots: watch::Receiver<Arc<Snapshot>>,
    reporter: Reporter,
    stop: StopHandle,
) {
    loop {
        tokio::select! {
            () = stop.stopped() => return,
            state = wait_for_state(&mut snapshots, |s| !s.active) => if state.is_none() { return },
        }

        let mut recognizer = match speech.start_recognition().await {
            Ok(recognizer) => recognizer,
            Err(e) => {
                reporter.failed(&e).await;
                return;
            }
        };
        if !reporter.running().await {
            return;
        }
        debug!("Voice listener started");

        let outcome = listen(&mut recognizer, &matcher, &mut snapshots, &reporter, &stop).await;
        drop(recognizer);
        debug!(?outcome, "Voice listener paused");

        match outcome {
            Listen::Triggered { episode } => {
                reporter.idle().await;
                // An activation cancelled within one batch is never published as active
                tokio::select! {
                    () = stop.stopped() => return,
                    state = wait_for_state(&mut snapshots, |s| s.active || s.episode > episode) => {
                        if state.is_none() {
                            return;
                        }
                    }
                }
            }
            Listen::Paused => {
                if !reporter.idle().await {
                    return;
                }
            }
            Listen::Ended => {
                reporter.idle().await;
                return;
            }
            Listen::Failed(e) => {
                reporter.failed(&e).await;
                return;
            }
            Listen::Stopped => return,
        }
    }
}

async fn listen(
    recognizer: &mut Acquired<dyn TranscriptStream>,
    matcher: &KeywordMatcher,
    snapshots: &mut watch::Receiver<Arc<Snapshot>>,
    reporter: &Reporter,
    stop: &StopHandle,
) -> Listen {
    loop {
        tokio::select! {
            () = stop.stopped() => return Listen::Stopped,
            state = wait_for_state(snapshots, |s| s.active) => {
                return if state.is_some() { Listen::Paused } else { Listen::Stopped };
            }
            update = recognizer.next_transcript() => match update {
                Some(Ok(text)) => {
                    let Some(phrase) = matcher.find(&text) else {
                        trace!(transcript = %text, "Transcript without trigger phrase");
                        continue;
                    };
                    info!(phrase, "Voice command detected");
                    let episode = snapshots.borrow().state.episode;
                    if !reporter.send(Input::Signal(Signal::Transcript(text.clone()))).await {
                        return Listen::Stopped;
                    }
                    return Listen::Triggered { episode };
                }
                Some(Err(e @ CapabilityError::TransientDevice { .. })) => {
                    warn!(error = %e, "Speech recognition hiccup, still listening");
                }
                Some(Err(e)) => return Listen::Failed(e),
                None => return Listen::Ended,
            }
        }
    }
}

/// Wait for a published state matching `predicate`; `None` once the session is gone.
async fn wait_for_state<F>(
    snapshots: &mut watch::Receiver<Arc<Snapshot>>,
    mut predicate: F,
) -> Option<EmergencyState>
where
    F: FnMut(&EmergencyState) -> bool,
{
    snapshots
        .wait_for(|snapshot| predicate(&snapshot.state))
        .await
        .ok()
        .map(|snapshot| snapshot.state)
}
