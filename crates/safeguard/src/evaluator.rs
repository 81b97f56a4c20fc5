//! The emergency trigger evaluator.
//!
//! Three independent signal streams feed one evaluation point:
//!
//! - **manual**: the emergency button was pressed;
//! - **voice**: a speech transcript update contains a trigger phrase;
//! - **sound**: a sound level reading exceeds the configured threshold.
//!
//! The first qualifying signal while inactive flips the state to active and
//! appends exactly one `activation` event. Everything that arrives while
//! active is absorbed without effect until the operator cancels.
//!
//! The evaluator is plain synchronous state; the session owns it from a
//! single task, so the "already active?" check and the transition cannot
//! interleave.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::capability::Haptics;
use crate::config::TriggerConfig;
use crate::error::Result;
use crate::event::{ActivationSource, EmergencyEvent, EventData, EventLog};
use crate::keywords::KeywordMatcher;
use crate::sound::SoundSample;
use crate::state::EmergencyState;

/// Vibration pattern played on activation (on/off durations in ms).
pub const ACTIVATION_PATTERN: [u32; 5] = [100, 50, 200, 50, 300];

/// A signal delivered to the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The emergency button was pressed.
    Manual,
    /// The speech transcript changed.
    Transcript(String),
    /// A sound level reading in `[0, 100]`.
    SoundLevel(f64),
}

impl Signal {
    /// The activation source this signal would be recorded under.
    #[must_use]
    pub fn source(&self) -> ActivationSource {
        match self {
            Self::Manual => ActivationSource::Manual,
            Self::Transcript(_) => ActivationSource::Voice,
            Self::SoundLevel(_) => ActivationSource::Sound,
        }
    }
}

/// Outcome of evaluating one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// This signal started a new episode.
    Activated(ActivationSource),
    /// The signal qualified, but an episode is already running.
    AlreadyActive,
    /// The signal did not qualify (no phrase, level below threshold).
    NoTrigger,
}

impl Decision {
    /// Check if this decision started an episode.
    #[must_use]
    pub fn is_activation(&self) -> bool {
        matches!(self, Self::Activated(_))
    }
}

/// Decides when the session enters emergency mode.
#[derive(Debug)]
pub struct TriggerEvaluator {
    matcher: KeywordMatcher,
    threshold: f64,
    haptics: Option<Arc<dyn Haptics>>,
    state: EmergencyState,
    log: EventLog,
    sound: SoundSample,
}

impl TriggerEvaluator {
    /// Create an inactive evaluator.
    ///
    /// # Errors
    ///
    /// Returns an error if the trigger phrases cannot be compiled.
    pub fn new(config: &TriggerConfig) -> Result<Self> {
        Ok(Self {
            matcher: KeywordMatcher::new(&config.keywords)?,
            threshold: config.sound_threshold,
            haptics: None,
            state: EmergencyState::inactive(),
            log: EventLog::new(),
            sound: SoundSample::default(),
        })
    }

    /// Play haptic feedback through `haptics` on activation.
    #[must_use]
    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = Some(haptics);
        self
    }

    /// Current emergency state.
    #[must_use]
    pub fn state(&self) -> EmergencyState {
        self.state
    }

    /// Check if emergency mode is on.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// The session event log, newest first.
    #[must_use]
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// The latest sound reading.
    #[must_use]
    pub fn sound(&self) -> SoundSample {
        self.sound
    }

    /// The trigger phrase matcher.
    #[must_use]
    pub fn matcher(&self) -> &KeywordMatcher {
        &self.matcher
    }

    /// The sound threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Evaluate one signal.
    pub fn signal(&mut self, signal: &Signal) -> Decision {
        match signal {
            Signal::Manual => self.manual(),
            Signal::Transcript(text) => self.transcript(text),
            Signal::SoundLevel(level) => self.sound_level(*level),
        }
    }

    /// The emergency button was pressed.
    pub fn manual(&mut self) -> Decision {
        self.activate(ActivationSource::Manual)
    }

    /// A new speech transcript arrived.
    pub fn transcript(&mut self, text: &str) -> Decision {
        let Some(phrase) = self.matcher.find(text) else {
            trace!(transcript = %text, "No trigger phrase in transcript");
            return Decision::NoTrigger;
        };
        debug!(phrase, transcript = %text, "Trigger phrase heard");
        self.activate(ActivationSource::Voice)
    }

    /// A new sound level reading arrived.
    ///
    /// The reading is retained for telemetry whether or not it triggers.
    pub fn sound_level(&mut self, level: f64) -> Decision {
        self.sound = SoundSample::new(level, self.threshold);
        if !self.sound.is_emergency {
            return Decision::NoTrigger;
        }
        debug!(level = self.sound.level, threshold = self.threshold, "Sound level above threshold");
        self.activate(ActivationSource::Sound)
    }

    /// Operator-confirmed cancel.
    ///
    /// Returns `true` if an episode was ended; cancelling while inactive is a
    /// no-op.
    pub fn cancel(&mut self) -> bool {
        if !self.state.active {
            debug!("Cancel ignored, emergency mode is not active");
            return false;
        }
        self.state.active = false;
        self.log.record(EventData::Deactivation);
        info!(episode = self.state.episode, "Emergency deactivated");
        true
    }

    /// Append an evidence event (location, audio, photo, contact).
    ///
    /// Activation and deactivation events can only come from the evaluator's
    /// own transitions; passing them here is refused.
    pub fn record_evidence(&mut self, data: EventData) -> Option<&EmergencyEvent> {
        if matches!(data, EventData::Activation { .. } | EventData::Deactivation) {
            warn!(kind = %data.kind(), "Refusing to record a state transition as evidence");
            return None;
        }
        Some(self.log.record(data))
    }

    fn activate(&mut self, source: ActivationSource) -> Decision {
        if self.state.active {
            trace!(%source, "Already active, signal absorbed");
            return Decision::AlreadyActive;
        }

        self.state = EmergencyState {
            active: true,
            source: Some(source),
            episode: self.state.episode + 1,
        };
        self.log.record(EventData::Activation { source });
        info!(%source, episode = self.state.episode, "Emergency activated");

        if let Some(haptics) = &self.haptics {
            if let Err(e) = haptics.vibrate(&ACTIVATION_PATTERN) {
                debug!(error = %e, "Haptic feedback unavailable");
            }
        }

        Decision::Activated(source)
    }
}
