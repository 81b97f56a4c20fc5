//! Emergency state and the snapshots broadcast to subscribers.
//!
//! Display consumers never share mutable state with the evaluator. Each
//! change produces a new [`Snapshot`], published over a `tokio::sync::watch`
//! channel, so every consumer renders from one consistent value.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityError;
use crate::event::{ActivationSource, Coordinates, EmergencyEvent};
use crate::sound::SoundSample;

/// Whether the session is in emergency mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmergencyState {
    /// Emergency mode is on.
    pub active: bool,
    /// The signal behind the most recent activation.
    pub source: Option<ActivationSource>,
    /// Number of activations since the session started.
    pub episode: u32,
}

impl EmergencyState {
    /// The initial, inactive state.
    #[must_use]
    pub const fn inactive() -> Self {
        Self {
            active: false,
            source: None,
            episode: 0,
        }
    }

    /// Check if emergency mode is on.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }
}

impl std::fmt::Display for EmergencyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.active, self.source) {
            (true, Some(source)) => write!(f, "active ({source})"),
            (true, None) => write!(f, "active"),
            (false, _) => write!(f, "inactive"),
        }
    }
}

/// A signal source or evidence collaborator whose availability is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Sound level monitor.
    Sound,
    /// Voice command listener.
    Voice,
    /// Location watcher.
    Location,
    /// Audio recorder.
    Recorder,
    /// Photo capture.
    Camera,
}

impl SourceKind {
    /// Every tracked source.
    pub const ALL: [SourceKind; 5] = [
        Self::Sound,
        Self::Voice,
        Self::Location,
        Self::Recorder,
        Self::Camera,
    ];
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sound => write!(f, "sound"),
            Self::Voice => write!(f, "voice"),
            Self::Location => write!(f, "location"),
            Self::Recorder => write!(f, "recorder"),
            Self::Camera => write!(f, "camera"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sound" => Ok(Self::Sound),
            "voice" => Ok(Self::Voice),
            "location" => Ok(Self::Location),
            "recorder" => Ok(Self::Recorder),
            "camera" => Ok(Self::Camera),
            other => Err(crate::error::Error::UnknownSource(other.to_string())),
        }
    }
}

/// Why a source went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The user refused the capability.
    PermissionDenied,
    /// The environment lacks the capability.
    Unsupported,
    /// The device failed.
    DeviceError,
}

impl From<&CapabilityError> for UnavailableReason {
    fn from(err: &CapabilityError) -> Self {
        match err {
            CapabilityError::PermissionDenied { .. } => Self::PermissionDenied,
            CapabilityError::Unsupported { .. } => Self::Unsupported,
            CapabilityError::TransientDevice { .. } => Self::DeviceError,
        }
    }
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::DeviceError => write!(f, "device error"),
        }
    }
}

/// Availability of a source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// Not started.
    #[default]
    Idle,
    /// Running normally.
    Running,
    /// Failed; stays down until re-enabled.
    Unavailable {
        /// What kind of failure took the source down.
        reason: UnavailableReason,
        /// Short user-facing explanation.
        message: String,
    },
}

impl SourceStatus {
    /// Status for a failed capability.
    #[must_use]
    pub fn unavailable(err: &CapabilityError) -> Self {
        Self::Unavailable {
            reason: err.into(),
            message: err.user_message(),
        }
    }

    /// Check if the source is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if the source has failed.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Unavailable { message, .. } => write!(f, "unavailable: {message}"),
        }
    }
}

/// One consistent view of the session.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Emergency state.
    pub state: EmergencyState,
    /// Event log, newest first.
    pub events: Arc<VecDeque<EmergencyEvent>>,
    /// Latest sound reading.
    pub sound: SoundSample,
    /// Latest known position, possibly the fallback.
    pub location: Option<Coordinates>,
    /// Availability per source.
    pub sources: BTreeMap<SourceKind, SourceStatus>,
    /// When the state or position last changed.
    pub last_update: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// The snapshot a session starts with.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            state: EmergencyState::inactive(),
            events: Arc::default(),
            sound: SoundSample::default(),
            location: None,
            sources: SourceKind::ALL
                .into_iter()
                .map(|kind| (kind, SourceStatus::Idle))
                .collect(),
            last_update: None,
        }
    }

    /// Status of one source.
    #[must_use]
    pub fn source(&self, kind: SourceKind) -> &SourceStatus {
        self.sources.get(&kind).unwrap_or(&SourceStatus::Idle)
    }

    /// User-facing messages of every unavailable source.
    pub fn messages(&self) -> impl Iterator<Item = (SourceKind, &str)> {
        self.sources.iter().filter_map(|(kind, status)| match status {
            SourceStatus::Unavailable { message, .. } => Some((*kind, message.as_str())),
            _ => None,
        })
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::initial()
    }
}
