//! Emergency events and the session event log.
//!
//! Every notable occurrence during a session (activation, evidence capture,
//! contact alerts, deactivation) becomes an immutable [`EmergencyEvent`]
//! appended to the newest-first [`EventLog`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Why the system entered emergency mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationSource {
    /// The emergency button was pressed.
    Manual,
    /// A sound reading crossed the threshold.
    Sound,
    /// A trigger phrase was heard.
    Voice,
}

impl std::fmt::Display for ActivationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Sound => write!(f, "sound"),
            Self::Voice => write!(f, "voice"),
        }
    }
}

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Coordinates {
    /// Create a new coordinate pair.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check that both components are finite and in range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

/// The kind of an emergency event, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Emergency mode was entered.
    Activation,
    /// A position update arrived while active.
    Location,
    /// An audio recording completed.
    Audio,
    /// A photo was captured.
    Photo,
    /// Contacts were alerted.
    Contact,
    /// Emergency mode was cancelled.
    Deactivation,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Activation => write!(f, "activation"),
            Self::Location => write!(f, "location"),
            Self::Audio => write!(f, "audio"),
            Self::Photo => write!(f, "photo"),
            Self::Contact => write!(f, "contact"),
            Self::Deactivation => write!(f, "deactivation"),
        }
    }
}

/// Kind-specific event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventData {
    /// Emergency mode was entered because of `source`.
    Activation {
        /// The signal that caused the activation.
        source: ActivationSource,
    },
    /// Position update received during an episode.
    Location {
        /// Where the device was.
        coordinates: Coordinates,
    },
    /// An audio recording completed.
    Audio {
        /// Length of the recording in milliseconds.
        duration_ms: u64,
    },
    /// A photo was captured.
    Photo {
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
    },
    /// Contacts were alerted.
    Contact {
        /// How many contacts received the alert.
        contact_count: usize,
    },
    /// Emergency mode was cancelled by the operator.
    Deactivation,
}

impl EventData {
    /// The payload-free kind of this data.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Activation { .. } => EventKind::Activation,
            Self::Location { .. } => EventKind::Location,
            Self::Audio { .. } => EventKind::Audio,
            Self::Photo { .. } => EventKind::Photo,
            Self::Contact { .. } => EventKind::Contact,
            Self::Deactivation => EventKind::Deactivation,
        }
    }

    /// Audio data for a recording of the given length.
    #[must_use]
    pub fn audio(duration: Duration) -> Self {
        Self::Audio {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Opaque identifier of an event, unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// The identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Length of the hex identifier handed out for each event.
const EVENT_ID_LEN: usize = 12;

/// Derives opaque event ids from a per-session seed and a sequence number.
#[derive(Debug, Clone)]
pub struct EventIdGenerator {
    seed: [u8; 16],
    next: u64,
}

impl EventIdGenerator {
    /// Create a generator seeded from the current time and process.
    #[must_use]
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        let mut seed = [0u8; 16];
        seed[..12].copy_from_slice(&nanos.to_le_bytes()[..12]);
        seed[12..].copy_from_slice(&std::process::id().to_le_bytes());
        Self::with_seed(seed)
    }

    /// Create a generator with a fixed seed.
    #[must_use]
    pub fn with_seed(seed: [u8; 16]) -> Self {
        Self { seed, next: 0 }
    }

    /// Hand out the next identifier.
    pub fn next_id(&mut self) -> EventId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed);
        hasher.update(&self.next.to_le_bytes());
        self.next += 1;

        let hex = hasher.finalize().to_hex();
        EventId(hex[..EVENT_ID_LEN].to_string())
    }
}

impl Default for EventIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A single entry of the emergency timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyEvent {
    /// Unique identifier within the session.
    pub id: EventId,

    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,

    /// What happened.
    #[serde(flatten)]
    pub data: EventData,
}

impl EmergencyEvent {
    /// The payload-free kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.data.kind()
    }

    /// Human-readable timeline label.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.data {
            EventData::Activation { source } => format!("Emergency activated ({source})"),
            EventData::Location { coordinates } => format!("Location updated: {coordinates}"),
            EventData::Audio { .. } => "Audio recording captured".to_string(),
            EventData::Photo { .. } => "Photo evidence captured".to_string(),
            EventData::Contact { contact_count } => {
                format!("Alert sent to {contact_count} contacts")
            }
            EventData::Deactivation => "Emergency deactivated".to_string(),
        }
    }
}

/// Format a timestamp the way the timeline displays it (`3:04:05 PM`).
#[must_use]
pub fn format_timestamp<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.format("%-I:%M:%S %p").to_string()
}

/// Format a timestamp in the local time zone.
#[must_use]
pub fn format_local(timestamp: &DateTime<Utc>) -> String {
    format_timestamp(&timestamp.with_timezone(&Local))
}

/// Newest-first, append-only log of emergency events.
///
/// Entries are shared behind an `Arc` so snapshots can hold the log without
/// copying it; appending after a snapshot was taken clones the backing
/// storage once.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<VecDeque<EmergencyEvent>>,
    ids: EventIdGenerator,
}

impl EventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty log with a custom id generator.
    #[must_use]
    pub fn with_ids(ids: EventIdGenerator) -> Self {
        Self {
            entries: Arc::default(),
            ids,
        }
    }

    /// Append a new event stamped with the current time.
    pub fn record(&mut self, data: EventData) -> &EmergencyEvent {
        let event = EmergencyEvent {
            id: self.ids.next_id(),
            timestamp: Utc::now(),
            data,
        };
        let entries = Arc::make_mut(&mut self.entries);
        entries.push_front(event);
        &entries[0]
    }

    /// Number of events recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no events were recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent event.
    #[must_use]
    pub fn latest(&self) -> Option<&EmergencyEvent> {
        self.entries.front()
    }

    /// Events, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &EmergencyEvent> {
        self.entries.iter()
    }

    /// Number of events of the given kind.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.entries.iter().filter(|e| e.kind() == kind).count()
    }

    /// Shared handle to the current entries, newest first.
    #[must_use]
    pub fn shared(&self) -> Arc<VecDeque<EmergencyEvent>> {
        Arc::clone(&self.entries)
    }
}
