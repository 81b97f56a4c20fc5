//! Rendering of session snapshots for the terminal.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::event::{format_local, Coordinates, EmergencyEvent};
use crate::sound::LevelBand;
use crate::state::{EmergencyState, Snapshot, SourceKind, SourceStatus};

/// Serializable summary of a session.
#[derive(Debug, Clone, Serialize)]
pub struct Report<'a> {
    /// Emergency state.
    pub state: EmergencyState,
    /// Latest sound level.
    pub sound_level: f64,
    /// Latest sound band.
    pub sound_band: LevelBand,
    /// Latest known position.
    pub location: Option<Coordinates>,
    /// Availability per source.
    pub sources: &'a BTreeMap<SourceKind, SourceStatus>,
    /// Events, newest first.
    pub events: Vec<&'a EmergencyEvent>,
}

impl<'a> Report<'a> {
    /// Summarize `snapshot`.
    #[must_use]
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            state: snapshot.state,
            sound_level: snapshot.sound.level,
            sound_band: snapshot.sound.band(),
            location: snapshot.location,
            sources: &snapshot.sources,
            events: snapshot.events.iter().collect(),
        }
    }
}

/// One timeline line: `3:04:05 PM  Emergency activated (manual)`.
#[must_use]
pub fn render_event(event: &EmergencyEvent) -> String {
    format!("{:>11}  {}", format_local(&event.timestamp), event.label())
}

/// The whole timeline, newest first.
#[must_use]
pub fn render_timeline(snapshot: &Snapshot) -> String {
    if snapshot.events.is_empty() {
        return "No events recorded.\n".to_string();
    }
    let mut out = String::new();
    for event in snapshot.events.iter() {
        let _ = writeln!(out, "{}", render_event(event));
    }
    out
}

/// Current state, telemetry and source availability.
#[must_use]
pub fn render_status(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "State:     {}", snapshot.state);
    let _ = writeln!(
        out,
        "Sound:     {:.0} ({})",
        snapshot.sound.level,
        snapshot.sound.band()
    );
    match snapshot.location {
        Some(location) => {
            let _ = writeln!(out, "Location:  {location}");
        }
        None => {
            let _ = writeln!(out, "Location:  unknown");
        }
    }
    if let Some(updated) = snapshot.last_update {
        let _ = writeln!(out, "Updated:   {}", format_local(&updated));
    }
    let _ = writeln!(out, "Events:    {}", snapshot.events.len());
    for (kind, status) in &snapshot.sources {
        let _ = writeln!(out, "  {kind:<9} {status}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ActivationSource, EventData, EventLog};
    use crate::sound::SoundSample;

    fn snapshot_with_events() -> Snapshot {
        let mut log = EventLog::new();
        log.record(EventData::Activation {
            source: ActivationSource::Voice,
        });
        log.record(EventData::Contact { contact_count: 3 });
        log.record(EventData::Deactivation);

        Snapshot {
            events: log.shared(),
            sound: SoundSample::new(62.0, 80.0),
            location: Some(Coordinates::new(28.6139, 77.209)),
            ..Snapshot::initial()
        }
    }

    #[test]
    fn test_render_empty_timeline() {
        assert_eq!(render_timeline(&Snapshot::initial()), "No events recorded.\n");
    }

    #[test]
    fn test_render_timeline_newest_first() {
        let rendered = render_timeline(&snapshot_with_events());
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("Emergency deactivated"));
        assert!(lines[1].ends_with("Alert sent to 3 contacts"));
        assert!(lines[2].ends_with("Emergency activated (voice)"));
        assert!(lines[0].contains("M  "));
    }

    #[test]
    fn test_render_status() {
        let rendered = render_status(&snapshot_with_events());
        assert!(rendered.contains("State:     inactive"));
        assert!(rendered.contains("Sound:     62 (warning)"));
        assert!(rendered.contains("Location:  28.61390, 77.20900"));
        assert!(rendered.contains("voice"));
    }

    #[test]
    fn test_report_json() {
        let snapshot = snapshot_with_events();
        let json = serde_json::to_value(Report::new(&snapshot)).unwrap();
        assert_eq!(json["state"]["active"], false);
        assert_eq!(json["sound_band"], "warning");
        assert_eq!(json["events"][0]["kind"], "deactivation");
        assert_eq!(json["events"][1]["contact_count"], 3);
        assert_eq!(json["sources"]["sound"]["status"], "idle");
    }
}
