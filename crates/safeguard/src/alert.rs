//! Emergency contacts and simulated alert dispatch.
//!
//! Nothing leaves the process: an alert is a log line after a short delay,
//! followed by a `contact` event on the timeline.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::event::{Coordinates, EventData};
use crate::monitor::StopHandle;
use crate::session::Input;
use crate::state::Snapshot;

/// Someone to notify when emergency mode activates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Phone number, as entered.
    pub phone: String,
    /// Relationship to the user.
    pub relationship: String,
    /// Receive alerts on activation.
    #[serde(default = "default_notify")]
    pub notify_on_emergency: bool,
}

const fn default_notify() -> bool {
    true
}

impl EmergencyContact {
    /// Create a contact that is notified on emergency.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        phone: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            phone: phone.into(),
            relationship: relationship.into(),
            notify_on_emergency: true,
        }
    }
}

/// Contacts shipped with the default configuration.
#[must_use]
pub fn default_contacts() -> Vec<EmergencyContact> {
    vec![
        EmergencyContact::new("1", "Sarah Johnson", "+1 (555) 123-4567", "Sister"),
        EmergencyContact::new("2", "David Williams", "+1 (555) 987-6543", "Friend"),
        EmergencyContact::new("3", "Local Police", "911", "Emergency Services"),
    ]
}

/// What a single alert carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// Episode the alert belongs to.
    pub episode: u32,
    /// Position shared with the contacts.
    pub location: Coordinates,
    /// Recipients.
    pub contacts: Vec<EmergencyContact>,
}

impl Alert {
    /// Number of recipients.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.contacts.len()
    }

    /// Text sent to each recipient.
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "SafeGuard emergency alert. Last known location: {} (https://maps.google.com/?q={},{})",
            self.location, self.location.lat, self.location.lng
        )
    }
}

/// Simulate delivering `alert`: wait `delay`, then log each recipient.
pub async fn send_alert(alert: &Alert, delay: Duration) -> usize {
    tokio::time::sleep(delay).await;
    info!(
        episode = alert.episode,
        recipients = alert.recipient_count(),
        location = %alert.location,
        message = %alert.message(),
        "Emergency alert sent"
    );
    for contact in &alert.contacts {
        debug!(contact = %contact.name, phone = %contact.phone, "Alert delivered");
    }
    alert.recipient_count()
}

/// Deliver the alert for `alert.episode` unless the episode ends first.
pub(crate) async fn run(
    alert: Alert,
    delay: Duration,
    mut snapshots: watch::Receiver<Arc<Snapshot>>,
    tx: mpsc::Sender<Input>,
    stop: StopHandle,
) {
    let episode = alert.episode;
    let ended = async move {
        let _ = snapshots
            .wait_for(|s| !s.state.active || s.state.episode != episode)
            .await;
    };

    let count = tokio::select! {
        () = stop.stopped() => return,
        () = ended => {
            debug!(episode, "Episode ended before alert was sent");
            return;
        }
        count = send_alert(&alert, delay) => count,
    };

    // The session may already be gone
    let _ = tx
        .send(Input::Evidence(EventData::Contact {
            contact_count: count,
        }))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> Alert {
        Alert {
            episode: 1,
            location: Coordinates::new(28.6139, 77.209),
            contacts: default_contacts(),
        }
    }

    #[test]
    fn test_default_contacts() {
        let contacts = default_contacts();
        assert_eq!(contacts.len(), 3);
        assert!(contacts.iter().all(|c| c.notify_on_emergency));
        assert_eq!(contacts[2].phone, "911");
    }

    #[test]
    fn test_contact_notify_defaults_to_true() {
        let contact: EmergencyContact = serde_json::from_str(
            r#"{"id":"9","name":"Ana","phone":"555","relationship":"Friend"}"#,
        )
        .unwrap();
        assert!(contact.notify_on_emergency);
    }

    #[test]
    fn test_alert_message_includes_location() {
        let message = alert().message();
        assert!(message.contains("28.61390, 77.20900"));
        assert!(message.contains("q=28.6139,77.209"));
    }

    #[tokio::test]
    async fn test_send_alert_waits_delay() {
        let started = tokio::time::Instant::now();
        let count = send_alert(&alert(), Duration::from_millis(30)).await;
        assert_eq!(count, 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
