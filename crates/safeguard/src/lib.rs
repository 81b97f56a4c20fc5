//! `safeguard` - Emergency trigger engine for a personal-safety application
//!
//! This library decides when a session enters emergency mode. Three signal
//! streams (the emergency button, voice commands, and sound levels) feed one
//! evaluator; the first qualifying signal activates, everything after it is
//! absorbed until the operator cancels. Evidence responders then record
//! audio, take a photo, and dispatch simulated alerts.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod alert;
pub mod capability;
pub mod cli;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod evidence;
pub mod keywords;
pub mod logging;
pub mod monitor;
pub mod platform;
pub mod session;
pub mod sound;
pub mod state;
pub mod timeline;

pub use alert::EmergencyContact;
pub use capability::{Capability, CapabilityError, Devices};
pub use config::Config;
pub use error::{Error, Result};
pub use evaluator::{Decision, Signal, TriggerEvaluator};
pub use event::{ActivationSource, Coordinates, EmergencyEvent, EventData, EventKind};
pub use keywords::KeywordMatcher;
pub use logging::init_logging;
pub use session::{Session, SessionHandle};
pub use state::{EmergencyState, Snapshot, SourceKind, SourceStatus, UnavailableReason};
