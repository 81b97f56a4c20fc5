//! Session command language shared by `run` and `demo`.
//!
//! One command per line:
//!
//! ```text
//! sos                     press the emergency button
//! say <text>              speak to the voice listener
//! level <0-100>           set the ambient sound level
//! move <lat> <lng>        report a position fix
//! gps-error <code>        report a geolocation error (1 denied, 2 unavailable, 3 timeout)
//! deny <capability>       refuse a capability from now on
//! enable <source>         restart a source
//! cancel                  end the running episode
//! wait <ms>               let the session run
//! timeline | status       print the timeline or the status
//! quit
//! ```
//!
//! Blank lines and lines starting with `#` are ignored in scripts.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use tracing::debug;

use super::commands::CapabilityArg;
use crate::capability::Capability;
use crate::error::{Error, Result};
use crate::event::Coordinates;
use crate::platform::Simulator;
use crate::session::SessionHandle;
use crate::sound::MAX_LEVEL;
use crate::state::SourceKind;
use crate::timeline::{render_status, render_timeline};

/// Steps run by `demo` when no script is given.
pub const DEFAULT_SCENARIO: &str = "\
# ambient noise, no trigger
level 10
level 40
say call me later
# a scream
level 85
level 20
wait 1500
cancel
# voice command
say this is an emergency please
wait 1500
cancel
";

/// How long a `say` waits for the voice listener to come back.
const LISTENER_WAIT: Duration = Duration::from_secs(2);

/// Number of sound frames a feed step waits for monitors to pick it up.
const FEED_FRAMES: u32 = 4;

/// One session command.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Press the emergency button.
    Sos,
    /// Speak a transcript.
    Say(String),
    /// Set the ambient sound level.
    Level(f64),
    /// Report a position fix.
    Move(Coordinates),
    /// Report a geolocation error code.
    GpsError(u16),
    /// Refuse a capability.
    Deny(Capability),
    /// Restart a source.
    Enable(SourceKind),
    /// End the running episode.
    Cancel,
    /// Let the session run.
    Wait(Duration),
    /// Print the timeline.
    Timeline,
    /// Print the status.
    Status,
    /// Stop.
    Quit,
}

impl FromStr for Step {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (command, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(c, r)| (c, r.trim()));
        let invalid = |message: &str| Error::invalid_command(line, message);

        let step = match command.to_ascii_lowercase().as_str() {
            "sos" => Self::Sos,
            "cancel" => Self::Cancel,
            "timeline" => Self::Timeline,
            "status" => Self::Status,
            "quit" | "exit" => Self::Quit,
            "say" => {
                if rest.is_empty() {
                    return Err(invalid("expected text to say"));
                }
                Self::Say(rest.to_string())
            }
            "level" => {
                let level: f64 = rest.parse().map_err(|_| invalid("expected a number"))?;
                if !(0.0..=MAX_LEVEL).contains(&level) {
                    return Err(invalid("level must be within [0, 100]"));
                }
                Self::Level(level)
            }
            "move" => {
                let mut parts = rest.split_whitespace().map(str::parse::<f64>);
                let (Some(Ok(lat)), Some(Ok(lng)), None) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    return Err(invalid("expected <lat> <lng>"));
                };
                let coordinates = Coordinates::new(lat, lng);
                if !coordinates.is_valid() {
                    return Err(invalid("coordinates out of range"));
                }
                Self::Move(coordinates)
            }
            "gps-error" => {
                let code = rest.parse().map_err(|_| invalid("expected an error code"))?;
                Self::GpsError(code)
            }
            "deny" => {
                let arg = CapabilityArg::from_str(rest, true).map_err(|e| invalid(e.as_str()))?;
                Self::Deny(arg.into())
            }
            "enable" => Self::Enable(rest.parse()?),
            "wait" => {
                let ms: u64 = rest.parse().map_err(|_| invalid("expected milliseconds"))?;
                Self::Wait(Duration::from_millis(ms))
            }
            "" => return Err(invalid("empty command")),
            _ => return Err(invalid("unknown command")),
        };
        Ok(step)
    }
}

/// Parse a script, skipping blank lines and `#` comments.
///
/// # Errors
///
/// Returns the first line that fails to parse.
pub fn parse_script(text: &str) -> Result<Vec<Step>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::parse)
        .collect()
}

/// Read and parse a script file.
///
/// # Errors
///
/// Returns [`Error::FileRead`] if the file cannot be read, or the first line
/// that fails to parse.
pub fn read_script(path: &Path) -> Result<Vec<Step>> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_script(&text)
}

/// What the caller should do after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to show.
    Done,
    /// Show this text.
    Output(String),
    /// Stop reading commands.
    Quit,
}

/// Applies steps to a session running against the simulator.
#[derive(Debug, Clone)]
pub struct Driver {
    handle: SessionHandle,
    sim: Simulator,
    feed_delay: Duration,
}

impl Driver {
    /// Create a driver; `frame_interval` paces how long feed steps wait.
    #[must_use]
    pub fn new(handle: SessionHandle, sim: Simulator, frame_interval: Duration) -> Self {
        Self {
            handle,
            sim,
            feed_delay: frame_interval * FEED_FRAMES,
        }
    }

    /// Apply one step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session has stopped.
    pub async fn apply(&self, step: &Step) -> Result<Outcome> {
        debug!(?step, "Applying step");
        match step {
            Step::Sos => {
                self.handle.activate().await?;
                self.handle.settle().await?;
            }
            Step::Say(text) => return self.say(text).await,
            Step::Level(level) => {
                self.sim.push_level(*level);
                self.feed().await?;
            }
            Step::Move(coordinates) => {
                self.sim.move_to(*coordinates);
                self.feed().await?;
            }
            Step::GpsError(code) => {
                self.sim.fail_location(*code);
                self.feed().await?;
            }
            Step::Deny(capability) => self.sim.deny(*capability),
            Step::Enable(kind) => {
                self.handle.re_enable(*kind).await?;
                self.feed().await?;
            }
            Step::Cancel => {
                let message = if self.handle.cancel().await? {
                    "Emergency cancelled."
                } else {
                    "Emergency mode is not active."
                };
                return Ok(Outcome::Output(format!("{message}\n")));
            }
            Step::Wait(duration) => {
                tokio::time::sleep(*duration).await;
                self.handle.settle().await?;
            }
            Step::Timeline => {
                let snapshot = self.handle.settle().await?;
                return Ok(Outcome::Output(render_timeline(&snapshot)));
            }
            Step::Status => {
                let snapshot = self.handle.settle().await?;
                return Ok(Outcome::Output(render_status(&snapshot)));
            }
            Step::Quit => return Ok(Outcome::Quit),
        }
        Ok(Outcome::Done)
    }

    async fn feed(&self) -> Result<()> {
        tokio::time::sleep(self.feed_delay).await;
        self.handle.settle().await?;
        Ok(())
    }

    async fn say(&self, text: &str) -> Result<Outcome> {
        // The listener restarts asynchronously after a cancel
        let listening = self.handle.wait_until(|s| {
            let voice = s.source(SourceKind::Voice);
            s.state.active || voice.is_running() || voice.is_unavailable()
        });
        let _ = tokio::time::timeout(LISTENER_WAIT, listening).await;

        if self.sim.say(text) == 0 {
            return Ok(Outcome::Output(
                "Voice listener is not running; transcript dropped.\n".to_string(),
            ));
        }
        self.feed().await?;
        Ok(Outcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::event::{ActivationSource, EventKind};
    use crate::session::Session;
    use crate::state::SourceStatus;

    #[test]
    fn test_parse_steps() {
        assert_eq!("sos".parse::<Step>().unwrap(), Step::Sos);
        assert_eq!("  SOS ".parse::<Step>().unwrap(), Step::Sos);
        assert_eq!(
            "say help me now".parse::<Step>().unwrap(),
            Step::Say("help me now".to_string())
        );
        assert_eq!("level 85".parse::<Step>().unwrap(), Step::Level(85.0));
        assert_eq!(
            "move 28.6139 77.209".parse::<Step>().unwrap(),
            Step::Move(Coordinates::new(28.6139, 77.209))
        );
        assert_eq!(
            "deny speech".parse::<Step>().unwrap(),
            Step::Deny(Capability::SpeechRecognition)
        );
        assert_eq!(
            "enable sound".parse::<Step>().unwrap(),
            Step::Enable(SourceKind::Sound)
        );
        assert_eq!(
            "wait 250".parse::<Step>().unwrap(),
            Step::Wait(Duration::from_millis(250))
        );
        assert_eq!("gps-error 1".parse::<Step>().unwrap(), Step::GpsError(1));
    }

    #[test]
    fn test_parse_rejects_bad_steps() {
        assert!("level loud".parse::<Step>().is_err());
        assert!("level 120".parse::<Step>().is_err());
        assert!("say".parse::<Step>().is_err());
        assert!("move 95 10".parse::<Step>().is_err());
        assert!("move 1".parse::<Step>().is_err());
        assert!("dance".parse::<Step>().is_err());
        assert!(matches!(
            "enable radar".parse::<Step>(),
            Err(Error::UnknownSource(_))
        ));
    }

    #[test]
    fn test_parse_default_scenario() {
        let steps = parse_script(DEFAULT_SCENARIO).unwrap();
        assert_eq!(steps.first(), Some(&Step::Level(10.0)));
        assert!(steps.contains(&Step::Say("this is an emergency please".to_string())));
        assert_eq!(steps.last(), Some(&Step::Cancel));
    }

    #[test]
    fn test_parse_script_reports_bad_line() {
        let err = parse_script("sos\nfly away\n").unwrap_err();
        assert!(err.to_string().contains("fly away"));
    }

    #[test]
    fn test_read_script_file() {
        let path = std::env::temp_dir().join(format!("safeguard-script-{}.txt", std::process::id()));
        std::fs::write(&path, "# drill\nsos\nwait 10\ncancel\n").unwrap();

        let steps = read_script(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            steps,
            vec![Step::Sos, Step::Wait(Duration::from_millis(10)), Step::Cancel]
        );
    }

    #[test]
    fn test_read_missing_script() {
        let err = read_script(Path::new("/nonexistent/drill.txt")).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
        assert!(err.to_string().contains("/nonexistent/drill.txt"));
    }

    #[tokio::test]
    async fn test_default_scenario_timeline() {
        let sim = Simulator::new();
        let mut config = Config::default();
        config.monitor.frame_interval_ms = 5;
        config.alert.delay_ms = 50;
        let frame_interval = config.frame_interval();

        let session = Session::start(config, sim.devices()).unwrap();
        let driver = Driver::new(session.handle(), sim.clone(), frame_interval);

        for step in parse_script(DEFAULT_SCENARIO).unwrap() {
            driver.apply(&step).await.unwrap();
        }

        let snapshot = session.handle().settle().await.unwrap();
        let activations: Vec<_> = snapshot
            .events
            .iter()
            .rev()
            .filter_map(|e| match e.data {
                crate::event::EventData::Activation { source } => Some(source),
                _ => None,
            })
            .collect();
        assert_eq!(activations, vec![ActivationSource::Sound, ActivationSource::Voice]);
        let deactivations = snapshot
            .events
            .iter()
            .filter(|e| e.kind() == EventKind::Deactivation)
            .count();
        assert_eq!(deactivations, 2);
        assert!(snapshot.events.iter().any(|e| e.kind() == EventKind::Photo));
        assert!(!snapshot.state.active);

        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_say_while_active_is_dropped() {
        let sim = Simulator::new();
        let mut config = Config::default();
        config.monitor.frame_interval_ms = 5;
        config.recording.auto_record = false;
        config.recording.auto_photo = false;
        config.alert.enabled = false;
        let session = Session::start(config, sim.devices()).unwrap();
        let handle = session.handle();
        let driver = Driver::new(handle.clone(), sim.clone(), Duration::from_millis(5));
        handle
            .wait_until(|s| s.source(SourceKind::Voice).is_running())
            .await
            .unwrap();

        assert_eq!(driver.apply(&Step::Sos).await.unwrap(), Outcome::Done);
        handle
            .wait_until(|s| s.state.active && s.source(SourceKind::Voice) == &SourceStatus::Idle)
            .await
            .unwrap();
        assert_eq!(sim.active_streams(Capability::SpeechRecognition), 0);

        let outcome = driver.apply(&Step::Say("help me".to_string())).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Output("Voice listener is not running; transcript dropped.\n".to_string())
        );

        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_outcome_when_inactive() {
        let sim = Simulator::new();
        let session = Session::start(Config::default(), sim.devices()).unwrap();
        let driver = Driver::new(session.handle(), sim, Duration::from_millis(5));

        let outcome = driver.apply(&Step::Cancel).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Output("Emergency mode is not active.\n".to_string())
        );
        assert_eq!(driver.apply(&Step::Quit).await.unwrap(), Outcome::Quit);

        session.shutdown().await.unwrap();
    }
}
