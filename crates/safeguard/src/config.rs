//! Configuration management for safeguard.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::alert::EmergencyContact;
use crate::error::{Error, Result};
use crate::event::Coordinates;
use crate::keywords::KeywordMatcher;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "safeguard";

/// Default sound level above which a reading counts as an emergency.
pub const DEFAULT_SOUND_THRESHOLD: f64 = 80.0;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SAFEGUARD_`, sections split on `__`,
///    e.g. `SAFEGUARD_TRIGGER__SOUND_THRESHOLD=75`)
/// 2. TOML config file at `~/.config/safeguard/config.toml`
/// 3. Default values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trigger evaluation configuration.
    pub trigger: TriggerConfig,
    /// Signal source monitoring configuration.
    pub monitor: MonitorConfig,
    /// Evidence capture configuration.
    pub recording: RecordingConfig,
    /// Simulated alert dispatch configuration.
    pub alert: AlertConfig,
    /// Emergency contacts notified on activation.
    pub contacts: Vec<EmergencyContact>,
}

/// Trigger evaluation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Phrases that activate emergency mode when heard (case-insensitive).
    pub keywords: Vec<String>,
    /// Sound level in [0, 100] above which a reading activates emergency mode.
    pub sound_threshold: f64,
}

/// Signal source monitoring configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Start the sound level monitor with the session.
    pub sound_enabled: bool,
    /// Start the voice command listener with the session.
    pub voice_enabled: bool,
    /// Start the location watcher with the session.
    pub location_enabled: bool,
    /// Interval between sound frames in milliseconds.
    pub frame_interval_ms: u64,
}

/// Evidence capture configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Start an audio recording when emergency mode activates.
    pub auto_record: bool,
    /// Upper bound on a single recording in seconds.
    pub max_duration_secs: u64,
    /// Capture a photo when emergency mode activates.
    pub auto_photo: bool,
}

/// Simulated alert dispatch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Dispatch alerts to contacts on activation.
    pub enabled: bool,
    /// Simulated delivery delay in milliseconds.
    pub delay_ms: u64,
    /// Latitude shown when geolocation fails.
    pub fallback_lat: f64,
    /// Longitude shown when geolocation fails.
    pub fallback_lng: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trigger: TriggerConfig::default(),
            monitor: MonitorConfig::default(),
            recording: RecordingConfig::default(),
            alert: AlertConfig::default(),
            contacts: crate::alert::default_contacts(),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            sound_threshold: DEFAULT_SOUND_THRESHOLD,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            voice_enabled: true,
            location_enabled: true,
            frame_interval_ms: 16, // ~60 frames per second
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            auto_record: true,
            max_duration_secs: 15,
            auto_photo: true,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 1000,
            fallback_lat: 28.6139,
            fallback_lng: 77.209,
        }
    }
}

/// Default trigger phrases.
fn default_keywords() -> Vec<String> {
    [
        "emergency",
        "help me",
        "i need help",
        "danger",
        "sos",
        "alert",
        "help",
        "please help",
        "scream",
        "screaming",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SAFEGUARD_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.trigger.keywords.is_empty() {
            return Err(Error::config_validation(
                "trigger.keywords must contain at least one phrase",
            ));
        }

        if let Some(blank) = self.trigger.keywords.iter().find(|k| k.trim().is_empty()) {
            return Err(Error::config_validation(format!(
                "trigger.keywords contains a blank phrase: {blank:?}"
            )));
        }

        let threshold = self.trigger.sound_threshold;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(Error::config_validation(format!(
                "sound_threshold ({threshold}) must be within [0, 100]"
            )));
        }

        if self.monitor.frame_interval_ms == 0 {
            return Err(Error::config_validation(
                "frame_interval_ms must be greater than 0",
            ));
        }

        if self.recording.max_duration_secs == 0 {
            return Err(Error::config_validation(
                "max_duration_secs must be greater than 0",
            ));
        }

        if !self.fallback_location().is_valid() {
            return Err(Error::config_validation(format!(
                "fallback location ({}, {}) is out of range",
                self.alert.fallback_lat, self.alert.fallback_lng
            )));
        }

        // Surfaces phrases the matcher cannot compile
        KeywordMatcher::new(&self.trigger.keywords)?;

        Ok(())
    }

    /// Get the sound frame interval as a Duration.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.frame_interval_ms)
    }

    /// Get the recording cap as a Duration.
    #[must_use]
    pub fn recording_cap(&self) -> Duration {
        Duration::from_secs(self.recording.max_duration_secs)
    }

    /// Get the simulated alert delay as a Duration.
    #[must_use]
    pub fn alert_delay(&self) -> Duration {
        Duration::from_millis(self.alert.delay_ms)
    }

    /// Coordinates displayed when geolocation is unavailable.
    #[must_use]
    pub fn fallback_location(&self) -> Coordinates {
        Coordinates::new(self.alert.fallback_lat, self.alert.fallback_lng)
    }

    /// Contacts flagged for notification on emergency.
    pub fn notified_contacts(&self) -> impl Iterator<Item = &EmergencyContact> {
        self.contacts.iter().filter(|c| c.notify_on_emergency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.trigger.keywords.len(), 10);
        assert!((config.trigger.sound_threshold - 80.0).abs() < f64::EPSILON);
        assert!(config.monitor.sound_enabled);
        assert!(config.monitor.voice_enabled);
        assert!(config.recording.auto_record);
    }

    #[test]
    fn test_default_keywords() {
        let keywords = default_keywords();
        assert!(keywords.contains(&"i need help".to_string()));
        assert!(keywords.contains(&"screaming".to_string()));
        assert!(keywords.iter().all(|k| k == &k.to_lowercase()));
    }

    #[test]
    fn test_default_recording_config() {
        let recording = RecordingConfig::default();
        assert_eq!(recording.max_duration_secs, 15);
        assert!(recording.auto_photo);
    }

    #[test]
    fn test_default_contacts() {
        let config = Config::default();
        assert_eq!(config.contacts.len(), 3);
        assert_eq!(config.notified_contacts().count(), 3);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_keywords() {
        let mut config = Config::default();
        config.trigger.keywords.clear();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("trigger.keywords"));
    }

    #[test]
    fn test_validate_blank_keyword() {
        let mut config = Config::default();
        config.trigger.keywords.push("   ".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("blank phrase"));
    }

    #[test]
    fn test_validate_threshold_out_of_range() {
        let mut config = Config::default();
        config.trigger.sound_threshold = 120.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("sound_threshold"));

        config.trigger.sound_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_frame_interval() {
        let mut config = Config::default();
        config.monitor.frame_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("frame_interval_ms"));
    }

    #[test]
    fn test_validate_zero_recording_cap() {
        let mut config = Config::default();
        config.recording.max_duration_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_duration_secs"));
    }

    #[test]
    fn test_validate_bad_fallback_location() {
        let mut config = Config::default();
        config.alert.fallback_lat = 95.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("fallback location"));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.frame_interval(), Duration::from_millis(16));
        assert_eq!(config.recording_cap(), Duration::from_secs(15));
        assert_eq!(config.alert_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_fallback_location() {
        let location = Config::default().fallback_location();
        assert!((location.lat - 28.6139).abs() < 1e-9);
        assert!((location.lng - 77.209).abs() < 1e-9);
    }

    #[test]
    fn test_notified_contacts_filters_opt_out() {
        let mut config = Config::default();
        config.contacts[0].notify_on_emergency = false;
        assert_eq!(config.notified_contacts().count(), 2);
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("safeguard"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_trigger_config_deserialize() {
        let json = r#"{"keywords": ["mayday"], "sound_threshold": 65.0}"#;
        let trigger: TriggerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(trigger.keywords, vec!["mayday".to_string()]);
        assert!((trigger.sound_threshold - 65.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_monitor_config_partial_deserialize() {
        let json = r#"{"voice_enabled": false}"#;
        let monitor: MonitorConfig = serde_json::from_str(json).unwrap();
        assert!(!monitor.voice_enabled);
        assert!(monitor.sound_enabled);
        assert_eq!(monitor.frame_interval_ms, 16);
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("sound_threshold"));
        assert!(json.contains("max_duration_secs"));
        assert!(json.contains("Local Police"));
    }
}
