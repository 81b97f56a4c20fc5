//! Error types for safeguard.
//!
//! This module defines the crate-level error type. Failures of individual
//! device capabilities live in [`crate::capability::CapabilityError`]; they are
//! recovered at the source boundary and never surface through [`Error`].

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for safeguard operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// A trigger phrase could not be compiled into a matcher.
    #[error("invalid trigger phrase '{phrase}': {source}")]
    TriggerPhrase {
        /// The offending phrase.
        phrase: String,
        /// The underlying error.
        #[source]
        source: regex::Error,
    },

    // === Session Errors ===
    /// The session has shut down and no longer accepts input.
    #[error("session is closed")]
    SessionClosed,

    /// A source name given on the command line or in a script is unknown.
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    /// A session command could not be parsed.
    #[error("invalid command '{line}': {message}")]
    InvalidCommand {
        /// The command as typed.
        line: String,
        /// What was wrong with it.
        message: String,
    },

    // === I/O Errors ===
    /// File system or terminal operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to read a file given on the command line.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// Path that couldn't be read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for safeguard operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a new invalid command error.
    #[must_use]
    pub fn invalid_command(line: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCommand {
            line: line.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error indicates the session is gone.
    #[must_use]
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Self::SessionClosed)
    }

    /// Check if this error comes from configuration loading or validation.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad(_) | Self::ConfigValidation { .. } | Self::TriggerPhrase { .. }
        )
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::SessionClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::SessionClosed;
        assert_eq!(err.to_string(), "session is closed");

        let err = Error::internal("test error");
        assert_eq!(err.to_string(), "internal error: test error");
    }

    #[test]
    fn test_error_is_session_closed() {
        assert!(Error::SessionClosed.is_session_closed());
        assert!(!Error::internal("test").is_session_closed());
    }

    #[test]
    fn test_error_is_config_error() {
        assert!(Error::config_validation("bad threshold").is_config_error());
        assert!(!Error::SessionClosed.is_config_error());
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::config_validation("sound_threshold must be within [0, 100]");
        assert!(err.to_string().contains("sound_threshold"));
    }

    #[test]
    fn test_unknown_source_display() {
        let err = Error::UnknownSource("radar".to_string());
        assert_eq!(err.to_string(), "unknown source 'radar'");
    }

    #[test]
    fn test_trigger_phrase_error_display() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = Error::TriggerPhrase {
            phrase: "(".to_string(),
            source,
        };
        assert!(err.to_string().contains("invalid trigger phrase"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_from_send_error() {
        let (tx, rx) = tokio::sync::mpsc::channel::<u8>(1);
        drop(rx);
        let send_err = tx.try_send(1).err();
        assert!(send_err.is_some());

        let err: Error = tokio::sync::mpsc::error::SendError(1u8).into();
        assert!(err.is_session_closed());
    }

    #[test]
    fn test_file_read_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::FileRead {
            path: PathBuf::from("/root/forbidden.toml"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden.toml"));
    }
}
