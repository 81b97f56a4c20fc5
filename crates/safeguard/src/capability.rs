//! Device capability seams.
//!
//! The trigger engine never talks to hardware directly. Microphones,
//! cameras, geolocation, speech recognition and haptics are reached through
//! the traits in this module; [`crate::platform`] provides implementations.
//!
//! Every acquired device implements [`Device`] and is held in an
//! [`Acquired`] guard, which releases the underlying handle when dropped.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::Coordinates;

/// A device capability the engine may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Audio input.
    Microphone,
    /// Video input.
    Camera,
    /// Position updates.
    Geolocation,
    /// Streaming speech-to-text.
    SpeechRecognition,
    /// Vibration motor.
    Vibration,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Microphone => write!(f, "microphone"),
            Self::Camera => write!(f, "camera"),
            Self::Geolocation => write!(f, "geolocation"),
            Self::SpeechRecognition => write!(f, "speech recognition"),
            Self::Vibration => write!(f, "vibration"),
        }
    }
}

/// Errors raised by device capabilities.
///
/// These are recovered where the signal source meets the device: the source
/// is marked unavailable and the other sources keep running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The user refused access.
    #[error("{capability} permission denied")]
    PermissionDenied {
        /// The capability that was refused.
        capability: Capability,
    },

    /// The environment has no such capability.
    #[error("{capability} is not supported in this environment")]
    Unsupported {
        /// The missing capability.
        capability: Capability,
    },

    /// The device failed temporarily (timeout, device busy, signal lost).
    #[error("{capability} device error: {message}")]
    TransientDevice {
        /// The failing capability.
        capability: Capability,
        /// Description of what went wrong.
        message: String,
    },
}

impl CapabilityError {
    /// Create a permission denied error.
    #[must_use]
    pub fn denied(capability: Capability) -> Self {
        Self::PermissionDenied { capability }
    }

    /// Create an unsupported capability error.
    #[must_use]
    pub fn unsupported(capability: Capability) -> Self {
        Self::Unsupported { capability }
    }

    /// Create a transient device error.
    #[must_use]
    pub fn transient(capability: Capability, message: impl Into<String>) -> Self {
        Self::TransientDevice {
            capability,
            message: message.into(),
        }
    }

    /// Map a geolocation error code (1 denied, 2 unavailable, 3 timeout).
    #[must_use]
    pub fn from_geolocation_code(code: u16) -> Self {
        match code {
            1 => Self::denied(Capability::Geolocation),
            2 => Self::transient(Capability::Geolocation, "position unavailable"),
            3 => Self::transient(Capability::Geolocation, "request timed out"),
            other => Self::transient(Capability::Geolocation, format!("error code {other}")),
        }
    }

    /// The capability that failed.
    #[must_use]
    pub fn capability(&self) -> Capability {
        match self {
            Self::PermissionDenied { capability }
            | Self::Unsupported { capability }
            | Self::TransientDevice { capability, .. } => *capability,
        }
    }

    /// Check if this error is a permission refusal.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Short message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied {
                capability: Capability::Geolocation,
            } => "Location access denied by user".to_string(),
            Self::PermissionDenied { capability } => {
                format!("{} access denied. Please check permissions.", title(*capability))
            }
            Self::Unsupported { capability } => {
                format!("{} not supported in this environment.", title(*capability))
            }
            Self::TransientDevice {
                capability: Capability::Geolocation,
                message,
            } => format!("Location {message}"),
            Self::TransientDevice {
                capability,
                message,
            } => format!("{} error: {message}", title(*capability)),
        }
    }
}

fn title(capability: Capability) -> String {
    let name = capability.to_string();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    }
}

/// Result type for capability operations.
pub type Result<T> = std::result::Result<T, CapabilityError>;

/// Which way a requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    /// Away from the user.
    #[default]
    Environment,
    /// Towards the user.
    User,
}

/// A still frame grabbed from a video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}

/// An acquired device handle that must be released when no longer used.
pub trait Device: Send + std::fmt::Debug {
    /// Release the underlying device. Must be idempotent.
    fn release(&mut self);
}

/// A stream of frequency-domain audio frames.
#[async_trait::async_trait]
pub trait AudioStream: Device {
    /// The next frame of frequency-bin magnitudes, or `None` once the stream ended.
    async fn next_frame(&mut self) -> Option<Vec<u8>>;
}

/// A live camera stream.
#[async_trait::async_trait]
pub trait VideoStream: Device {
    /// Grab one still frame.
    async fn grab_frame(&mut self) -> Result<Photo>;
}

/// A subscription to position updates.
#[async_trait::async_trait]
pub trait PositionWatch: Device {
    /// The next update, or `None` once the watch ended.
    async fn next_update(&mut self) -> Option<Result<Coordinates>>;
}

/// A running speech recognizer.
#[async_trait::async_trait]
pub trait TranscriptStream: Device {
    /// The next transcript update, or `None` once recognition ended.
    async fn next_transcript(&mut self) -> Option<Result<String>>;
}

/// Audio input capability.
#[async_trait::async_trait]
pub trait Microphone: Send + Sync + std::fmt::Debug {
    /// Request an audio stream.
    async fn request_audio_stream(&self) -> Result<Acquired<dyn AudioStream>>;
}

/// Video input capability.
#[async_trait::async_trait]
pub trait Camera: Send + Sync + std::fmt::Debug {
    /// Request a video stream facing `facing`.
    async fn request_video_stream(&self, facing: Facing) -> Result<Acquired<dyn VideoStream>>;
}

/// Position capability.
#[async_trait::async_trait]
pub trait Geolocation: Send + Sync + std::fmt::Debug {
    /// Start watching the device position.
    async fn watch_position(&self) -> Result<Acquired<dyn PositionWatch>>;
}

/// Speech recognition capability.
#[async_trait::async_trait]
pub trait SpeechRecognizer: Send + Sync + std::fmt::Debug {
    /// Start continuous recognition.
    async fn start_recognition(&self) -> Result<Acquired<dyn TranscriptStream>>;
}

/// Haptic feedback capability. Best-effort.
pub trait Haptics: Send + Sync + std::fmt::Debug {
    /// Vibrate with alternating on/off durations in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the device has no vibration motor.
    fn vibrate(&self, pattern: &[u32]) -> Result<()>;
}

/// Scoped ownership of an acquired device.
///
/// The device is released when the guard is dropped, or earlier through
/// [`Acquired::release`].
#[derive(Debug)]
pub struct Acquired<D: Device + ?Sized> {
    device: Box<D>,
    released: bool,
}

impl<D: Device + ?Sized> Acquired<D> {
    /// Take ownership of an acquired device.
    #[must_use]
    pub fn new(device: Box<D>) -> Self {
        Self {
            device,
            released: false,
        }
    }

    /// Release the device now.
    pub fn release(&mut self) {
        if !self.released {
            self.device.release();
            self.released = true;
        }
    }

    /// Whether the device has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl<D: Device + ?Sized> Deref for Acquired<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.device
    }
}

impl<D: Device + ?Sized> DerefMut for Acquired<D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: Device + ?Sized> Drop for Acquired<D> {
    fn drop(&mut self) {
        self.release();
    }
}

/// The full set of capabilities a session runs against.
#[derive(Debug, Clone)]
pub struct Devices {
    /// Audio input.
    pub microphone: Arc<dyn Microphone>,
    /// Video input.
    pub camera: Arc<dyn Camera>,
    /// Position updates.
    pub geolocation: Arc<dyn Geolocation>,
    /// Speech recognition.
    pub speech: Arc<dyn SpeechRecognizer>,
    /// Vibration.
    pub haptics: Arc<dyn Haptics>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingDevice(Arc<AtomicUsize>);

    impl Device for CountingDevice {
        fn release(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::Microphone.to_string(), "microphone");
        assert_eq!(Capability::SpeechRecognition.to_string(), "speech recognition");
    }

    #[test]
    fn test_error_display() {
        let err = CapabilityError::denied(Capability::Camera);
        assert_eq!(err.to_string(), "camera permission denied");

        let err = CapabilityError::unsupported(Capability::SpeechRecognition);
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            CapabilityError::denied(Capability::Microphone).user_message(),
            "Microphone access denied. Please check permissions."
        );
        assert_eq!(
            CapabilityError::denied(Capability::Geolocation).user_message(),
            "Location access denied by user"
        );
        assert_eq!(
            CapabilityError::unsupported(Capability::SpeechRecognition).user_message(),
            "Speech recognition not supported in this environment."
        );
        assert_eq!(
            CapabilityError::from_geolocation_code(3).user_message(),
            "Location request timed out"
        );
    }

    #[test]
    fn test_geolocation_codes() {
        assert!(CapabilityError::from_geolocation_code(1).is_permission_error());
        assert!(matches!(
            CapabilityError::from_geolocation_code(2),
            CapabilityError::TransientDevice { .. }
        ));
        assert_eq!(
            CapabilityError::from_geolocation_code(9).capability(),
            Capability::Geolocation
        );
    }

    #[test]
    fn test_acquired_releases_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let _guard = Acquired::new(Box::new(CountingDevice(Arc::clone(&count))));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_acquired_release_is_idempotent() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut guard = Acquired::new(Box::new(CountingDevice(Arc::clone(&count))));
        guard.release();
        guard.release();
        assert!(guard.is_released());
        drop(guard);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_facing_default() {
        assert_eq!(Facing::default(), Facing::Environment);
    }
}
