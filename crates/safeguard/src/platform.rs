//! Simulated device platform.
//!
//! The simulator implements every capability trait in memory. A
//! [`Simulator`] is both the device provider handed to a session and the
//! control surface used by the CLI and the tests to feed sound levels,
//! speech, and position fixes, or to refuse a capability.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

use crate::capability::{
    Acquired, AudioStream, Camera, Capability, CapabilityError, Device, Devices, Facing,
    Geolocation, Haptics, Microphone, Photo, PositionWatch, Result, SpeechRecognizer,
    TranscriptStream, VideoStream,
};
use crate::event::Coordinates;
use crate::sound::frame_for_level;

/// Number of frequency bins in a simulated audio frame.
pub const FRAME_BINS: usize = 128;

/// Resolution of simulated photos.
pub const PHOTO_SIZE: (u32, u32) = (640, 480);

/// Get the platform name.
#[must_use]
pub fn platform_name() -> &'static str {
    "simulator"
}

/// How the simulator answers requests for a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    /// Requests succeed.
    #[default]
    Granted,
    /// The user refuses.
    Denied,
    /// The capability does not exist.
    Unsupported,
}

#[derive(Debug, Clone)]
enum SpeechEvent {
    Transcript(String),
    Error(CapabilityError),
}

#[derive(Debug)]
struct Shared {
    access: Mutex<HashMap<Capability, Access>>,
    active: Mutex<HashMap<Capability, usize>>,
    vibrations: Mutex<Vec<Vec<u32>>>,
    level: watch::Sender<f64>,
    position: watch::Sender<Option<Result<Coordinates>>>,
    speech: broadcast::Sender<SpeechEvent>,
    closed: watch::Sender<bool>,
}

impl Shared {
    fn check(&self, capability: Capability) -> Result<()> {
        let access = self
            .access
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&capability)
            .copied()
            .unwrap_or_default();
        match access {
            Access::Granted => Ok(()),
            Access::Denied => Err(CapabilityError::denied(capability)),
            Access::Unsupported => Err(CapabilityError::unsupported(capability)),
        }
    }

    fn acquire(&self, capability: Capability) -> Result<()> {
        self.check(capability)?;
        *self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(capability)
            .or_default() += 1;
        debug!(%capability, "Simulated device acquired");
        Ok(())
    }

    fn release(&self, capability: Capability) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = active.get_mut(&capability) {
            *count = count.saturating_sub(1);
        }
        debug!(%capability, "Simulated device released");
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

/// In-memory device platform.
#[derive(Debug, Clone)]
pub struct Simulator {
    shared: Arc<Shared>,
}

impl Simulator {
    /// Create a simulator with every capability granted and no position fix.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                access: Mutex::new(HashMap::new()),
                active: Mutex::new(HashMap::new()),
                vibrations: Mutex::new(Vec::new()),
                level: watch::channel(0.0).0,
                position: watch::channel(None).0,
                speech: broadcast::channel(64).0,
                closed: watch::channel(false).0,
            }),
        }
    }

    /// Capability implementations backed by this simulator.
    #[must_use]
    pub fn devices(&self) -> Devices {
        Devices {
            microphone: Arc::new(SimMicrophone(Arc::clone(&self.shared))),
            camera: Arc::new(SimCamera(Arc::clone(&self.shared))),
            geolocation: Arc::new(SimGeolocation(Arc::clone(&self.shared))),
            speech: Arc::new(SimSpeech(Arc::clone(&self.shared))),
            haptics: Arc::new(SimHaptics(Arc::clone(&self.shared))),
        }
    }

    /// Set how requests for `capability` are answered.
    pub fn set_access(&self, capability: Capability, access: Access) {
        self.shared
            .access
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(capability, access);
    }

    /// Refuse `capability` from now on.
    pub fn deny(&self, capability: Capability) {
        self.set_access(capability, Access::Denied);
    }

    /// Set the ambient sound level every open audio stream reports.
    pub fn push_level(&self, level: f64) {
        trace!(level, "Simulated sound level");
        self.shared.level.send_replace(level);
    }

    /// Deliver a transcript to every running recognizer.
    ///
    /// Returns the number of recognizers that received it.
    pub fn say(&self, text: impl Into<String>) -> usize {
        self.shared
            .speech
            .send(SpeechEvent::Transcript(text.into()))
            .unwrap_or(0)
    }

    /// Make every running recognizer report `error`.
    pub fn speech_error(&self, error: CapabilityError) -> usize {
        self.shared.speech.send(SpeechEvent::Error(error)).unwrap_or(0)
    }

    /// Report a new position fix.
    pub fn move_to(&self, coordinates: Coordinates) {
        self.shared.position.send_replace(Some(Ok(coordinates)));
    }

    /// Report a geolocation error code (1 denied, 2 unavailable, 3 timeout).
    pub fn fail_location(&self, code: u16) {
        self.shared
            .position
            .send_replace(Some(Err(CapabilityError::from_geolocation_code(code))));
    }

    /// End every open stream.
    pub fn close(&self) {
        self.shared.closed.send_replace(true);
    }

    /// Number of currently acquired devices for `capability`.
    #[must_use]
    pub fn active_streams(&self, capability: Capability) -> usize {
        self.shared
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&capability)
            .copied()
            .unwrap_or(0)
    }

    /// Vibration patterns played so far.
    #[must_use]
    pub fn vibrations(&self) -> Vec<Vec<u32>> {
        self.shared
            .vibrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

/// A device handle that decrements the active count once when released.
#[derive(Debug)]
struct Lease {
    shared: Arc<Shared>,
    capability: Capability,
    held: bool,
}

impl Lease {
    fn take(shared: &Arc<Shared>, capability: Capability) -> Result<Self> {
        shared.acquire(capability)?;
        Ok(Self {
            shared: Arc::clone(shared),
            capability,
            held: true,
        })
    }

    fn release(&mut self) {
        if self.held {
            self.shared.release(self.capability);
            self.held = false;
        }
    }
}

// === Microphone ===

#[derive(Debug)]
struct SimMicrophone(Arc<Shared>);

#[derive(Debug)]
struct SimAudioStream {
    lease: Lease,
    level: watch::Receiver<f64>,
}

impl Device for SimAudioStream {
    fn release(&mut self) {
        self.lease.release();
    }
}

#[async_trait::async_trait]
impl AudioStream for SimAudioStream {
    async fn next_frame(&mut self) -> Option<Vec<u8>> {
        if !self.lease.held || self.lease.shared.is_closed() {
            return None;
        }
        let level = *self.level.borrow_and_update();
        Some(frame_for_level(level, FRAME_BINS))
    }
}

#[async_trait::async_trait]
impl Microphone for SimMicrophone {
    async fn request_audio_stream(&self) -> Result<Acquired<dyn AudioStream>> {
        let lease = Lease::take(&self.0, Capability::Microphone)?;
        let stream: Box<dyn AudioStream> = Box::new(SimAudioStream {
            lease,
            level: self.0.level.subscribe(),
        });
        Ok(Acquired::new(stream))
    }
}

// === Camera ===

#[derive(Debug)]
struct SimCamera(Arc<Shared>);

#[derive(Debug)]
struct SimVideoStream {
    lease: Lease,
    facing: Facing,
}

impl Device for SimVideoStream {
    fn release(&mut self) {
        self.lease.release();
    }
}

#[async_trait::async_trait]
impl VideoStream for SimVideoStream {
    async fn grab_frame(&mut self) -> Result<Photo> {
        if !self.lease.held {
            return Err(CapabilityError::transient(Capability::Camera, "stream released"));
        }
        let (width, height) = PHOTO_SIZE;
        trace!(facing = ?self.facing, "Simulated frame grabbed");
        Ok(Photo {
            width,
            height,
            data: Vec::new(),
        })
    }
}

#[async_trait::async_trait]
impl Camera for SimCamera {
    async fn request_video_stream(&self, facing: Facing) -> Result<Acquired<dyn VideoStream>> {
        let lease = Lease::take(&self.0, Capability::Camera)?;
        let stream: Box<dyn VideoStream> = Box::new(SimVideoStream { lease, facing });
        Ok(Acquired::new(stream))
    }
}

// === Geolocation ===

#[derive(Debug)]
struct SimGeolocation(Arc<Shared>);

#[derive(Debug)]
struct SimPositionWatch {
    lease: Lease,
    position: watch::Receiver<Option<Result<Coordinates>>>,
}

impl Device for SimPositionWatch {
    fn release(&mut self) {
        self.lease.release();
    }
}

#[async_trait::async_trait]
impl PositionWatch for SimPositionWatch {
    async fn next_update(&mut self) -> Option<Result<Coordinates>> {
        let closed = self.lease.shared.closed.subscribe();
        loop {
            tokio::select! {
                () = wait_closed(closed.clone()) => return None,
                changed = self.position.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    if let Some(update) = self.position.borrow_and_update().clone() {
                        return Some(update);
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Geolocation for SimGeolocation {
    async fn watch_position(&self) -> Result<Acquired<dyn PositionWatch>> {
        let lease = Lease::take(&self.0, Capability::Geolocation)?;
        let mut position = self.0.position.subscribe();
        // Deliver the current fix, if any, as the first update
        if position.borrow().is_some() {
            position.mark_changed();
        }
        let watch: Box<dyn PositionWatch> = Box::new(SimPositionWatch { lease, position });
        Ok(Acquired::new(watch))
    }
}

// === Speech recognition ===

#[derive(Debug)]
struct SimSpeech(Arc<Shared>);

#[derive(Debug)]
struct SimTranscriptStream {
    lease: Lease,
    events: broadcast::Receiver<SpeechEvent>,
}

impl Device for SimTranscriptStream {
    fn release(&mut self) {
        self.lease.release();
    }
}

#[async_trait::async_trait]
impl TranscriptStream for SimTranscriptStream {
    async fn next_transcript(&mut self) -> Option<Result<String>> {
        let closed = self.lease.shared.closed.subscribe();
        loop {
            tokio::select! {
                () = wait_closed(closed.clone()) => return None,
                event = self.events.recv() => match event {
                    Ok(SpeechEvent::Transcript(text)) => return Some(Ok(text)),
                    Ok(SpeechEvent::Error(e)) => return Some(Err(e)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Recognizer fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for SimSpeech {
    async fn start_recognition(&self) -> Result<Acquired<dyn TranscriptStream>> {
        let lease = Lease::take(&self.0, Capability::SpeechRecognition)?;
        let stream: Box<dyn TranscriptStream> = Box::new(SimTranscriptStream {
            lease,
            events: self.0.speech.subscribe(),
        });
        Ok(Acquired::new(stream))
    }
}

// === Haptics ===

#[derive(Debug)]
struct SimHaptics(Arc<Shared>);

impl Haptics for SimHaptics {
    fn vibrate(&self, pattern: &[u32]) -> Result<()> {
        self.0.check(Capability::Vibration)?;
        self.0
            .vibrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pattern.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::process_level;
    use std::time::Duration;

    #[test]
    fn test_platform_name() {
        assert_eq!(platform_name(), "simulator");
    }

    #[tokio::test]
    async fn test_audio_stream_reports_pushed_level() {
        let sim = Simulator::new();
        let devices = sim.devices();
        let mut stream = devices.microphone.request_audio_stream().await.unwrap();

        sim.push_level(85.0);
        let frame = stream.next_frame().await.unwrap();
        assert!((process_level(&frame) - 85.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_denied_capability() {
        let sim = Simulator::new();
        sim.deny(Capability::Microphone);
        let err = sim.devices().microphone.request_audio_stream().await.unwrap_err();
        assert!(err.is_permission_error());
        assert_eq!(sim.active_streams(Capability::Microphone), 0);
    }

    #[tokio::test]
    async fn test_unsupported_capability() {
        let sim = Simulator::new();
        sim.set_access(Capability::SpeechRecognition, Access::Unsupported);
        let err = sim.devices().speech.start_recognition().await.unwrap_err();
        assert_eq!(err, CapabilityError::unsupported(Capability::SpeechRecognition));
    }

    #[tokio::test]
    async fn test_release_tracks_active_streams() {
        let sim = Simulator::new();
        let devices = sim.devices();
        let mut stream = devices.camera.request_video_stream(Facing::Environment).await.unwrap();
        assert_eq!(sim.active_streams(Capability::Camera), 1);

        let photo = stream.grab_frame().await.unwrap();
        assert_eq!((photo.width, photo.height), PHOTO_SIZE);

        stream.release();
        assert_eq!(sim.active_streams(Capability::Camera), 0);
        drop(stream);
        assert_eq!(sim.active_streams(Capability::Camera), 0);
    }

    #[tokio::test]
    async fn test_transcripts_reach_recognizer() {
        let sim = Simulator::new();
        let mut stream = sim.devices().speech.start_recognition().await.unwrap();

        assert_eq!(sim.say("help me"), 1);
        let text = tokio::time::timeout(Duration::from_secs(1), stream.next_transcript())
            .await
            .unwrap();
        assert_eq!(text, Some(Ok("help me".to_string())));
    }

    #[tokio::test]
    async fn test_position_watch_delivers_current_fix_first() {
        let sim = Simulator::new();
        sim.move_to(Coordinates::new(40.7128, -74.006));
        let mut watch = sim.devices().geolocation.watch_position().await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), watch.next_update())
            .await
            .unwrap();
        assert_eq!(first, Some(Ok(Coordinates::new(40.7128, -74.006))));

        sim.fail_location(3);
        let second = tokio::time::timeout(Duration::from_secs(1), watch.next_update())
            .await
            .unwrap();
        assert!(matches!(second, Some(Err(CapabilityError::TransientDevice { .. }))));
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let sim = Simulator::new();
        let devices = sim.devices();
        let mut audio = devices.microphone.request_audio_stream().await.unwrap();
        let mut speech = devices.speech.start_recognition().await.unwrap();

        sim.close();
        assert!(audio.next_frame().await.is_none());
        let ended = tokio::time::timeout(Duration::from_secs(1), speech.next_transcript())
            .await
            .unwrap();
        assert!(ended.is_none());
    }

    #[test]
    fn test_haptics_records_patterns() {
        let sim = Simulator::new();
        sim.devices().haptics.vibrate(&[100, 50]).unwrap();
        assert_eq!(sim.vibrations(), vec![vec![100, 50]]);

        sim.set_access(Capability::Vibration, Access::Unsupported);
        assert!(sim.devices().haptics.vibrate(&[100]).is_err());
    }
}
