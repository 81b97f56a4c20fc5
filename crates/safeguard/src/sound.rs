//! Sound level processing.
//!
//! A frame is a buffer of frequency-bin magnitudes (0..=255 each). The level
//! is the mean magnitude scaled by 1.2 and clamped to 100.

use serde::{Deserialize, Serialize};

/// Gain applied to the mean bin magnitude.
const LEVEL_GAIN: f64 = 1.2;

/// Highest possible level.
pub const MAX_LEVEL: f64 = 100.0;

/// Level above which the meter shows a warning.
const WARNING_LEVEL: f64 = 50.0;

/// Level above which the meter shows an emergency reading.
const EMERGENCY_LEVEL: f64 = 80.0;

/// Compute the sound level of one frame of frequency-bin magnitudes.
///
/// Pure: the same buffer always yields the same value in `[0, 100]`.
/// An empty frame is silent.
#[must_use]
pub fn process_level(bins: &[u8]) -> f64 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| u64::from(b)).sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = sum as f64 / bins.len() as f64;
    (mean * LEVEL_GAIN).min(MAX_LEVEL)
}

/// Whether a level counts as an emergency reading for `threshold`.
#[must_use]
pub fn is_emergency_level(level: f64, threshold: f64) -> bool {
    level > threshold
}

/// The latest sound reading and its derived verdict.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SoundSample {
    /// Level in `[0, 100]`.
    pub level: f64,
    /// Whether the level exceeded the configured threshold.
    pub is_emergency: bool,
}

impl SoundSample {
    /// Evaluate a level against `threshold`.
    #[must_use]
    pub fn new(level: f64, threshold: f64) -> Self {
        let level = level.clamp(0.0, MAX_LEVEL);
        Self {
            level,
            is_emergency: is_emergency_level(level, threshold),
        }
    }

    /// Display band of this reading.
    #[must_use]
    pub fn band(&self) -> LevelBand {
        LevelBand::for_level(self.level)
    }
}

/// Coarse display band of a sound level meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelBand {
    /// Up to 50.
    Safe,
    /// Above 50.
    Warning,
    /// Above 80.
    Emergency,
}

impl LevelBand {
    /// Band for a level.
    #[must_use]
    pub fn for_level(level: f64) -> Self {
        if level > EMERGENCY_LEVEL {
            Self::Emergency
        } else if level > WARNING_LEVEL {
            Self::Warning
        } else {
            Self::Safe
        }
    }
}

impl std::fmt::Display for LevelBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Warning => write!(f, "warning"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

/// Build a frame whose processed level is as close as possible to `level`.
///
/// Used by simulated microphones to turn scripted levels into bins.
#[must_use]
pub fn frame_for_level(level: f64, bins: usize) -> Vec<u8> {
    let magnitude = (level.clamp(0.0, MAX_LEVEL) / LEVEL_GAIN).round();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let magnitude = magnitude.min(255.0) as u8;
    vec![magnitude; bins.max(1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_level_mean_times_gain() {
        // mean 50 -> 60
        assert!((process_level(&[40, 60, 50, 50]) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_process_level_clamped() {
        assert!((process_level(&[255; 128]) - 100.0).abs() < f64::EPSILON);
        assert!((process_level(&[0; 128])).abs() < f64::EPSILON);
    }

    #[test]
    fn test_process_level_empty_is_silent() {
        assert!(process_level(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_process_level_is_pure() {
        let frame: Vec<u8> = (0..128u8).collect();
        let first = process_level(&frame);
        for _ in 0..10 {
            assert!((process_level(&frame) - first).abs() < f64::EPSILON);
        }
        assert!((0.0..=100.0).contains(&first));
    }

    #[test]
    fn test_process_level_bounded_for_all_uniform_frames() {
        for value in 0..=255u8 {
            let level = process_level(&[value; 16]);
            assert!((0.0..=100.0).contains(&level), "level {level} for {value}");
        }
    }

    #[test]
    fn test_is_emergency_level_strictly_above() {
        assert!(!is_emergency_level(80.0, 80.0));
        assert!(is_emergency_level(80.1, 80.0));
        assert!(!is_emergency_level(10.0, 80.0));
    }

    #[test]
    fn test_sound_sample_of_processed_frame() {
        let sample = SoundSample::new(process_level(&[80; 64]), 80.0);
        assert!((sample.level - 96.0).abs() < 1e-9);
        assert!(sample.is_emergency);
        assert_eq!(sample.band(), LevelBand::Emergency);
    }

    #[test]
    fn test_level_bands() {
        assert_eq!(LevelBand::for_level(10.0), LevelBand::Safe);
        assert_eq!(LevelBand::for_level(50.0), LevelBand::Safe);
        assert_eq!(LevelBand::for_level(50.5), LevelBand::Warning);
        assert_eq!(LevelBand::for_level(80.0), LevelBand::Warning);
        assert_eq!(LevelBand::for_level(85.0), LevelBand::Emergency);
    }

    #[test]
    fn test_frame_for_level_round_trips_closely() {
        for level in [0.0, 10.0, 40.0, 85.0, 95.0, 100.0] {
            let frame = frame_for_level(level, 128);
            assert_eq!(frame.len(), 128);
            assert!((process_level(&frame) - level).abs() <= 0.6, "level {level}");
        }
    }
}
