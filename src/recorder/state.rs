//! Recording state management
//!
//! Defines the recording state machine and the options a recorder is built with.

use super::artifact::Flavor;
use super::codec::default_codec_preferences;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Current state of a capture recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No session
    #[default]
    Idle,
    /// Currently recording
    Recording,
    /// Recording is paused
    Paused,
    /// Last session finalized; the next start opens a fresh one
    Stopped,
}

impl RecordingState {
    /// Whether a session is open
    pub fn is_active(&self) -> bool {
        matches!(self, RecordingState::Recording | RecordingState::Paused)
    }
}

/// Configuration for a capture recorder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderOptions {
    /// Title used in artifact filenames
    pub title: String,

    pub flavor: Flavor,

    /// Wait before the platform recorder is started
    #[serde(with = "millis")]
    pub start_delay: Duration,

    /// Codecs in order of preference; the first supported one wins
    pub codec_preferences: Vec<String>,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            title: "Recording".to_string(),
            flavor: Flavor::Presenter,
            start_delay: Duration::ZERO,
            codec_preferences: default_codec_preferences(),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
