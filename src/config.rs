//! Studio configuration
//!
//! Loaded from a JSON file; every field falls back to its default.

use crate::media::Dimensions;
use crate::recorder::codec::default_codec_preferences;
use crate::recorder::RecorderOptions;
use crate::utils::error::StudioResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioConfig {
    pub canvas: CanvasConfig,
    /// Frames per second of the shared frame loop
    pub frame_rate: u32,
    pub recorder: RecorderConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    pub start_delay_ms: u64,
    pub title: String,
    pub codec_preferences: Vec<String>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            frame_rate: 30,
            recorder: RecorderConfig::default(),
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            start_delay_ms: 0,
            title: "Recording".to_string(),
            codec_preferences: default_codec_preferences(),
        }
    }
}

impl StudioConfig {
    /// Read a JSON config file
    pub fn load(path: &Path) -> StudioResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: StudioConfig = serde_json::from_str(&json)?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn canvas_dimensions(&self) -> Dimensions {
        Dimensions::new(self.canvas.width, self.canvas.height)
    }

    /// Interval of the frame loop
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.frame_rate.max(1) as u64)
    }

    pub fn recorder_options(&self) -> RecorderOptions {
        RecorderOptions {
            title: self.recorder.title.clone(),
            start_delay: Duration::from_millis(self.recorder.start_delay_ms),
            codec_preferences: self.recorder.codec_preferences.clone(),
            ..Default::default()
        }
    }
}
