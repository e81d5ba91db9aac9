//! Capture trait definitions
//!
//! The platform that hands out capture handles is an external collaborator.
//! Everything the pipeline needs from it goes through `CapturePlatform`.

use crate::media::MediaStream;
use crate::utils::error::{StudioError, StudioResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Kind of an enumerable capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Camera
    VideoInput,
    /// Microphone
    AudioInput,
}

/// Information about a capture device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Unique device ID
    pub id: String,

    /// Human-readable device name
    pub label: String,

    pub kind: DeviceKind,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Parse a target height such as `"720p"` into a 16:9 resolution
    pub fn parse(input: &str) -> StudioResult<Self> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_suffix('p')
            .or_else(|| trimmed.strip_suffix('P'))
            .unwrap_or(trimmed);
        let height: u32 = digits
            .parse()
            .map_err(|_| StudioError::InvalidResolution(input.to_string()))?;
        if height == 0 {
            return Err(StudioError::InvalidResolution(input.to_string()));
        }
        Ok(Self::from_height(height))
    }

    /// 16:9 resolution with the given height
    pub fn from_height(height: u32) -> Self {
        Self {
            width: (height as u64 * 16 / 9) as u32,
            height,
        }
    }
}

/// Video part of an acquisition request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub device_id: Option<String>,
    pub height: Option<u32>,
}

/// Audio part of an acquisition request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    pub device_id: Option<String>,
}

/// What to acquire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaConstraints {
    pub video: Option<VideoConstraints>,
    pub audio: Option<AudioConstraints>,
}

impl MediaConstraints {
    /// Constraints for a display capture at an optional target height
    pub fn display(height: Option<u32>) -> Self {
        Self {
            video: Some(VideoConstraints {
                device_id: None,
                height,
            }),
            audio: None,
        }
    }

    /// Constraints for the device described by `device`
    pub fn for_device(device: &DeviceInfo, height: Option<u32>) -> Self {
        match device.kind {
            DeviceKind::VideoInput => Self {
                video: Some(VideoConstraints {
                    device_id: Some(device.id.clone()),
                    height,
                }),
                audio: None,
            },
            DeviceKind::AudioInput => Self {
                video: None,
                audio: Some(AudioConstraints {
                    device_id: Some(device.id.clone()),
                }),
            },
        }
    }

    pub fn target_height(&self) -> Option<u32> {
        self.video.as_ref().and_then(|v| v.height)
    }
}

/// Host platform that acquires capture handles.
///
/// Each acquisition resolves or fails exactly once; failures surface as
/// `StudioError::AcquisitionFailed` and are never retried here.
#[async_trait]
pub trait CapturePlatform: Send + Sync {
    /// Acquire a display capture handle
    async fn get_display_media(&self, constraints: &MediaConstraints) -> StudioResult<Arc<MediaStream>>;

    /// Acquire a camera and/or microphone handle
    async fn get_user_media(&self, constraints: &MediaConstraints) -> StudioResult<Arc<MediaStream>>;

    /// List the capture devices currently available
    async fn enumerate_devices(&self) -> Vec<DeviceInfo>;

    /// Whether a live handle's track set can be mutated in place
    fn supports_in_place_track_add(&self) -> bool;
}
