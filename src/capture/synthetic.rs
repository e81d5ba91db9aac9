//! Headless capture platform
//!
//! Hands out handles backed by solid-colour frames so the pipeline can run
//! without real devices. Devices can be denied to simulate a refused
//! permission prompt, and frame delivery can be deferred to exercise the
//! wait for natural dimensions.

use super::traits::{CapturePlatform, DeviceInfo, DeviceKind, MediaConstraints, Resolution};
use crate::media::{Dimensions, MediaStream, MediaTrack, VideoFrame};
use crate::utils::error::{StudioError, StudioResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Device id used for display capture in denial lists
pub const DISPLAY_ID: &str = "desktop";

#[derive(Debug, Clone)]
struct SyntheticDevice {
    info: DeviceInfo,
    dimensions: Dimensions,
    color: [u8; 4],
}

struct Acquired {
    stream: Arc<MediaStream>,
    dimensions: Dimensions,
    color: [u8; 4],
}

pub struct SyntheticPlatform {
    display: Dimensions,
    devices: RwLock<Vec<SyntheticDevice>>,
    denied: RwLock<HashSet<String>>,
    acquired: RwLock<Vec<Acquired>>,
    in_place_track_add: bool,
    defer_frames: bool,
}

impl Default for SyntheticPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticPlatform {
    /// A 1920x1080 display and no devices
    pub fn new() -> Self {
        Self {
            display: Dimensions::new(1920, 1080),
            devices: RwLock::new(Vec::new()),
            denied: RwLock::new(HashSet::new()),
            acquired: RwLock::new(Vec::new()),
            in_place_track_add: true,
            defer_frames: false,
        }
    }

    pub fn with_display(mut self, width: u32, height: u32) -> Self {
        self.display = Dimensions::new(width, height);
        self
    }

    pub fn with_camera(self, id: &str, label: &str, width: u32, height: u32) -> Self {
        let color = Self::color_for(self.devices.read().len());
        self.devices.write().push(SyntheticDevice {
            info: DeviceInfo {
                id: id.to_string(),
                label: label.to_string(),
                kind: DeviceKind::VideoInput,
            },
            dimensions: Dimensions::new(width, height),
            color,
        });
        self
    }

    pub fn with_microphone(self, id: &str, label: &str) -> Self {
        self.devices.write().push(SyntheticDevice {
            info: DeviceInfo {
                id: id.to_string(),
                label: label.to_string(),
                kind: DeviceKind::AudioInput,
            },
            dimensions: Dimensions::new(0, 0),
            color: [0, 0, 0, 0],
        });
        self
    }

    /// Platforms without in-place track attachment force handle rebuilds
    pub fn with_in_place_track_add(mut self, supported: bool) -> Self {
        self.in_place_track_add = supported;
        self
    }

    /// Do not publish a first frame on acquisition; see `emit_frames`
    pub fn with_deferred_frames(mut self, defer: bool) -> Self {
        self.defer_frames = defer;
        self
    }

    /// Refuse acquisition of `id` (use `DISPLAY_ID` for display capture)
    pub fn deny(&self, id: &str) {
        self.denied.write().insert(id.to_string());
    }

    pub fn allow(&self, id: &str) {
        self.denied.write().remove(id);
    }

    /// Publish a fresh frame on every live handle handed out so far
    pub fn emit_frames(&self) {
        let mut acquired = self.acquired.write();
        acquired.retain(|a| a.stream.is_active());
        for a in acquired.iter().filter(|a| a.dimensions.width > 0) {
            a.stream
                .push_frame(VideoFrame::solid(a.dimensions.width, a.dimensions.height, a.color));
        }
    }

    fn color_for(index: usize) -> [u8; 4] {
        const PALETTE: [[u8; 4]; 4] = [
            [220, 40, 40, 255],
            [40, 180, 60, 255],
            [40, 90, 220, 255],
            [230, 200, 40, 255],
        ];
        PALETTE[index % PALETTE.len()]
    }

    fn check_allowed(&self, id: &str) -> StudioResult<()> {
        if self.denied.read().contains(id) {
            return Err(StudioError::AcquisitionFailed(format!(
                "permission denied for {id}"
            )));
        }
        Ok(())
    }

    fn hand_out(&self, stream: Arc<MediaStream>, dimensions: Dimensions, color: [u8; 4]) -> Arc<MediaStream> {
        if !self.defer_frames && dimensions.width > 0 {
            stream.push_frame(VideoFrame::solid(dimensions.width, dimensions.height, color));
        }
        self.acquired.write().push(Acquired {
            stream: stream.clone(),
            dimensions,
            color,
        });
        stream
    }

    fn scaled(dimensions: Dimensions, target_height: Option<u32>) -> Dimensions {
        match target_height {
            Some(height) => {
                let res = Resolution::from_height(height);
                Dimensions::new(res.width, res.height)
            }
            None => dimensions,
        }
    }
}

#[async_trait]
impl CapturePlatform for SyntheticPlatform {
    async fn get_display_media(&self, constraints: &MediaConstraints) -> StudioResult<Arc<MediaStream>> {
        self.check_allowed(DISPLAY_ID)?;
        let dimensions = Self::scaled(self.display, constraints.target_height());
        let stream = MediaStream::new(vec![MediaTrack::video("Screen")]);
        tracing::debug!(
            "Synthetic display capture {}x{}",
            dimensions.width,
            dimensions.height
        );
        Ok(self.hand_out(stream, dimensions, [30, 30, 30, 255]))
    }

    async fn get_user_media(&self, constraints: &MediaConstraints) -> StudioResult<Arc<MediaStream>> {
        let requested = constraints
            .video
            .as_ref()
            .and_then(|v| v.device_id.clone())
            .or_else(|| constraints.audio.as_ref().and_then(|a| a.device_id.clone()))
            .ok_or_else(|| StudioError::AcquisitionFailed("no device requested".to_string()))?;
        self.check_allowed(&requested)?;

        let device = self
            .devices
            .read()
            .iter()
            .find(|d| d.info.id == requested)
            .cloned()
            .ok_or_else(|| StudioError::AcquisitionFailed(format!("device {requested} unavailable")))?;

        match device.info.kind {
            DeviceKind::VideoInput => {
                let dimensions = Self::scaled(device.dimensions, constraints.target_height());
                let stream = MediaStream::new(vec![MediaTrack::video(device.info.label.clone())]);
                Ok(self.hand_out(stream, dimensions, device.color))
            }
            DeviceKind::AudioInput => {
                let stream = MediaStream::new(vec![MediaTrack::audio(device.info.label.clone())]);
                Ok(self.hand_out(stream, Dimensions::new(0, 0), device.color))
            }
        }
    }

    async fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        self.devices.read().iter().map(|d| d.info.clone()).collect()
    }

    fn supports_in_place_track_add(&self) -> bool {
        self.in_place_track_add
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_display_capture_reports_dimensions() {
        let platform = SyntheticPlatform::new().with_display(2560, 1440);
        let stream = platform
            .get_display_media(&MediaConstraints::display(None))
            .await
            .unwrap();
        assert_eq!(stream.dimensions(), Some(Dimensions::new(2560, 1440)));

        let scaled = platform
            .get_display_media(&MediaConstraints::display(Some(720)))
            .await
            .unwrap();
        assert_eq!(scaled.dimensions(), Some(Dimensions::new(1280, 720)));
    }

    #[tokio::test]
    async fn test_denied_device_fails_acquisition() {
        let platform = SyntheticPlatform::new().with_camera("cam", "FaceTime HD", 640, 480);
        platform.deny("cam");
        let devices = platform.enumerate_devices().await;
        let err = platform
            .get_user_media(&MediaConstraints::for_device(&devices[0], None))
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::AcquisitionFailed(_)));

        platform.allow("cam");
        assert!(platform
            .get_user_media(&MediaConstraints::for_device(&devices[0], None))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_deferred_frames() {
        let platform = SyntheticPlatform::new()
            .with_camera("cam", "Camera", 640, 480)
            .with_deferred_frames(true);
        let devices = platform.enumerate_devices().await;
        let stream = platform
            .get_user_media(&MediaConstraints::for_device(&devices[0], None))
            .await
            .unwrap();
        assert!(stream.dimensions().is_none());

        platform.emit_frames();
        assert_eq!(stream.dimensions(), Some(Dimensions::new(640, 480)));
    }
}
