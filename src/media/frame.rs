//! Raw video frames

use crate::utils::error::{StudioError, StudioResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

pub type FrameReceiver = watch::Receiver<Option<Arc<VideoFrame>>>;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

/// Latest frame and natural dimensions of one video feed.
///
/// Lives on the video track, so every handle carrying the track sees the
/// same frames.
#[derive(Debug)]
pub struct FrameFeed {
    dimensions: watch::Sender<Option<Dimensions>>,
    frame: watch::Sender<Option<Arc<VideoFrame>>>,
}

impl Default for FrameFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameFeed {
    pub fn new() -> Self {
        let (dimensions, _) = watch::channel(None);
        let (frame, _) = watch::channel(None);
        Self { dimensions, frame }
    }

    pub fn report_dimensions(&self, dimensions: Dimensions) {
        self.dimensions.send_replace(Some(dimensions));
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        *self.dimensions.borrow()
    }

    pub fn subscribe_dimensions(&self) -> watch::Receiver<Option<Dimensions>> {
        self.dimensions.subscribe()
    }

    /// Publish a new frame. A size change also reports new dimensions.
    pub fn push_frame(&self, frame: VideoFrame) {
        let dims = frame.dimensions();
        if self.dimensions() != Some(dims) {
            self.report_dimensions(dims);
        }
        self.frame.send_replace(Some(Arc::new(frame)));
    }

    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.frame.borrow().clone()
    }

    pub fn subscribe_frames(&self) -> FrameReceiver {
        self.frame.subscribe()
    }
}

/// Wait until `rx` carries dimensions
pub(crate) async fn wait_for_dimensions(
    mut rx: watch::Receiver<Option<Dimensions>>,
    handle: &str,
) -> StudioResult<Dimensions> {
    let closed = || StudioError::AcquisitionFailed(format!("stream {handle} closed"));
    let dims = rx.wait_for(|d| d.is_some()).await.map_err(|_| closed())?;
    (*dims).ok_or_else(closed)
}

/// An RGBA8 video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA pixel data, row-major
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Create a frame filled with a single colour
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// RGBA value at (x, y), if inside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 4;
        let px = self.data.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}
