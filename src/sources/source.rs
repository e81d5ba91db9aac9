//! Source records

use crate::capture::DeviceInfo;
use crate::media::MediaStream;
use crate::recorder::{CaptureRecorder, Flavor, RecordingState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Id of the synthetic display-capture source
pub const DESKTOP_ID: &str = "desktop";

/// Id of the compositor's derived source
pub const COMPOSITE_ID: &str = "composite";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Video,
    Audio,
    Desktop,
    Composite,
    Peer,
}

impl SourceKind {
    /// Publication flavor for recordings of this kind
    pub fn flavor(&self) -> Flavor {
        match self {
            SourceKind::Desktop | SourceKind::Composite => Flavor::Presentation,
            SourceKind::Video | SourceKind::Audio | SourceKind::Peer => Flavor::Presenter,
        }
    }
}

/// A capture source and the handle it currently owns
pub struct Source {
    pub id: String,
    pub kind: SourceKind,
    pub device: Option<DeviceInfo>,
    pub(crate) stream: Option<Arc<MediaStream>>,
    pub(crate) recorder: Option<CaptureRecorder>,
    /// Target height requested at the last connect
    pub(crate) target_height: Option<u32>,
    pub active: bool,
}

impl Source {
    pub fn new(id: impl Into<String>, kind: SourceKind, device: Option<DeviceInfo>) -> Self {
        Self {
            id: id.into(),
            kind,
            device,
            stream: None,
            recorder: None,
            target_height: None,
            active: false,
        }
    }

    pub fn stream(&self) -> Option<&Arc<MediaStream>> {
        self.stream.as_ref()
    }

    /// Target height requested at the last connect, if any
    pub fn target_height(&self) -> Option<u32> {
        self.target_height
    }

    /// Whether the source holds a live handle
    pub fn has_active_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_active())
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recorder
            .as_ref()
            .map_or(RecordingState::Idle, |r| r.state())
    }

    /// Stop every track and drop the handle; returns whether there was one
    pub(crate) fn tear_down(&mut self) -> bool {
        self.active = false;
        match self.stream.take() {
            Some(stream) => {
                stream.stop_all();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream", &self.stream.as_ref().map(|s| s.id().to_string()))
            .field("active", &self.active)
            .finish()
    }
}
