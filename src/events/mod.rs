//! Event bus
//!
//! The bus is the only coupling between the source manager, the compositor
//! and the recorders: each holds an `Arc<EventBus>` and none hold references
//! to each other.

pub mod bus;

pub use bus::EventBus;

use crate::media::{MediaStream, MediaTrack};
use crate::recorder::RecordingArtifact;
use crate::sources::SourceKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Event names handlers register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A handle was attached to or replaced on a source
    Stream,
    /// An existing handle gained a merged audio track
    StreamMute,
    /// A derived handle went away (the composite stopped)
    StreamRemove,
    /// A recording is about to be finalized
    RecordPrepare,
    /// A recording artifact is ready
    RecordComplete,
    /// The underlying recorder reported a runtime failure
    RecordError,
    /// A source's handle was torn down
    RecordStopStreamRemove,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Stream => "stream",
            EventKind::StreamMute => "stream.mute",
            EventKind::StreamRemove => "stream.remove",
            EventKind::RecordPrepare => "record.prepare",
            EventKind::RecordComplete => "record.complete",
            EventKind::RecordError => "record.error",
            EventKind::RecordStopStreamRemove => "record.stop.stream.remove",
        }
    }
}

/// Events carried on the bus
#[derive(Debug, Clone)]
pub enum StudioEvent {
    Stream {
        source_id: String,
        kind: SourceKind,
        stream: Arc<MediaStream>,
    },
    StreamMute {
        source_id: String,
        stream: Arc<MediaStream>,
        track: MediaTrack,
    },
    StreamRemove {
        source_id: String,
    },
    RecordPrepare {
        source_id: String,
        label: String,
    },
    RecordComplete(Arc<RecordingArtifact>),
    RecordError {
        source_id: String,
        message: String,
    },
    RecordStopStreamRemove {
        source_id: String,
    },
}

impl StudioEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StudioEvent::Stream { .. } => EventKind::Stream,
            StudioEvent::StreamMute { .. } => EventKind::StreamMute,
            StudioEvent::StreamRemove { .. } => EventKind::StreamRemove,
            StudioEvent::RecordPrepare { .. } => EventKind::RecordPrepare,
            StudioEvent::RecordComplete(_) => EventKind::RecordComplete,
            StudioEvent::RecordError { .. } => EventKind::RecordError,
            StudioEvent::RecordStopStreamRemove { .. } => EventKind::RecordStopStreamRemove,
        }
    }

    /// Source the event concerns
    pub fn source_id(&self) -> &str {
        match self {
            StudioEvent::Stream { source_id, .. }
            | StudioEvent::StreamMute { source_id, .. }
            | StudioEvent::StreamRemove { source_id }
            | StudioEvent::RecordPrepare { source_id, .. }
            | StudioEvent::RecordError { source_id, .. }
            | StudioEvent::RecordStopStreamRemove { source_id } => source_id,
            StudioEvent::RecordComplete(artifact) => &artifact.id,
        }
    }
}
