//! Media primitives
//!
//! Capture handles, tracks, frames and the canvas surface, plus the audio
//! grafting strategy shared by the source manager and the compositor.

pub mod canvas;
pub mod frame;
pub mod stream;
pub mod track;

pub use canvas::Canvas;
pub use frame::{Dimensions, FrameFeed, FrameReceiver, VideoFrame};
pub use stream::MediaStream;
pub use track::{MediaTrack, TrackKind};

use std::sync::Arc;

/// How a track is added to a live handle.
///
/// Selected once from the platform's capabilities and never re-probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackGraftMode {
    /// The platform can mutate a live handle's track set
    InPlace,
    /// A new handle must be built from the union of tracks. The rebuilt
    /// handle shares the live tracks, frames included.
    Rebuild,
}

impl TrackGraftMode {
    pub fn from_capability(supports_in_place: bool) -> Self {
        if supports_in_place {
            Self::InPlace
        } else {
            Self::Rebuild
        }
    }
}

/// Result of grafting a track onto a handle
#[derive(Debug, Clone)]
pub enum GraftOutcome {
    /// Same handle, new track attached
    Mutated(Arc<MediaStream>),
    /// New handle; holders of the old one must resubscribe
    Replaced(Arc<MediaStream>),
    /// Track already present or ended; nothing changed
    Unchanged,
}

/// Graft `track` onto `stream` according to `mode`
pub fn graft_track(mode: TrackGraftMode, stream: &Arc<MediaStream>, track: MediaTrack) -> GraftOutcome {
    if track.is_ended() || stream.has_track(&track) {
        tracing::debug!("Skipping graft of track {} onto {}", track.id(), stream.id());
        return GraftOutcome::Unchanged;
    }

    match mode {
        TrackGraftMode::InPlace => {
            stream.add_track(track);
            GraftOutcome::Mutated(stream.clone())
        }
        TrackGraftMode::Rebuild => {
            // Video first so the rebuilt handle reads the same feed
            let mut tracks = stream.tracks();
            tracks.push(track);
            GraftOutcome::Replaced(MediaStream::new(tracks))
        }
    }
}
