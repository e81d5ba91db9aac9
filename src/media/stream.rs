//! Capture handles
//!
//! A `MediaStream` is the live handle handed out by the capture platform. It
//! is shared by reference (`Arc`) between the source that owns it and every
//! renderer or recorder that consumes it; identity is pointer identity.
//!
//! Frames belong to the video track, not the handle. A handle rebuilt around
//! the same video track keeps receiving live frames.

use super::frame::{wait_for_dimensions, Dimensions, FrameFeed, FrameReceiver, VideoFrame};
use super::track::{MediaTrack, TrackKind};
use crate::utils::error::StudioResult;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
pub struct MediaStream {
    id: String,
    tracks: RwLock<Vec<MediaTrack>>,
    /// Feed of a handle without a video track
    fallback: FrameFeed,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            tracks: RwLock::new(tracks),
            fallback: FrameFeed::new(),
        })
    }

    /// Unique handle id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether both refer to the same handle
    pub fn same_handle(a: &Arc<MediaStream>, b: &Arc<MediaStream>) -> bool {
        Arc::ptr_eq(a, b)
    }

    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.read().clone()
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Video)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<MediaTrack> {
        self.tracks
            .read()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    /// Run `f` on the feed of the first video track
    fn with_feed<R>(&self, f: impl FnOnce(&FrameFeed) -> R) -> R {
        let tracks = self.tracks.read();
        match tracks.iter().find(|t| t.kind() == TrackKind::Video) {
            Some(track) => f(track.feed()),
            None => f(&self.fallback),
        }
    }

    pub fn has_track(&self, track: &MediaTrack) -> bool {
        self.tracks.read().iter().any(|t| t.same_track(track))
    }

    /// Attach a track to this handle in place
    pub fn add_track(&self, track: MediaTrack) {
        let mut tracks = self.tracks.write();
        if !tracks.iter().any(|t| t.same_track(&track)) {
            tracks.push(track);
        }
    }

    /// End every track carried by this handle
    pub fn stop_all(&self) {
        for track in self.tracks.read().iter() {
            track.stop();
        }
    }

    /// A handle is live while any of its tracks is
    pub fn is_active(&self) -> bool {
        self.tracks.read().iter().any(|t| !t.is_ended())
    }

    /// Record the natural size of the video carried by this handle
    pub fn report_dimensions(&self, dimensions: Dimensions) {
        self.with_feed(|feed| feed.report_dimensions(dimensions));
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        self.with_feed(FrameFeed::dimensions)
    }

    /// Wait until the handle reports its natural dimensions
    pub async fn natural_dimensions(&self) -> StudioResult<Dimensions> {
        let rx = self.with_feed(FrameFeed::subscribe_dimensions);
        wait_for_dimensions(rx, &self.id).await
    }

    /// Publish a new frame. The first frame also reports the natural dimensions.
    pub fn push_frame(&self, frame: VideoFrame) {
        self.with_feed(|feed| feed.push_frame(frame));
    }

    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.with_feed(FrameFeed::latest_frame)
    }

    pub fn subscribe_frames(&self) -> FrameReceiver {
        self.with_feed(FrameFeed::subscribe_frames)
    }
}
