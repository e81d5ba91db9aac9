//! Compositor
//!
//! Paints every admitted source onto one canvas once per frame and exposes
//! the canvas as the composite stream. The composite can be recorded like
//! any other handle. When the composite is replaced (restart on resize, or a
//! rebuilt handle carrying new audio) an open recording follows it.

pub mod layout;

pub use layout::{get_default_offsets, get_position, Placement, MAX_TILES};

use crate::capture::Resolution;
use crate::events::{EventBus, StudioEvent};
use crate::media::{
    graft_track, Canvas, Dimensions, GraftOutcome, MediaStream, MediaTrack, TrackGraftMode,
};
use crate::recorder::{
    CaptureRecorder, Flavor, RecorderBackend, RecorderOptions, RecordingArtifact, RecordingState,
};
use crate::scheduler::FrameScheduler;
use crate::sources::{SourceKind, COMPOSITE_ID};
use crate::utils::error::{StudioError, StudioResult};
use crate::utils::token::Token;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;

/// A source's rectangle on the canvas
#[derive(Debug, Clone)]
pub struct Tile {
    pub source_id: String,
    pub kind: SourceKind,
    pub stream: Arc<MediaStream>,
    pub placement: Placement,
    /// Cleared when the handle ends; set again when the source is re-added
    pub active: bool,
}

struct CompositorState {
    canvas: Canvas,
    tiles: HashMap<String, Tile>,
    paint_order: Vec<String>,
    /// Admitted but still waiting for natural dimensions
    pending: HashMap<String, Arc<MediaStream>>,
    composite: Option<Arc<MediaStream>>,
    frame_token: Option<Token>,
    /// Audio handed to the compositor directly, kept across restarts
    audio_tracks: Vec<MediaTrack>,
}

impl CompositorState {
    fn placements(&self) -> Vec<Placement> {
        self.paint_order
            .iter()
            .filter_map(|id| self.tiles.get(id))
            .map(|t| t.placement)
            .collect()
    }

    /// Audio to carry on a fresh composite: cached tracks plus every tile's
    fn composite_audio(&self) -> Vec<MediaTrack> {
        let mut tracks: Vec<MediaTrack> = Vec::new();
        let from_tiles = self
            .paint_order
            .iter()
            .filter_map(|id| self.tiles.get(id))
            .flat_map(|t| t.stream.audio_tracks());
        for track in self.audio_tracks.iter().cloned().chain(from_tiles) {
            if !track.is_ended() && !tracks.iter().any(|t| t.same_track(&track)) {
                tracks.push(track);
            }
        }
        tracks
    }
}

struct CompositorInner {
    bus: Arc<EventBus>,
    scheduler: Arc<FrameScheduler>,
    backend: Arc<dyn RecorderBackend>,
    recorder_options: RecorderOptions,
    graft_mode: TrackGraftMode,
    state: Mutex<CompositorState>,
    recorder: tokio::sync::Mutex<Option<CaptureRecorder>>,
}

/// Cheap to clone; clones share one canvas
#[derive(Clone)]
pub struct Compositor {
    inner: Arc<CompositorInner>,
}

impl Compositor {
    pub fn new(
        bus: Arc<EventBus>,
        scheduler: Arc<FrameScheduler>,
        backend: Arc<dyn RecorderBackend>,
        graft_mode: TrackGraftMode,
        canvas: Dimensions,
        recorder_options: RecorderOptions,
    ) -> Self {
        let recorder_options = RecorderOptions {
            flavor: Flavor::Presentation,
            ..recorder_options
        };
        Self {
            inner: Arc::new(CompositorInner {
                bus,
                scheduler,
                backend,
                recorder_options,
                graft_mode,
                state: Mutex::new(CompositorState {
                    canvas: Canvas::new(canvas.width, canvas.height),
                    tiles: HashMap::new(),
                    paint_order: Vec::new(),
                    pending: HashMap::new(),
                    composite: None,
                    frame_token: None,
                    audio_tracks: Vec::new(),
                }),
                recorder: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn graft_mode(&self) -> TrackGraftMode {
        self.inner.graft_mode
    }

    pub fn canvas_dimensions(&self) -> Dimensions {
        self.inner.state.lock().canvas.dimensions()
    }

    /// Tiles in paint order
    pub fn tiles(&self) -> Vec<Tile> {
        let state = self.inner.state.lock();
        state
            .paint_order
            .iter()
            .filter_map(|id| state.tiles.get(id))
            .cloned()
            .collect()
    }

    pub fn tile(&self, id: &str) -> Option<Tile> {
        self.inner.state.lock().tiles.get(id).cloned()
    }

    pub fn paint_order(&self) -> Vec<String> {
        self.inner.state.lock().paint_order.clone()
    }

    /// Sources admitted but not yet placed
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn composite(&self) -> Option<Arc<MediaStream>> {
        self.inner.state.lock().composite.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().frame_token.is_some()
    }

    /// Admit a source's handle onto the canvas.
    ///
    /// Admission (the capacity check and handle swap) happens before this
    /// returns; the returned future places the tile once the handle reports
    /// its natural dimensions.
    pub fn add_stream(
        &self,
        id: &str,
        kind: SourceKind,
        stream: Arc<MediaStream>,
    ) -> impl Future<Output = StudioResult<()>> + Send + 'static {
        let admitted = self.admit(id, kind, stream);
        let compositor = self.clone();
        let id = id.to_string();
        async move {
            match admitted? {
                Some(stream) => compositor.place_when_ready(id, kind, stream).await,
                None => Ok(()),
            }
        }
    }

    /// `Some(handle)` when the caller must wait for dimensions
    fn admit(
        &self,
        id: &str,
        kind: SourceKind,
        stream: Arc<MediaStream>,
    ) -> StudioResult<Option<Arc<MediaStream>>> {
        let mut state = self.inner.state.lock();
        if let Some(tile) = state.tiles.get_mut(id) {
            tile.active = true;
            if MediaStream::same_handle(&tile.stream, &stream) {
                return Ok(None);
            }
            tracing::info!("Swapping handle of tile {}", id);
            tile.stream = stream.clone();
            drop(state);
            self.merge_audio_from(&stream);
            return Ok(None);
        }

        if let Some(waiting) = state.pending.get_mut(id) {
            // The latest handle wins once dimensions arrive
            *waiting = stream;
            return Ok(None);
        }

        if state.tiles.len() + state.pending.len() >= MAX_TILES {
            tracing::warn!("Cannot composite {}: {} tiles present", id, MAX_TILES);
            return Err(StudioError::CapacityExceeded(MAX_TILES));
        }
        state.pending.insert(id.to_string(), stream.clone());
        Ok(Some(stream))
    }

    async fn place_when_ready(
        &self,
        id: String,
        kind: SourceKind,
        stream: Arc<MediaStream>,
    ) -> StudioResult<()> {
        let dimensions = match stream.natural_dimensions().await {
            Ok(dimensions) => dimensions,
            Err(err) => {
                self.inner.state.lock().pending.remove(&id);
                return Err(err);
            }
        };

        let stream = {
            let mut state = self.inner.state.lock();
            let Some(stream) = state.pending.remove(&id) else {
                tracing::debug!("{} was removed before it could be placed", id);
                return Ok(());
            };
            let is_desktop = kind == SourceKind::Desktop;
            let placement = get_position(
                is_desktop,
                dimensions,
                state.canvas.dimensions(),
                &state.placements(),
            );
            tracing::info!(
                "Placed {} at {},{} ({}x{})",
                id,
                placement.offset_x,
                placement.offset_y,
                placement.width,
                placement.height
            );
            state.tiles.insert(
                id.clone(),
                Tile {
                    source_id: id.clone(),
                    kind,
                    stream: stream.clone(),
                    placement,
                    active: true,
                },
            );
            if is_desktop {
                state.paint_order.insert(0, id);
            } else {
                state.paint_order.push(id);
            }
            stream
        };

        self.merge_audio_from(&stream);
        Ok(())
    }

    /// Remove a tile; the others keep their positions
    pub fn remove_stream(&self, id: &str) -> StudioResult<()> {
        let mut state = self.inner.state.lock();
        if state.pending.remove(id).is_some() {
            tracing::debug!("Cancelled pending tile {}", id);
            return Ok(());
        }
        if state.tiles.remove(id).is_none() {
            return Err(StudioError::NoSuchSource(id.to_string()));
        }
        state.paint_order.retain(|t| t != id);
        tracing::info!("Removed tile {}", id);
        Ok(())
    }

    /// Resize the canvas and rescale every tile. A running composition is
    /// restarted, which produces a new composite handle.
    pub fn resize(
        &self,
        width: Option<u32>,
        height: Option<u32>,
    ) -> StudioResult<Option<Arc<MediaStream>>> {
        let width = width.unwrap_or(DEFAULT_WIDTH);
        let height = height.unwrap_or(DEFAULT_HEIGHT);
        if width == 0 || height == 0 {
            return Err(StudioError::InvalidResolution(format!("{width}x{height}")));
        }

        let was_running = self.is_running();
        if was_running {
            self.stop();
        }

        {
            let mut state = self.inner.state.lock();
            let from = state.canvas.dimensions();
            let to = Dimensions::new(width, height);
            state.canvas.resize(width, height);
            for tile in state.tiles.values_mut() {
                tile.placement = tile.placement.rescale(from, to);
            }
            tracing::info!(
                "Canvas resized from {}x{} to {}x{}",
                from.width,
                from.height,
                width,
                height
            );
        }

        if was_running {
            return Ok(Some(self.start()));
        }
        Ok(None)
    }

    /// Resize to a 16:9 canvas of the given height, e.g. "720p"
    pub fn change_resolution(&self, resolution: &str) -> StudioResult<Option<Arc<MediaStream>>> {
        let target = Resolution::parse(resolution)?;
        self.resize(Some(target.width), Some(target.height))
    }

    /// Begin painting and publish the composite. Returns the existing
    /// composite if already running.
    pub fn start(&self) -> Arc<MediaStream> {
        let composite = {
            let mut state = self.inner.state.lock();
            if let (Some(_), Some(composite)) = (&state.frame_token, &state.composite) {
                return composite.clone();
            }

            let mut tracks = vec![MediaTrack::video("Composite canvas")];
            tracks.extend(state.composite_audio());
            let composite = MediaStream::new(tracks);
            composite.report_dimensions(state.canvas.dimensions());
            state.composite = Some(composite.clone());

            let weak: Weak<CompositorInner> = Arc::downgrade(&self.inner);
            let token = self.inner.scheduler.subscribe(move |_| {
                if let Some(inner) = weak.upgrade() {
                    Compositor { inner }.draw();
                }
            });
            state.frame_token = Some(token);
            composite
        };

        self.draw();
        tracing::info!(
            "Composition started with {} audio tracks",
            composite.audio_tracks().len()
        );
        self.inner.bus.emit(StudioEvent::Stream {
            source_id: COMPOSITE_ID.to_string(),
            kind: SourceKind::Composite,
            stream: composite.clone(),
        });
        self.follow_composite(composite.clone());
        composite
    }

    /// Hand a new composite to an open recording session. Without a runtime
    /// there is no session to follow it.
    fn follow_composite(&self, composite: Arc<MediaStream>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner = self.inner.clone();
        runtime.spawn(async move {
            let mut recorder = inner.recorder.lock().await;
            let Some(recorder) = recorder.as_mut() else {
                return;
            };
            if !recorder.state().is_active() {
                return;
            }
            // A later restart may have replaced this handle already
            let current = inner.state.lock().composite.clone();
            if !current.is_some_and(|c| MediaStream::same_handle(&c, &composite)) {
                return;
            }
            if let Err(err) = recorder.rebind(composite).await {
                tracing::warn!("Composite recording lost its handle: {}", err);
            }
        });
    }

    /// Stop painting and drop the composite
    pub fn stop(&self) {
        let composite = {
            let mut state = self.inner.state.lock();
            if let Some(token) = state.frame_token.take() {
                self.inner.scheduler.unsubscribe(&token);
            }
            state.composite.take()
        };
        let Some(composite) = composite else {
            return;
        };
        for track in composite.video_tracks() {
            track.stop();
        }
        tracing::info!("Composition stopped");
        self.inner.bus.emit(StudioEvent::StreamRemove {
            source_id: COMPOSITE_ID.to_string(),
        });
    }

    /// Paint one frame: every active tile in paint order
    pub fn draw(&self) {
        let mut state = self.inner.state.lock();
        let CompositorState {
            canvas,
            tiles,
            paint_order,
            composite,
            ..
        } = &mut *state;

        canvas.clear();
        for id in paint_order.iter() {
            let Some(tile) = tiles.get_mut(id) else {
                continue;
            };
            if !tile.active {
                continue;
            }
            if !tile.stream.is_active() {
                tracing::debug!("Tile {} ended; skipping until re-added", id);
                tile.active = false;
                continue;
            }
            if let Some(frame) = tile.stream.latest_frame() {
                let p = tile.placement;
                canvas.draw_image(&frame, p.offset_x, p.offset_y, p.width, p.height);
            }
        }

        if let Some(composite) = composite {
            composite.push_frame(canvas.snapshot());
        }
    }

    /// Merge an audio track into the composite, caching it for the next
    /// start when composition is not running
    pub fn add_audio_track(&self, track: MediaTrack) {
        if track.is_ended() {
            tracing::debug!("Ignoring ended audio track {}", track.label());
            return;
        }
        let event = {
            let mut state = self.inner.state.lock();
            if !state.audio_tracks.iter().any(|t| t.same_track(&track)) {
                state.audio_tracks.push(track.clone());
            }
            let Some(composite) = state.composite.clone() else {
                tracing::debug!("Cached audio {} for the composite", track.label());
                return;
            };
            match graft_track(self.inner.graft_mode, &composite, track.clone()) {
                GraftOutcome::Mutated(stream) => StudioEvent::StreamMute {
                    source_id: COMPOSITE_ID.to_string(),
                    stream,
                    track,
                },
                GraftOutcome::Replaced(rebuilt) => {
                    tracing::info!("Rebuilt composite to carry audio {}", track.label());
                    state.composite = Some(rebuilt.clone());
                    StudioEvent::Stream {
                        source_id: COMPOSITE_ID.to_string(),
                        kind: SourceKind::Composite,
                        stream: rebuilt,
                    }
                }
                GraftOutcome::Unchanged => return,
            }
        };
        let rebuilt = match &event {
            StudioEvent::Stream { stream, .. } => Some(stream.clone()),
            _ => None,
        };
        self.inner.bus.emit(event);
        if let Some(rebuilt) = rebuilt {
            self.follow_composite(rebuilt);
        }
    }

    fn merge_audio_from(&self, stream: &Arc<MediaStream>) {
        if !self.is_running() {
            return;
        }
        for track in stream.audio_tracks() {
            self.add_audio_track(track);
        }
    }

    /// Record the composite, resuming if paused
    pub async fn record(&self) -> StudioResult<()> {
        let composite = self
            .composite()
            .ok_or_else(|| StudioError::RecordWithoutStream(COMPOSITE_ID.to_string()))?;
        let mut recorder = self.inner.recorder.lock().await;
        let rebind = recorder.as_ref().map_or(true, |r| {
            !MediaStream::same_handle(r.stream(), &composite) && !r.state().is_active()
        });
        if rebind {
            *recorder = Some(CaptureRecorder::new(
                COMPOSITE_ID,
                composite,
                self.inner.backend.clone(),
                self.inner.bus.clone(),
                self.inner.recorder_options.clone(),
            ));
        }
        match recorder.as_mut() {
            Some(recorder) => recorder.start().await,
            None => Err(StudioError::RecordWithoutStream(COMPOSITE_ID.to_string())),
        }
    }

    /// Toggle pause on the composite recording
    pub async fn pause_recording(&self) -> StudioResult<RecordingState> {
        let mut recorder = self.inner.recorder.lock().await;
        let recorder = recorder
            .as_mut()
            .ok_or_else(|| StudioError::RecordWithoutStream(COMPOSITE_ID.to_string()))?;
        recorder.pause();
        Ok(recorder.state())
    }

    /// Finalize the composite recording, if any
    pub async fn stop_recording(&self) -> StudioResult<Option<Arc<RecordingArtifact>>> {
        match self.inner.recorder.lock().await.as_mut() {
            Some(recorder) => recorder.stop().await,
            None => Ok(None),
        }
    }

    pub async fn recording_state(&self) -> RecordingState {
        self.inner
            .recorder
            .lock()
            .await
            .as_ref()
            .map_or(RecordingState::Idle, |r| r.state())
    }
}

#[cfg(all(test, feature = "synthetic"))]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::media::VideoFrame;
    use crate::recorder::MemoryRecorderBackend;
    use std::time::Duration;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn compositor_with(mode: TrackGraftMode) -> (Compositor, Arc<EventBus>, Arc<FrameScheduler>) {
        let bus = EventBus::new();
        let scheduler = FrameScheduler::new();
        let compositor = Compositor::new(
            bus.clone(),
            scheduler.clone(),
            Arc::new(MemoryRecorderBackend::new()),
            mode,
            Dimensions::new(1280, 720),
            RecorderOptions::default(),
        );
        (compositor, bus, scheduler)
    }

    fn compositor() -> (Compositor, Arc<EventBus>, Arc<FrameScheduler>) {
        compositor_with(TrackGraftMode::InPlace)
    }

    fn camera(width: u32, height: u32, color: [u8; 4]) -> Arc<MediaStream> {
        let stream = MediaStream::new(vec![MediaTrack::video("camera")]);
        stream.push_frame(VideoFrame::solid(width, height, color));
        stream
    }

    fn placement(offset_x: u32, offset_y: u32, width: u32, height: u32) -> Placement {
        Placement {
            offset_x,
            offset_y,
            width,
            height,
        }
    }

    #[tokio::test]
    async fn test_fifth_tile_fits_sixth_fails() {
        let (compositor, _, _) = compositor();
        for i in 0..MAX_TILES {
            compositor
                .add_stream(&format!("cam-{i}"), SourceKind::Video, camera(640, 480, RED))
                .await
                .unwrap();
        }
        let err = compositor
            .add_stream("cam-5", SourceKind::Video, camera(640, 480, RED))
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::CapacityExceeded(5)));
        assert_eq!(compositor.tiles().len(), 5);
    }

    #[tokio::test]
    async fn test_pending_tiles_count_toward_capacity() {
        let (compositor, _, _) = compositor();
        let mut waiting = Vec::new();
        for i in 0..MAX_TILES {
            let stream = MediaStream::new(vec![MediaTrack::video("late")]);
            waiting.push(stream.clone());
            let fut = compositor.add_stream(&format!("late-{i}"), SourceKind::Video, stream);
            tokio::spawn(fut);
        }
        assert_eq!(compositor.pending_count(), 5);
        assert!(matches!(
            compositor
                .add_stream("one-more", SourceKind::Video, camera(640, 480, RED))
                .await,
            Err(StudioError::CapacityExceeded(_))
        ));
    }

    #[tokio::test]
    async fn test_tile_waits_for_natural_dimensions() {
        let (compositor, _, _) = compositor();
        let stream = MediaStream::new(vec![MediaTrack::video("camera")]);
        let pending = tokio::spawn(compositor.add_stream("cam", SourceKind::Video, stream.clone()));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(compositor.tile("cam").is_none());
        assert_eq!(compositor.pending_count(), 1);

        stream.push_frame(VideoFrame::solid(640, 480, RED));
        pending.await.unwrap().unwrap();
        assert_eq!(
            compositor.tile("cam").unwrap().placement,
            placement(960, 480, 320, 240)
        );
    }

    #[tokio::test]
    async fn test_desktop_is_painted_first() {
        let (compositor, _, _) = compositor();
        compositor
            .add_stream("cam", SourceKind::Video, camera(640, 480, RED))
            .await
            .unwrap();
        compositor
            .add_stream("desktop", SourceKind::Desktop, camera(1920, 1080, BLUE))
            .await
            .unwrap();

        assert_eq!(compositor.paint_order(), vec!["desktop", "cam"]);
        assert_eq!(
            compositor.tile("desktop").unwrap().placement,
            placement(0, 0, 1280, 720)
        );
    }

    #[tokio::test]
    async fn test_camera_collides_with_full_desktop() {
        let (compositor, _, _) = compositor();
        compositor
            .add_stream("desktop", SourceKind::Desktop, camera(1920, 1080, BLUE))
            .await
            .unwrap();
        compositor
            .add_stream("cam", SourceKind::Video, camera(640, 480, RED))
            .await
            .unwrap();
        assert_eq!(
            compositor.tile("cam").unwrap().placement,
            placement(0, 480, 320, 240)
        );
    }

    #[tokio::test]
    async fn test_readding_swaps_handle_but_keeps_position() {
        let (compositor, _, _) = compositor();
        let first = camera(640, 480, RED);
        compositor
            .add_stream("cam", SourceKind::Video, first.clone())
            .await
            .unwrap();
        let before = compositor.tile("cam").unwrap().placement;

        let second = camera(1280, 720, BLUE);
        compositor
            .add_stream("cam", SourceKind::Video, second.clone())
            .await
            .unwrap();
        let tile = compositor.tile("cam").unwrap();
        assert!(MediaStream::same_handle(&tile.stream, &second));
        assert_eq!(tile.placement, before);
        assert_eq!(compositor.tiles().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_leaves_others_untouched() {
        let (compositor, _, _) = compositor();
        for id in ["a", "b", "c"] {
            compositor
                .add_stream(id, SourceKind::Video, camera(640, 480, RED))
                .await
                .unwrap();
        }
        let c_before = compositor.tile("c").unwrap().placement;
        let a_before = compositor.tile("a").unwrap().placement;

        compositor.remove_stream("b").unwrap();
        assert!(compositor.tile("b").is_none());
        assert_eq!(compositor.tile("a").unwrap().placement, a_before);
        assert_eq!(compositor.tile("c").unwrap().placement, c_before);
        assert_eq!(compositor.paint_order(), vec!["a", "c"]);

        assert!(matches!(
            compositor.remove_stream("b"),
            Err(StudioError::NoSuchSource(id)) if id == "b"
        ));
    }

    #[tokio::test]
    async fn test_resize_floors_every_tile() {
        let (compositor, _, _) = compositor();
        compositor
            .add_stream("cam", SourceKind::Video, camera(640, 480, RED))
            .await
            .unwrap();
        compositor
            .add_stream("other", SourceKind::Video, camera(480, 640, RED))
            .await
            .unwrap();
        let before: Vec<Placement> = compositor.tiles().iter().map(|t| t.placement).collect();

        compositor.resize(Some(853), Some(480)).unwrap();
        let after: Vec<Placement> = compositor.tiles().iter().map(|t| t.placement).collect();
        for (old, new) in before.iter().zip(&after) {
            assert_eq!(new.offset_x, old.offset_x * 853 / 1280);
            assert_eq!(new.offset_y, old.offset_y * 480 / 720);
            assert_eq!(new.width, old.width * 853 / 1280);
            assert_eq!(new.height, old.height * 480 / 720);
        }
        assert_eq!(compositor.canvas_dimensions(), Dimensions::new(853, 480));
    }

    #[test]
    fn test_resize_defaults_and_rejects_zero() {
        let (compositor, _, _) = compositor();
        compositor.resize(Some(640), Some(360)).unwrap();
        compositor.resize(None, None).unwrap();
        assert_eq!(compositor.canvas_dimensions(), Dimensions::new(1280, 720));
        assert!(matches!(
            compositor.resize(Some(0), None),
            Err(StudioError::InvalidResolution(_))
        ));
    }

    #[tokio::test]
    async fn test_start_draws_tiles_into_composite() {
        let (compositor, bus, scheduler) = compositor();
        let streams = Arc::new(Mutex::new(Vec::new()));
        let s = streams.clone();
        bus.on(EventKind::Stream, move |e| s.lock().push(e.source_id().to_string()));

        compositor
            .add_stream("desktop", SourceKind::Desktop, camera(1920, 1080, BLUE))
            .await
            .unwrap();
        compositor
            .add_stream("cam", SourceKind::Video, camera(640, 480, RED))
            .await
            .unwrap();

        let composite = compositor.start();
        assert!(compositor.is_running());
        assert_eq!(scheduler.subscription_count(), 1);
        assert_eq!(*streams.lock(), vec![COMPOSITE_ID.to_string()]);
        assert_eq!(composite.dimensions(), Some(Dimensions::new(1280, 720)));

        scheduler.tick(16.0);
        let frame = composite.latest_frame().unwrap();
        assert_eq!(frame.pixel(10, 10), Some(BLUE));
        assert_eq!(frame.pixel(10, 700), Some(RED));

        // Starting again hands back the same handle
        assert!(MediaStream::same_handle(&compositor.start(), &composite));
    }

    #[tokio::test]
    async fn test_ended_tile_is_not_drawn() {
        let (compositor, _, _) = compositor();
        let cam = camera(640, 480, RED);
        compositor
            .add_stream("cam", SourceKind::Video, cam.clone())
            .await
            .unwrap();
        let composite = compositor.start();

        cam.stop_all();
        compositor.draw();
        assert!(!compositor.tile("cam").unwrap().active);
        let frame = composite.latest_frame().unwrap();
        assert_eq!(frame.pixel(1000, 600), Some([0, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_stop_unsubscribes_and_announces_removal() {
        let (compositor, bus, scheduler) = compositor();
        let removed = Arc::new(Mutex::new(0));
        let r = removed.clone();
        bus.on(EventKind::StreamRemove, move |_| *r.lock() += 1);

        let composite = compositor.start();
        compositor.stop();
        assert!(!compositor.is_running());
        assert!(compositor.composite().is_none());
        assert_eq!(scheduler.subscription_count(), 0);
        assert_eq!(*removed.lock(), 1);
        assert!(!composite.is_active());

        compositor.stop();
        assert_eq!(*removed.lock(), 1);
    }

    #[tokio::test]
    async fn test_start_reattaches_constituent_audio() {
        let (compositor, _, _) = compositor();
        let desktop = camera(1920, 1080, BLUE);
        desktop.add_track(MediaTrack::audio("mic"));
        compositor
            .add_stream("desktop", SourceKind::Desktop, desktop)
            .await
            .unwrap();

        let composite = compositor.start();
        assert_eq!(composite.audio_tracks().len(), 1);
        assert_eq!(composite.video_tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_audio_in_place_keeps_identity() {
        let (compositor, bus, _) = compositor();
        let mutes = Arc::new(Mutex::new(0));
        let m = mutes.clone();
        bus.on(EventKind::StreamMute, move |_| *m.lock() += 1);

        let composite = compositor.start();
        compositor.add_audio_track(MediaTrack::audio("mic"));
        assert!(MediaStream::same_handle(&compositor.composite().unwrap(), &composite));
        assert_eq!(composite.audio_tracks().len(), 1);
        assert_eq!(*mutes.lock(), 1);
    }

    #[tokio::test]
    async fn test_audio_rebuild_announces_new_handle() {
        let (compositor, bus, _) = compositor_with(TrackGraftMode::Rebuild);
        let composite = compositor.start();
        let streams = Arc::new(Mutex::new(Vec::new()));
        let s = streams.clone();
        bus.on(EventKind::Stream, move |e| {
            if let StudioEvent::Stream { stream, .. } = e {
                s.lock().push(stream.clone());
            }
        });

        compositor.add_audio_track(MediaTrack::audio("mic"));
        let current = compositor.composite().unwrap();
        assert!(!MediaStream::same_handle(&current, &composite));
        assert_eq!(current.audio_tracks().len(), 1);
        assert!(composite.audio_tracks().is_empty());
        let announced = streams.lock();
        assert_eq!(announced.len(), 1);
        assert!(MediaStream::same_handle(&announced[0], &current));
    }

    #[tokio::test]
    async fn test_audio_cached_until_start() {
        let (compositor, _, _) = compositor();
        compositor.add_audio_track(MediaTrack::audio("mic"));
        let ended = MediaTrack::audio("gone");
        ended.stop();
        compositor.add_audio_track(ended);

        let composite = compositor.start();
        assert_eq!(composite.audio_tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_record_requires_composite() {
        let (compositor, _, _) = compositor();
        assert!(matches!(
            compositor.record().await,
            Err(StudioError::RecordWithoutStream(id)) if id == COMPOSITE_ID
        ));
        assert!(compositor.stop_recording().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_composite_recording_lifecycle() {
        let (compositor, _, scheduler) = compositor();
        compositor
            .add_stream("desktop", SourceKind::Desktop, camera(1920, 1080, BLUE))
            .await
            .unwrap();
        compositor.start();

        compositor.record().await.unwrap();
        assert_eq!(compositor.recording_state().await, RecordingState::Recording);
        assert_eq!(
            compositor.pause_recording().await.unwrap(),
            RecordingState::Paused
        );
        compositor.record().await.unwrap();
        assert_eq!(compositor.recording_state().await, RecordingState::Recording);

        scheduler.tick(33.0);
        tokio::task::yield_now().await;
        let artifact = compositor.stop_recording().await.unwrap().unwrap();
        assert_eq!(artifact.id, COMPOSITE_ID);
        assert_eq!(artifact.flavor, Flavor::Presentation);
        assert_eq!(artifact.filename, "presentation video - Recording.webm");
        assert_eq!(compositor.recording_state().await, RecordingState::Stopped);
    }

    #[tokio::test]
    async fn test_recording_follows_restarted_composite() {
        let (compositor, _, scheduler) = compositor();
        compositor
            .add_stream("desktop", SourceKind::Desktop, camera(1920, 1080, BLUE))
            .await
            .unwrap();
        let before = compositor.start();
        compositor.record().await.unwrap();
        scheduler.tick(16.0);
        tokio::task::yield_now().await;

        let after = compositor.change_resolution("480p").unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!MediaStream::same_handle(&before, &after));
        assert_eq!(compositor.recording_state().await, RecordingState::Recording);

        scheduler.tick(33.0);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let artifact = compositor.stop_recording().await.unwrap().unwrap();
        // The last chunk is a frame of the 853x480 canvas
        let tail = &artifact.media.data[artifact.media.data.len() - 20..];
        assert_eq!(&tail[..4], &853u32.to_le_bytes());
        assert_eq!(&tail[4..8], &480u32.to_le_bytes());
    }

    #[tokio::test]
    async fn test_recording_follows_rebuilt_composite() {
        let (compositor, _, scheduler) = compositor_with(TrackGraftMode::Rebuild);
        compositor.start();
        compositor.record().await.unwrap();

        compositor.add_audio_track(MediaTrack::audio("mic"));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let current = compositor.composite().unwrap();
        assert_eq!(current.audio_tracks().len(), 1);

        scheduler.tick(16.0);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let artifact = compositor.stop_recording().await.unwrap().unwrap();
        assert!(artifact.chunk_count >= 2);
    }

    #[tokio::test]
    async fn test_change_resolution_restarts_composite() {
        let (compositor, bus, _) = compositor();
        let removed = Arc::new(Mutex::new(0));
        let r = removed.clone();
        bus.on(EventKind::StreamRemove, move |_| *r.lock() += 1);

        let before = compositor.start();
        let after = compositor.change_resolution("480p").unwrap().unwrap();
        assert!(!MediaStream::same_handle(&before, &after));
        assert_eq!(after.dimensions(), Some(Dimensions::new(853, 480)));
        assert_eq!(*removed.lock(), 1);

        assert!(matches!(
            compositor.change_resolution("tall"),
            Err(StudioError::InvalidResolution(_))
        ));
    }
}
