//! Studio
//!
//! Builds the bus, frame scheduler, source manager and compositor, and wires
//! them together through bus handlers only:
//!
//! - `stream` from a source admits its handle onto the canvas
//! - `stream.mute` on the desktop merges the new audio into the composite
//! - `record.stop.stream.remove` takes the source's tile down
//! - `record.complete` appends the artifact to the recordings list

use crate::capture::{CapturePlatform, MediaConstraints};
use crate::compositor::Compositor;
use crate::config::StudioConfig;
use crate::events::{EventBus, EventKind, StudioEvent};
use crate::media::MediaStream;
use crate::recorder::{RecorderBackend, RecordingArtifact};
use crate::scheduler::FrameScheduler;
use crate::sources::{SourceKind, SourceManager, DESKTOP_ID};
use crate::utils::error::{StudioError, StudioResult};
use crate::utils::token::Token;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Studio {
    config: StudioConfig,
    bus: Arc<EventBus>,
    scheduler: Arc<FrameScheduler>,
    sources: tokio::sync::Mutex<SourceManager>,
    compositor: Compositor,
    recordings: Arc<Mutex<Vec<Arc<RecordingArtifact>>>>,
    registrations: Vec<(EventKind, Token)>,
}

impl Studio {
    /// Build a studio and start its frame loop. Must be called from within a
    /// tokio runtime.
    pub fn new(
        config: StudioConfig,
        platform: Arc<dyn CapturePlatform>,
        backend: Arc<dyn RecorderBackend>,
    ) -> Self {
        let scheduler = FrameScheduler::start(config.frame_interval());
        Self::with_scheduler(config, platform, backend, scheduler)
    }

    /// Build a studio around an existing scheduler
    pub fn with_scheduler(
        config: StudioConfig,
        platform: Arc<dyn CapturePlatform>,
        backend: Arc<dyn RecorderBackend>,
        scheduler: Arc<FrameScheduler>,
    ) -> Self {
        let bus = EventBus::new();
        let sources = SourceManager::new(
            bus.clone(),
            platform,
            backend.clone(),
            config.recorder_options(),
        );
        let compositor = Compositor::new(
            bus.clone(),
            scheduler.clone(),
            backend,
            sources.graft_mode(),
            config.canvas_dimensions(),
            config.recorder_options(),
        );

        let mut studio = Self {
            config,
            bus,
            scheduler,
            sources: tokio::sync::Mutex::new(sources),
            compositor,
            recordings: Arc::new(Mutex::new(Vec::new())),
            registrations: Vec::new(),
        };
        studio.wire();
        tracing::info!(
            "Studio ready: {}x{} canvas at {} fps",
            studio.config.canvas.width,
            studio.config.canvas.height,
            studio.config.frame_rate
        );
        studio
    }

    fn wire(&mut self) {
        let compositor = self.compositor.clone();
        let token = self.bus.on(EventKind::Stream, move |event| {
            let StudioEvent::Stream {
                source_id,
                kind,
                stream,
            } = event
            else {
                return;
            };
            if *kind == SourceKind::Composite {
                return;
            }
            if stream.video_tracks().is_empty() {
                tracing::debug!("{} carries no video; not composited", source_id);
                return;
            }
            let admission = compositor.add_stream(source_id, *kind, stream.clone());
            let source_id = source_id.clone();
            tokio::spawn(async move {
                if let Err(err) = admission.await {
                    tracing::warn!("Could not composite {}: {}", source_id, err);
                }
            });
        });
        self.registrations.push((EventKind::Stream, token));

        let compositor = self.compositor.clone();
        let token = self.bus.on(EventKind::StreamMute, move |event| {
            if let StudioEvent::StreamMute {
                source_id, track, ..
            } = event
            {
                if source_id == DESKTOP_ID {
                    compositor.add_audio_track(track.clone());
                }
            }
        });
        self.registrations.push((EventKind::StreamMute, token));

        let compositor = self.compositor.clone();
        let token = self.bus.on(EventKind::RecordStopStreamRemove, move |event| {
            if let Err(err) = compositor.remove_stream(event.source_id()) {
                tracing::debug!("Nothing to take down: {}", err);
            }
        });
        self.registrations.push((EventKind::RecordStopStreamRemove, token));

        let recordings = self.recordings.clone();
        let token = self.bus.on(EventKind::RecordComplete, move |event| {
            if let StudioEvent::RecordComplete(artifact) = event {
                recordings.lock().push(artifact.clone());
            }
        });
        self.registrations.push((EventKind::RecordComplete, token));
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn scheduler(&self) -> &Arc<FrameScheduler> {
        &self.scheduler
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// Exclusive access to the source manager
    pub async fn sources(&self) -> tokio::sync::MutexGuard<'_, SourceManager> {
        self.sources.lock().await
    }

    pub async fn refresh_devices(&self) -> usize {
        self.sources.lock().await.refresh_devices().await
    }

    pub async fn connect(
        &self,
        id: &str,
        constraints: Option<MediaConstraints>,
    ) -> StudioResult<Arc<MediaStream>> {
        self.sources.lock().await.connect(id, constraints).await
    }

    pub async fn disconnect(&self, id: &str) -> StudioResult<Option<Arc<RecordingArtifact>>> {
        self.sources.lock().await.disconnect(id).await
    }

    pub async fn attach_peer(&self, peer_id: &str, stream: Arc<MediaStream>) -> StudioResult<()> {
        self.sources.lock().await.attach_peer(peer_id, stream)
    }

    pub async fn detach_peer(&self, peer_id: &str) -> StudioResult<()> {
        self.sources.lock().await.detach_peer(peer_id).await
    }

    /// Reacquire one source at a new resolution
    pub async fn change_source_resolution(
        &self,
        id: &str,
        resolution: &str,
    ) -> StudioResult<Arc<MediaStream>> {
        self.sources
            .lock()
            .await
            .change_resolution(id, resolution)
            .await
    }

    pub fn start_composition(&self) -> Arc<MediaStream> {
        self.compositor.start()
    }

    pub fn stop_composition(&self) {
        self.compositor.stop()
    }

    /// Resize the composite canvas, e.g. "1080p"
    pub fn change_resolution(&self, resolution: &str) -> StudioResult<Option<Arc<MediaStream>>> {
        self.compositor.change_resolution(resolution)
    }

    /// Record every live source plus the composite when it is running.
    /// Returns how many recorders are running.
    pub async fn record(&self) -> StudioResult<usize> {
        let mut started = match self.sources.lock().await.record().await {
            Ok(count) => count,
            Err(StudioError::RecordWithoutStream(_)) => 0,
            Err(err) => return Err(err),
        };
        if self.compositor.is_running() {
            self.compositor.record().await?;
            started += 1;
        }
        if started == 0 {
            return Err(StudioError::RecordWithoutStream("studio".to_string()));
        }
        Ok(started)
    }

    /// Toggle pause everywhere; returns how many recorders were toggled
    pub async fn pause_recording(&self) -> usize {
        let mut toggled = self.sources.lock().await.pause_recording();
        if self.compositor.pause_recording().await.is_ok() {
            toggled += 1;
        }
        toggled
    }

    /// Finalize every recording. Recorded sources are torn down.
    pub async fn stop_recording(&self) -> StudioResult<Vec<Arc<RecordingArtifact>>> {
        let mut artifacts = Vec::new();
        if let Some(artifact) = self.compositor.stop_recording().await? {
            artifacts.push(artifact);
        }
        artifacts.extend(self.sources.lock().await.stop_recording().await?);
        Ok(artifacts)
    }

    /// Every artifact completed so far, oldest first
    pub fn recordings(&self) -> Vec<Arc<RecordingArtifact>> {
        self.recordings.lock().clone()
    }

    /// Write every completed recording into `dir`
    pub fn save_recordings(&self, dir: &Path) -> StudioResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        self.recordings()
            .iter()
            .map(|artifact| artifact.save_to(dir))
            .collect()
    }
}

impl Drop for Studio {
    fn drop(&mut self) {
        for (kind, token) in self.registrations.drain(..) {
            self.bus.off(kind, &token);
        }
        self.compositor.stop();
    }
}
