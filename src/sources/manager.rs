//! Source lifecycle manager
//!
//! Owns every capture source (devices, peers and the synthetic `desktop`
//! source), acquires their handles through the platform, and announces each
//! handle on the bus. Microphone audio picked up by a device source is
//! grafted onto the desktop handle, or held until the desktop connects.

use super::source::{Source, SourceKind, DESKTOP_ID};
use crate::capture::{CapturePlatform, DeviceInfo, DeviceKind, MediaConstraints, Resolution};
use crate::events::{EventBus, StudioEvent};
use crate::media::{graft_track, GraftOutcome, MediaStream, MediaTrack, TrackGraftMode};
use crate::recorder::{CaptureRecorder, RecorderBackend, RecorderOptions, RecordingArtifact};
use crate::utils::error::{StudioError, StudioResult};
use std::collections::HashMap;
use std::sync::Arc;

pub struct SourceManager {
    bus: Arc<EventBus>,
    platform: Arc<dyn CapturePlatform>,
    backend: Arc<dyn RecorderBackend>,
    recorder_options: RecorderOptions,
    graft_mode: TrackGraftMode,
    sources: HashMap<String, Source>,
    /// Audio waiting for the desktop handle
    pending_audio: Vec<MediaTrack>,
}

impl SourceManager {
    pub fn new(
        bus: Arc<EventBus>,
        platform: Arc<dyn CapturePlatform>,
        backend: Arc<dyn RecorderBackend>,
        recorder_options: RecorderOptions,
    ) -> Self {
        let graft_mode = TrackGraftMode::from_capability(platform.supports_in_place_track_add());
        let mut sources = HashMap::new();
        sources.insert(
            DESKTOP_ID.to_string(),
            Source::new(DESKTOP_ID, SourceKind::Desktop, None),
        );
        Self {
            bus,
            platform,
            backend,
            recorder_options,
            graft_mode,
            sources,
            pending_audio: Vec::new(),
        }
    }

    pub fn graft_mode(&self) -> TrackGraftMode {
        self.graft_mode
    }

    pub fn source(&self, id: &str) -> Option<&Source> {
        self.sources.get(id)
    }

    /// All source ids, sorted
    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Audio tracks cached until the desktop connects
    pub fn pending_audio(&self) -> &[MediaTrack] {
        &self.pending_audio
    }

    /// Register a capture device as a source
    pub fn add_device(&mut self, device: DeviceInfo) {
        let kind = match device.kind {
            DeviceKind::VideoInput => SourceKind::Video,
            DeviceKind::AudioInput => SourceKind::Audio,
        };
        self.sources
            .entry(device.id.clone())
            .or_insert_with(|| Source::new(device.id.clone(), kind, Some(device)));
    }

    /// Sync device sources with the platform. Unplugged devices without a
    /// handle are dropped. Returns the number of device sources.
    pub async fn refresh_devices(&mut self) -> usize {
        let devices = self.platform.enumerate_devices().await;
        self.sources.retain(|id, source| {
            !matches!(source.kind, SourceKind::Video | SourceKind::Audio)
                || source.stream.is_some()
                || devices.iter().any(|d| &d.id == id)
        });
        for device in devices {
            self.add_device(device);
        }
        tracing::debug!("Device sources refreshed");
        self.sources
            .values()
            .filter(|s| matches!(s.kind, SourceKind::Video | SourceKind::Audio))
            .count()
    }

    /// Acquire a handle for `id` and announce it
    pub async fn connect(
        &mut self,
        id: &str,
        constraints: Option<MediaConstraints>,
    ) -> StudioResult<Arc<MediaStream>> {
        let source = self
            .sources
            .get(id)
            .ok_or_else(|| StudioError::NoSuchDevice(id.to_string()))?;
        let kind = source.kind;
        let constraints = match (kind, &source.device, constraints) {
            (_, _, Some(c)) => c,
            (SourceKind::Desktop, _, None) => MediaConstraints::display(None),
            (_, Some(device), None) => MediaConstraints::for_device(device, None),
            _ => return Err(StudioError::NoSuchDevice(id.to_string())),
        };

        tracing::info!("Connecting {} ({:?})", id, kind);
        let stream = match kind {
            SourceKind::Desktop => self.platform.get_display_media(&constraints).await?,
            SourceKind::Video | SourceKind::Audio => self.platform.get_user_media(&constraints).await?,
            SourceKind::Peer | SourceKind::Composite => {
                return Err(StudioError::NoSuchDevice(id.to_string()))
            }
        };

        self.assign_stream(id, stream.clone(), constraints.target_height());
        Ok(stream)
    }

    /// Attach a remote peer's handle as a source
    pub fn attach_peer(&mut self, peer_id: &str, stream: Arc<MediaStream>) -> StudioResult<()> {
        match self.sources.get(peer_id) {
            Some(source) if source.kind != SourceKind::Peer => {
                return Err(StudioError::NoSuchSource(peer_id.to_string()));
            }
            Some(_) => {}
            None => {
                self.sources.insert(
                    peer_id.to_string(),
                    Source::new(peer_id, SourceKind::Peer, None),
                );
            }
        }
        tracing::info!("Peer {} attached", peer_id);
        self.assign_stream(peer_id, stream, None);
        Ok(())
    }

    /// Tear down a peer and forget it
    pub async fn detach_peer(&mut self, peer_id: &str) -> StudioResult<()> {
        match self.sources.get(peer_id) {
            Some(source) if source.kind == SourceKind::Peer => {}
            _ => return Err(StudioError::NoSuchSource(peer_id.to_string())),
        }
        self.disconnect(peer_id).await?;
        self.sources.remove(peer_id);
        Ok(())
    }

    fn assign_stream(&mut self, id: &str, stream: Arc<MediaStream>, target_height: Option<u32>) {
        let Some(source) = self.sources.get_mut(id) else {
            return;
        };
        if let Some(previous) = source.stream.take() {
            if !MediaStream::same_handle(&previous, &stream) {
                previous.stop_all();
            }
        }

        if source.kind == SourceKind::Desktop {
            for track in self.pending_audio.drain(..) {
                if !track.is_ended() {
                    tracing::debug!("Grafting cached audio {} onto desktop", track.label());
                    stream.add_track(track);
                }
            }
        }

        let kind = source.kind;
        source.stream = Some(stream.clone());
        source.target_height = target_height;
        source.active = true;
        self.bus.emit(StudioEvent::Stream {
            source_id: id.to_string(),
            kind,
            stream: stream.clone(),
        });

        if matches!(kind, SourceKind::Video | SourceKind::Audio) {
            for track in stream.audio_tracks() {
                self.graft_onto_desktop(track);
            }
        }
    }

    /// Best effort: an ended track or a missing desktop is not an error
    fn graft_onto_desktop(&mut self, track: MediaTrack) {
        let Some(desktop) = self.sources.get_mut(DESKTOP_ID) else {
            return;
        };
        let Some(stream) = desktop.stream.clone() else {
            if !self.pending_audio.iter().any(|t| t.same_track(&track)) {
                tracing::debug!("Caching audio {} until desktop connects", track.label());
                self.pending_audio.push(track);
            }
            return;
        };

        match graft_track(self.graft_mode, &stream, track.clone()) {
            GraftOutcome::Mutated(stream) => {
                tracing::info!("Grafted audio {} onto desktop", track.label());
                self.bus.emit(StudioEvent::StreamMute {
                    source_id: DESKTOP_ID.to_string(),
                    stream,
                    track,
                });
            }
            GraftOutcome::Replaced(rebuilt) => {
                tracing::info!("Rebuilt desktop handle to carry audio {}", track.label());
                desktop.stream = Some(rebuilt.clone());
                self.bus.emit(StudioEvent::Stream {
                    source_id: DESKTOP_ID.to_string(),
                    kind: SourceKind::Desktop,
                    stream: rebuilt,
                });
            }
            GraftOutcome::Unchanged => {}
        }
    }

    /// Finalize any recording, stop the handle and announce its removal
    pub async fn disconnect(&mut self, id: &str) -> StudioResult<Option<Arc<RecordingArtifact>>> {
        let source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| StudioError::NoSuchSource(id.to_string()))?;
        let artifact = match source.recorder.take() {
            Some(mut recorder) => recorder.stop().await?,
            None => None,
        };
        if source.tear_down() {
            tracing::info!("Disconnected {}", id);
            self.bus.emit(StudioEvent::RecordStopStreamRemove {
                source_id: id.to_string(),
            });
        }
        Ok(artifact)
    }

    fn recorder_options_for(&self, source: &Source) -> RecorderOptions {
        RecorderOptions {
            flavor: source.kind.flavor(),
            ..self.recorder_options.clone()
        }
    }

    /// Start (or resume) recording on every source with a live handle.
    /// Returns how many sources are recording.
    pub async fn record(&mut self) -> StudioResult<usize> {
        let mut started = 0;
        for id in self.source_ids() {
            let Some(source) = self.sources.get(&id) else {
                continue;
            };
            if !source.has_active_stream() {
                continue;
            }
            let options = self.recorder_options_for(source);
            let (backend, bus) = (self.backend.clone(), self.bus.clone());

            let Some(source) = self.sources.get_mut(&id) else {
                continue;
            };
            let Some(stream) = source.stream.clone() else {
                continue;
            };
            let rebind = source.recorder.as_ref().map_or(true, |r| {
                !MediaStream::same_handle(r.stream(), &stream) && !r.state().is_active()
            });
            if rebind {
                source.recorder = Some(CaptureRecorder::new(id.clone(), stream, backend, bus, options));
            }
            if let Some(recorder) = source.recorder.as_mut() {
                recorder.start().await?;
                started += 1;
            }
        }

        if started == 0 {
            return Err(StudioError::RecordWithoutStream("sources".to_string()));
        }
        Ok(started)
    }

    /// Toggle pause on every recording source
    pub fn pause_recording(&mut self) -> usize {
        let mut toggled = 0;
        for source in self.sources.values_mut() {
            if let Some(recorder) = source.recorder.as_mut() {
                recorder.pause();
                toggled += 1;
            }
        }
        toggled
    }

    /// Finalize every recording and tear down the recorded sources
    pub async fn stop_recording(&mut self) -> StudioResult<Vec<Arc<RecordingArtifact>>> {
        let mut artifacts = Vec::new();
        for id in self.source_ids() {
            let recording = self
                .sources
                .get(&id)
                .is_some_and(|s| s.recorder.is_some());
            if !recording {
                continue;
            }
            if let Some(artifact) = self.disconnect(&id).await? {
                artifacts.push(artifact);
            }
        }
        tracing::info!("Stopped recording {} sources", artifacts.len());
        Ok(artifacts)
    }

    /// Reacquire `id` at a new 16:9 resolution
    pub async fn change_resolution(&mut self, id: &str, resolution: &str) -> StudioResult<Arc<MediaStream>> {
        let source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| StudioError::NoSuchDevice(id.to_string()))?;
        let target = Resolution::parse(resolution)?;
        let constraints = match (source.kind, &source.device) {
            (SourceKind::Desktop, _) => MediaConstraints::display(Some(target.height)),
            (SourceKind::Video | SourceKind::Audio, Some(device)) => {
                MediaConstraints::for_device(device, Some(target.height))
            }
            _ => return Err(StudioError::NoSuchDevice(id.to_string())),
        };

        tracing::info!("Changing {} to {}x{}", id, target.width, target.height);
        source.tear_down();
        self.connect(id, Some(constraints)).await
    }
}
