//! Per-handle recording state machine
//!
//! idle -> recording -> (paused <-> recording) -> stopped. Stopping
//! concatenates every buffered chunk into one artifact, emits it on the bus
//! and drops the session; the next start opens a fresh one.
//!
//! A session follows its handle across identity changes: `rebind` reopens
//! the platform recorder on the new handle and keeps the buffered chunks.

use super::artifact::{MediaBlob, RecordingArtifact};
use super::backend::{PlatformRecorder, RecorderBackend, RecorderSignal, SignalReceiver};
use super::codec::{media_type_for, select_codec, ARTIFACT_EXTENSION};
use super::state::{RecorderOptions, RecordingState};
use crate::events::{EventBus, StudioEvent};
use crate::media::MediaStream;
use crate::utils::error::{StudioError, StudioResult};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

#[derive(Default)]
struct SessionBuffer {
    chunks: Vec<Vec<u8>>,
}

struct ActiveSession {
    state: RecordingState,
    buffer: Arc<Mutex<SessionBuffer>>,
    recorder: Box<dyn PlatformRecorder>,
    flushed: oneshot::Receiver<()>,
    /// Start of the current recording segment
    segment_start: Option<Instant>,
    /// Sum of finished segments
    recorded: Duration,
}

impl ActiveSession {
    fn close_segment(&mut self) {
        if let Some(start) = self.segment_start.take() {
            self.recorded += start.elapsed();
        }
    }
}

pub struct CaptureRecorder {
    source_id: String,
    stream: Arc<MediaStream>,
    backend: Arc<dyn RecorderBackend>,
    bus: Arc<EventBus>,
    options: RecorderOptions,
    codec: Option<String>,
    session: Option<ActiveSession>,
    /// A session was finalized and no new one has started
    finished: bool,
}

impl CaptureRecorder {
    /// Bind a recorder to `stream`. The codec is probed once, here.
    pub fn new(
        source_id: impl Into<String>,
        stream: Arc<MediaStream>,
        backend: Arc<dyn RecorderBackend>,
        bus: Arc<EventBus>,
        options: RecorderOptions,
    ) -> Self {
        let source_id = source_id.into();
        let codec = select_codec(backend.as_ref(), &options.codec_preferences);
        match &codec {
            Some(codec) => tracing::debug!("Recorder for {} will use {}", source_id, codec),
            None => tracing::warn!("No supported codec for {}", source_id),
        }
        Self {
            source_id,
            stream,
            backend,
            bus,
            options,
            codec,
            session: None,
            finished: false,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn stream(&self) -> &Arc<MediaStream> {
        &self.stream
    }

    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    pub fn state(&self) -> RecordingState {
        match &self.session {
            Some(session) => session.state,
            None if self.finished => RecordingState::Stopped,
            None => RecordingState::Idle,
        }
    }

    /// Chunks buffered by the current session
    pub fn chunk_count(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |s| s.buffer.lock().chunks.len())
    }

    fn audio_only(&self) -> bool {
        self.stream.video_tracks().is_empty()
    }

    fn label(&self) -> String {
        let kind = if self.audio_only() { "audio" } else { "video" };
        RecordingArtifact::label(self.options.flavor, kind, &self.options.title)
    }

    /// Start a session, or resume a paused one. Recording already is a no-op.
    pub async fn start(&mut self) -> StudioResult<()> {
        match self.state() {
            RecordingState::Recording => return Ok(()),
            RecordingState::Paused => {
                self.pause();
                return Ok(());
            }
            RecordingState::Idle | RecordingState::Stopped => {}
        }

        let codec = self.codec.clone().ok_or(StudioError::UnsupportedCodec)?;
        if !self.stream.is_active() {
            return Err(StudioError::RecordWithoutStream(self.source_id.clone()));
        }

        if !self.options.start_delay.is_zero() {
            tracing::debug!(
                "Delaying start of {} by {:?}",
                self.source_id,
                self.options.start_delay
            );
            tokio::time::sleep(self.options.start_delay).await;
        }

        let buffer = Arc::new(Mutex::new(SessionBuffer::default()));
        let (recorder, flushed) = self.open_on_stream(&codec, buffer.clone())?;

        self.finished = false;
        self.session = Some(ActiveSession {
            state: RecordingState::Recording,
            buffer,
            recorder,
            flushed,
            segment_start: Some(Instant::now()),
            recorded: Duration::ZERO,
        });
        tracing::info!("Recording {} with {}", self.source_id, codec);
        Ok(())
    }

    /// Open and start a platform recorder on the bound handle, pumping its
    /// chunks into `buffer`
    fn open_on_stream(
        &self,
        codec: &str,
        buffer: Arc<Mutex<SessionBuffer>>,
    ) -> StudioResult<(Box<dyn PlatformRecorder>, oneshot::Receiver<()>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut recorder = self.backend.open(self.stream.clone(), codec, tx)?;
        recorder.start()?;

        let (flushed_tx, flushed) = oneshot::channel();
        tokio::spawn(pump_signals(
            rx,
            buffer,
            self.bus.clone(),
            self.source_id.clone(),
            flushed_tx,
        ));
        Ok((recorder, flushed))
    }

    /// Follow a replaced handle. An open session keeps its state and chunks;
    /// only the platform recorder is reopened on `stream`.
    pub async fn rebind(&mut self, stream: Arc<MediaStream>) -> StudioResult<()> {
        if MediaStream::same_handle(&self.stream, &stream) {
            return Ok(());
        }
        self.stream = stream;
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        // Chunks of the old handle land before any of the new one
        session.recorder.stop();
        let (_, closed) = oneshot::channel();
        if std::mem::replace(&mut session.flushed, closed).await.is_err() {
            tracing::warn!("Recorder for {} closed without flushing", self.source_id);
        }

        let codec = self.codec.clone().unwrap_or_default();
        match self.open_on_stream(&codec, session.buffer.clone()) {
            Ok((mut recorder, flushed)) => {
                if session.state == RecordingState::Paused {
                    recorder.pause();
                }
                session.recorder = recorder;
                session.flushed = flushed;
                self.session = Some(session);
                tracing::info!("Recording {} follows its new handle", self.source_id);
                Ok(())
            }
            Err(err) => {
                tracing::warn!("Could not rebind recorder for {}: {}", self.source_id, err);
                self.session = Some(session);
                Err(err)
            }
        }
    }

    /// Toggle between recording and paused. Idle recorders ignore it.
    pub fn pause(&mut self) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("Pause on idle recorder {}", self.source_id);
            return;
        };
        match session.state {
            RecordingState::Recording => {
                session.recorder.pause();
                session.close_segment();
                session.state = RecordingState::Paused;
                tracing::info!("Paused recording {}", self.source_id);
            }
            RecordingState::Paused => {
                session.recorder.resume();
                session.segment_start = Some(Instant::now());
                session.state = RecordingState::Recording;
                tracing::info!("Resumed recording {}", self.source_id);
            }
            RecordingState::Idle | RecordingState::Stopped => {}
        }
    }

    /// Finalize the session. Returns `None` when there was nothing to stop.
    pub async fn stop(&mut self) -> StudioResult<Option<Arc<RecordingArtifact>>> {
        let Some(mut session) = self.session.take() else {
            return Ok(None);
        };
        let label = self.label();
        self.bus.emit(StudioEvent::RecordPrepare {
            source_id: self.source_id.clone(),
            label: label.clone(),
        });

        session.close_segment();
        session.state = RecordingState::Stopped;
        session.recorder.stop();
        if session.flushed.await.is_err() {
            tracing::warn!("Recorder for {} closed without flushing", self.source_id);
        }

        self.finished = true;
        let chunks = std::mem::take(&mut session.buffer.lock().chunks);
        let codec = self.codec.clone().unwrap_or_default();
        let mime_type = media_type_for(self.audio_only()).to_string();
        let filename = format!("{label}.{ARTIFACT_EXTENSION}");
        let chunk_count = chunks.len();
        let artifact = Arc::new(RecordingArtifact {
            id: self.source_id.clone(),
            media: MediaBlob {
                mime_type,
                data: chunks.concat(),
            },
            url: RecordingArtifact::access_url(&filename),
            filename,
            flavor: self.options.flavor,
            codec,
            chunk_count,
            duration_ms: session.recorded.as_secs_f64() * 1000.0,
            created_at: Utc::now(),
        });

        tracing::info!(
            "Recording {} complete: {} chunks, {} bytes, {:.0}ms",
            self.source_id,
            chunk_count,
            artifact.media.size(),
            artifact.duration_ms
        );
        self.bus.emit(StudioEvent::RecordComplete(artifact.clone()));
        Ok(Some(artifact))
    }
}

async fn pump_signals(
    mut rx: SignalReceiver,
    buffer: Arc<Mutex<SessionBuffer>>,
    bus: Arc<EventBus>,
    source_id: String,
    flushed: oneshot::Sender<()>,
) {
    while let Some(signal) = rx.recv().await {
        match signal {
            RecorderSignal::Data(chunk) => {
                if !chunk.is_empty() {
                    buffer.lock().chunks.push(chunk);
                }
            }
            RecorderSignal::Error(message) => {
                tracing::warn!("Recorder error on {}: {}", source_id, message);
                bus.emit(StudioEvent::RecordError {
                    source_id: source_id.clone(),
                    message,
                });
            }
            RecorderSignal::Stopped => break,
        }
    }
    let _ = flushed.send(());
}
