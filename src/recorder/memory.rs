//! In-memory recorder backend
//!
//! Produces one compact chunk per published frame (dimensions, sequence
//! number and the centre pixel) and one per timeslice for audio tracks. It
//! does no real encoding; it lets recording sessions run headless.

use super::backend::{PlatformRecorder, RecorderBackend, RecorderSignal, SignalSender};
use crate::media::{MediaStream, VideoFrame};
use crate::utils::error::{StudioError, StudioResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct MemoryRecorderBackend {
    supported: Vec<String>,
    timeslice: Duration,
    open: Mutex<Vec<SignalSender>>,
}

impl Default for MemoryRecorderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecorderBackend {
    /// Supports every webm codec
    pub fn new() -> Self {
        Self::with_supported(vec!["video/webm".to_string()])
    }

    /// Supports any codec whose string starts with one of `prefixes`
    pub fn with_supported(prefixes: Vec<String>) -> Self {
        Self {
            supported: prefixes,
            timeslice: Duration::from_millis(100),
            open: Mutex::new(Vec::new()),
        }
    }

    pub fn with_timeslice(mut self, timeslice: Duration) -> Self {
        self.timeslice = timeslice;
        self
    }

    /// Report a runtime error on every open recorder
    pub fn inject_error(&self, message: &str) {
        let mut open = self.open.lock();
        open.retain(|tx| !tx.is_closed());
        for tx in open.iter() {
            let _ = tx.send(RecorderSignal::Error(message.to_string()));
        }
    }
}

impl RecorderBackend for MemoryRecorderBackend {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|p| mime_type.starts_with(p.as_str()))
    }

    fn open(
        &self,
        stream: Arc<MediaStream>,
        mime_type: &str,
        signals: SignalSender,
    ) -> StudioResult<Box<dyn PlatformRecorder>> {
        if !self.is_type_supported(mime_type) {
            return Err(StudioError::UnsupportedCodec);
        }
        self.open.lock().push(signals.clone());
        Ok(Box::new(MemoryRecorder {
            stream,
            signals,
            timeslice: self.timeslice,
            paused: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            task: None,
        }))
    }
}

struct MemoryRecorder {
    stream: Arc<MediaStream>,
    signals: SignalSender,
    timeslice: Duration,
    paused: Arc<AtomicBool>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

fn frame_chunk(frame: &VideoFrame, sequence: u64) -> Vec<u8> {
    let mut chunk = Vec::with_capacity(20);
    chunk.extend_from_slice(&frame.width.to_le_bytes());
    chunk.extend_from_slice(&frame.height.to_le_bytes());
    chunk.extend_from_slice(&sequence.to_le_bytes());
    let centre = frame
        .pixel(frame.width / 2, frame.height / 2)
        .unwrap_or_default();
    chunk.extend_from_slice(&centre);
    chunk
}

impl PlatformRecorder for MemoryRecorder {
    fn start(&mut self) -> StudioResult<()> {
        if self.task.is_some() {
            return Err(StudioError::Recorder("recorder already started".to_string()));
        }
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let mut frames = self.stream.subscribe_frames();
        let signals = self.signals.clone();
        let paused = self.paused.clone();
        let stream = self.stream.clone();
        let timeslice = self.timeslice;

        let task = tokio::spawn(async move {
            let mut sequence: u64 = 0;
            let mut ticker = tokio::time::interval(timeslice);
            let has_audio = !stream.audio_tracks().is_empty();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    changed = frames.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let frame = frames.borrow_and_update().clone();
                        if let Some(frame) = frame {
                            if !paused.load(Ordering::SeqCst) {
                                sequence += 1;
                                let _ = signals.send(RecorderSignal::Data(frame_chunk(&frame, sequence)));
                            }
                        }
                    }
                    _ = ticker.tick(), if has_audio => {
                        if !paused.load(Ordering::SeqCst) {
                            let _ = signals.send(RecorderSignal::Data(vec![0u8; 8]));
                        }
                    }
                }
            }
            if let Some(frame) = stream.latest_frame() {
                let _ = signals.send(RecorderSignal::Data(frame_chunk(&frame, sequence + 1)));
            }
            let _ = signals.send(RecorderSignal::Stopped);
        });

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
        Ok(())
    }

    fn pause(&mut self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        match self.stop_tx.take() {
            Some(stop_tx) => {
                let _ = stop_tx.send(());
            }
            None => {
                let _ = self.signals.send(RecorderSignal::Stopped);
            }
        }
    }
}

impl Drop for MemoryRecorder {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}
