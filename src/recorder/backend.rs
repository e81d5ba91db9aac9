//! Platform recorder boundary
//!
//! A backend opens one platform recorder per session. The recorder reports
//! back over a signal channel: data chunks as they are produced, runtime
//! errors, and a final `Stopped` once everything has been flushed.

use crate::media::MediaStream;
use crate::utils::error::StudioResult;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderSignal {
    /// A chunk of encoded media
    Data(Vec<u8>),
    /// Runtime failure; the session stays in its current state
    Error(String),
    /// All chunks have been delivered
    Stopped,
}

pub type SignalSender = mpsc::UnboundedSender<RecorderSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<RecorderSignal>;

pub trait RecorderBackend: Send + Sync {
    /// Whether this backend can record the given codec
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Open a recorder on `stream`
    fn open(
        &self,
        stream: Arc<MediaStream>,
        mime_type: &str,
        signals: SignalSender,
    ) -> StudioResult<Box<dyn PlatformRecorder>>;
}

pub trait PlatformRecorder: Send {
    fn start(&mut self) -> StudioResult<()>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Request a stop. The final chunks and `Stopped` follow on the signal channel.
    fn stop(&mut self);
}
