//! Recording system module
//!
//! - `RecorderBackend`/`PlatformRecorder` for the platform recorder
//! - `CaptureRecorder`, the per-handle recording state machine
//! - `RecordingArtifact`, what a finished session produces

pub mod artifact;
pub mod backend;
pub mod capture_recorder;
pub mod codec;
pub mod state;

#[cfg(feature = "synthetic")]
pub mod memory;

pub use artifact::{Flavor, MediaBlob, RecordingArtifact};
pub use backend::{PlatformRecorder, RecorderBackend, RecorderSignal};
pub use capture_recorder::CaptureRecorder;
pub use state::{RecorderOptions, RecordingState};

#[cfg(feature = "synthetic")]
pub use memory::MemoryRecorderBackend;
