//! Error types and handling
//!
//! Common error types used across the studio pipeline.

use thiserror::Error;

/// Studio-wide error type
#[derive(Error, Debug)]
pub enum StudioError {
    #[error("Capacity exceeded: at most {0} streams can be composited")]
    CapacityExceeded(usize),

    #[error("No such source: {0}")]
    NoSuchSource(String),

    #[error("No such device: {0}")]
    NoSuchDevice(String),

    #[error("Acquisition failed: {0}")]
    AcquisitionFailed(String),

    #[error("Cannot record {0}: no active stream")]
    RecordWithoutStream(String),

    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("None of the preferred codecs is supported")]
    UnsupportedCodec,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias using StudioError
pub type StudioResult<T> = Result<T, StudioError>;
