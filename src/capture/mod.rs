//! Capture platform boundary
//!
//! The traits the pipeline needs from the host platform, plus a headless
//! implementation behind the `synthetic` feature.

pub mod traits;

#[cfg(feature = "synthetic")]
pub mod synthetic;

pub use traits::{
    AudioConstraints, CapturePlatform, DeviceInfo, DeviceKind, MediaConstraints, Resolution,
    VideoConstraints,
};

#[cfg(feature = "synthetic")]
pub use synthetic::SyntheticPlatform;
