//! Capture sources
//!
//! A source is a device, a peer, the desktop, or the composite, plus the
//! live handle it currently owns.

pub mod manager;
pub mod source;

pub use manager::SourceManager;
pub use source::{Source, SourceKind, COMPOSITE_ID, DESKTOP_ID};
