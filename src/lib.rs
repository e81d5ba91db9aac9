//! Studio Compose - live multi-source composition and recording.
//!
//! Captures a desktop, cameras, microphones and remote peers, paints them
//! onto one canvas every frame, and records any of those handles (the
//! composite included) into downloadable artifacts.

pub mod capture;
pub mod compositor;
pub mod config;
pub mod events;
pub mod media;
pub mod recorder;
pub mod scheduler;
pub mod sources;
pub mod studio;
pub mod utils;

pub use config::StudioConfig;
pub use studio::Studio;
pub use utils::error::{StudioError, StudioResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studio_compose_lib=debug,studio_compose=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
