//! Headless studio session
//!
//! Connects the synthetic desktop and devices, composites them, records for
//! a while and writes every artifact to the output directory.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use studio_compose_lib::capture::SyntheticPlatform;
use studio_compose_lib::recorder::MemoryRecorderBackend;
use studio_compose_lib::sources::DESKTOP_ID;
use studio_compose_lib::{init_tracing, Studio, StudioConfig};

#[derive(Parser, Debug)]
#[command(name = "studio-compose")]
#[command(about = "Composite and record a synthetic capture session")]
struct Args {
    /// Directory the recordings are written to
    #[arg(short, long, default_value = "recordings")]
    output: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How long to record, in milliseconds
    #[arg(short, long, default_value = "2000")]
    duration: u64,

    /// Canvas resolution to switch to halfway through, e.g. "1080p"
    #[arg(long)]
    resolution: Option<String>,

    /// Rebuild handles instead of adding tracks in place
    #[arg(long)]
    rebuild_handles: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    tracing::info!("Starting Studio Compose v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => StudioConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => StudioConfig::default(),
    };

    let platform = Arc::new(
        SyntheticPlatform::new()
            .with_camera("facetime", "FaceTime HD Camera", 1280, 720)
            .with_microphone("builtin-mic", "Built-in Microphone")
            .with_in_place_track_add(!args.rebuild_handles),
    );
    let studio = Studio::new(config, platform.clone(), Arc::new(MemoryRecorderBackend::new()));

    let devices = studio.refresh_devices().await;
    tracing::info!("{} capture devices available", devices);
    studio.connect(DESKTOP_ID, None).await?;
    studio.connect("facetime", None).await?;
    studio.connect("builtin-mic", None).await?;

    // Let the tiles settle before the composite starts
    tokio::time::sleep(Duration::from_millis(50)).await;
    studio.start_composition();
    let recorders = studio.record().await?;
    tracing::info!("{} recorders running", recorders);

    let step = Duration::from_millis(100);
    let total = Duration::from_millis(args.duration);
    let mut elapsed = Duration::ZERO;
    let mut resized = false;
    while elapsed < total {
        platform.emit_frames();
        tokio::time::sleep(step).await;
        elapsed += step;

        if let (false, Some(resolution)) = (resized, &args.resolution) {
            if elapsed >= total / 2 {
                studio.change_resolution(resolution)?;
                resized = true;
            }
        }
    }

    let artifacts = studio.stop_recording().await?;
    tracing::info!("{} recordings finished", artifacts.len());
    studio.stop_composition();

    let paths = studio
        .save_recordings(&args.output)
        .with_context(|| format!("failed to write recordings to {}", args.output.display()))?;
    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}
