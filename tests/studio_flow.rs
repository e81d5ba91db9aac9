#![cfg(feature = "synthetic")]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use studio_compose_lib::capture::SyntheticPlatform;
use studio_compose_lib::compositor::{Placement, MAX_TILES};
use studio_compose_lib::events::{EventKind, StudioEvent};
use studio_compose_lib::media::{MediaStream, MediaTrack, VideoFrame};
use studio_compose_lib::recorder::{Flavor, MemoryRecorderBackend, RecordingState};
use studio_compose_lib::scheduler::FrameScheduler;
use studio_compose_lib::sources::{COMPOSITE_ID, DESKTOP_ID};
use studio_compose_lib::{Studio, StudioConfig, StudioError};
use tempfile::TempDir;

fn platform() -> SyntheticPlatform {
    SyntheticPlatform::new()
        .with_camera("cam", "FaceTime HD Camera", 640, 480)
        .with_microphone("mic", "Built-in Microphone")
}

fn studio(platform: Arc<SyntheticPlatform>, scheduler: Arc<FrameScheduler>) -> Studio {
    Studio::with_scheduler(
        StudioConfig::default(),
        platform,
        Arc::new(MemoryRecorderBackend::new()),
        scheduler,
    )
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_full_session_produces_artifacts() {
    let platform = Arc::new(platform());
    let scheduler = FrameScheduler::new();
    let studio = studio(platform.clone(), scheduler.clone());

    let prepared = Arc::new(Mutex::new(Vec::new()));
    let p = prepared.clone();
    studio.bus().on(EventKind::RecordPrepare, move |event| {
        if let StudioEvent::RecordPrepare { label, .. } = event {
            p.lock().push(label.clone());
        }
    });

    assert_eq!(studio.refresh_devices().await, 2);
    studio.connect(DESKTOP_ID, None).await.unwrap();
    studio.connect("cam", None).await.unwrap();
    studio.connect("mic", None).await.unwrap();
    settle().await;

    let tiles = studio.compositor().tiles();
    assert_eq!(tiles.len(), 2);
    assert_eq!(tiles[0].source_id, DESKTOP_ID);
    assert_eq!(
        tiles[1].placement,
        Placement {
            offset_x: 0,
            offset_y: 480,
            width: 320,
            height: 240
        }
    );

    let composite = studio.start_composition();
    assert_eq!(composite.audio_tracks().len(), 1);

    assert_eq!(studio.record().await.unwrap(), 4);
    for timestamp in [16.0, 33.0, 50.0] {
        platform.emit_frames();
        scheduler.tick(timestamp);
        tokio::task::yield_now().await;
    }
    assert_eq!(studio.pause_recording().await, 4);
    assert_eq!(
        studio.compositor().recording_state().await,
        RecordingState::Paused
    );
    assert_eq!(studio.record().await.unwrap(), 4);

    let artifacts = studio.stop_recording().await.unwrap();
    assert_eq!(artifacts.len(), 4);
    assert_eq!(artifacts[0].id, COMPOSITE_ID);
    assert_eq!(artifacts[0].flavor, Flavor::Presentation);
    assert_eq!(prepared.lock().len(), 4);

    let mic = artifacts.iter().find(|a| a.id == "mic").unwrap();
    assert_eq!(mic.media.mime_type, "audio/webm");
    assert_eq!(mic.filename, "presenter audio - Recording.webm");

    // Recorded sources are torn down and their tiles go with them
    assert!(studio.compositor().tiles().is_empty());
    assert_eq!(studio.recordings().len(), 4);

    let dir = TempDir::new().unwrap();
    let paths = studio.save_recordings(dir.path()).unwrap();
    assert_eq!(paths.len(), 4);
    for path in &paths {
        assert!(path.exists());
        assert!(path.extension().is_some_and(|e| e == "webm"));
    }
    // Composite and desktop share a label but land in separate files
    let files = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, artifacts.len());
    assert!(dir
        .path()
        .join("presentation video - Recording (2).webm")
        .exists());
}

#[tokio::test]
async fn test_rebuild_mode_swaps_desktop_tile_handle() {
    let platform = Arc::new(platform().with_in_place_track_add(false));
    let studio = studio(platform, FrameScheduler::new());
    studio.refresh_devices().await;

    let first = studio.connect(DESKTOP_ID, None).await.unwrap();
    settle().await;
    studio.connect("mic", None).await.unwrap();
    settle().await;

    let tile = studio.compositor().tile(DESKTOP_ID).unwrap();
    assert!(!MediaStream::same_handle(&tile.stream, &first));
    assert_eq!(tile.stream.audio_tracks().len(), 1);
    assert_eq!(studio.compositor().tiles().len(), 1);
}

#[tokio::test]
async fn test_mic_audio_reaches_running_composite() {
    let platform = Arc::new(platform());
    let studio = studio(platform, FrameScheduler::new());
    studio.refresh_devices().await;
    studio.connect(DESKTOP_ID, None).await.unwrap();
    settle().await;

    let composite = studio.start_composition();
    assert!(composite.audio_tracks().is_empty());
    studio.connect("mic", None).await.unwrap();
    assert_eq!(composite.audio_tracks().len(), 1);
}

#[tokio::test]
async fn test_peers_share_capacity_with_devices() {
    let platform = Arc::new(platform());
    let studio = studio(platform, FrameScheduler::new());
    studio.refresh_devices().await;
    studio.connect(DESKTOP_ID, None).await.unwrap();
    studio.connect("cam", None).await.unwrap();

    for i in 0..MAX_TILES - 1 {
        let remote = MediaStream::new(vec![MediaTrack::video("remote")]);
        remote.push_frame(VideoFrame::solid(640, 360, [9, 9, 9, 255]));
        studio.attach_peer(&format!("peer-{i}"), remote).await.unwrap();
    }
    settle().await;
    assert_eq!(studio.compositor().tiles().len(), MAX_TILES);
    assert!(studio.compositor().tile("peer-3").is_none());

    studio.detach_peer("peer-0").await.unwrap();
    assert_eq!(studio.compositor().tiles().len(), MAX_TILES - 1);
    assert!(matches!(
        studio.compositor().remove_stream("peer-0"),
        Err(StudioError::NoSuchSource(_))
    ));
}

#[tokio::test]
async fn test_change_resolution_rescales_running_canvas() {
    let platform = Arc::new(platform());
    let studio = studio(platform, FrameScheduler::new());
    studio.refresh_devices().await;
    studio.connect("cam", None).await.unwrap();
    settle().await;
    let before = studio.compositor().tile("cam").unwrap().placement;

    let first = studio.start_composition();
    let second = studio.change_resolution("1080p").unwrap().unwrap();
    assert!(!MediaStream::same_handle(&first, &second));

    let after = studio.compositor().tile("cam").unwrap().placement;
    assert_eq!(after.offset_x, before.offset_x * 1920 / 1280);
    assert_eq!(after.width, before.width * 1920 / 1280);
    assert_eq!(after.height, before.height * 1080 / 720);
}

#[tokio::test]
async fn test_denied_desktop_is_reported_to_caller() {
    let platform = Arc::new(platform());
    platform.deny(DESKTOP_ID);
    let studio = studio(platform.clone(), FrameScheduler::new());
    assert!(matches!(
        studio.connect(DESKTOP_ID, None).await,
        Err(StudioError::AcquisitionFailed(_))
    ));
    assert!(matches!(
        studio.connect("ghost", None).await,
        Err(StudioError::NoSuchDevice(_))
    ));

    platform.allow(DESKTOP_ID);
    studio.connect(DESKTOP_ID, None).await.unwrap();
}
