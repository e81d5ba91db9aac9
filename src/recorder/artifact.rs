//! Recording artifacts

use crate::utils::error::StudioResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Which role a recording plays in the final publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// Camera, microphone or peer
    Presenter,
    /// Screen or composite
    Presentation,
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flavor::Presenter => f.write_str("presenter"),
            Flavor::Presentation => f.write_str("presentation"),
        }
    }
}

/// The recorded bytes and their media type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub mime_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl MediaBlob {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// `audio` or `video`, from the media type
    pub fn kind(&self) -> &str {
        self.mime_type.split('/').next().unwrap_or("video")
    }
}

/// A finished recording, ready for listing and download
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingArtifact {
    /// Source the recording was made from
    pub id: String,
    pub media: MediaBlob,
    /// Access URL for the blob
    pub url: String,
    pub filename: String,
    pub flavor: Flavor,
    pub codec: String,
    pub chunk_count: usize,
    pub duration_ms: f64,
    pub created_at: DateTime<Utc>,
}

impl RecordingArtifact {
    /// Human-readable label: `<flavor> <kind> - <title>`
    pub fn label(flavor: Flavor, kind: &str, title: &str) -> String {
        format!("{flavor} {kind} - {title}")
    }

    pub fn filename(flavor: Flavor, kind: &str, title: &str, extension: &str) -> String {
        format!("{}.{extension}", Self::label(flavor, kind, title))
    }

    /// `studio://recordings/<uuid>/<encoded filename>`
    pub fn access_url(filename: &str) -> String {
        format!(
            "studio://recordings/{}/{}",
            Uuid::new_v4().simple(),
            urlencoding::encode(filename)
        )
    }

    /// Write the blob to `dir` under its filename. An existing file is
    /// never overwritten: the name gets a ` (2)`, ` (3)`... suffix instead.
    pub fn save_to(&self, dir: &Path) -> StudioResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = free_path(dir, &self.filename);
        std::fs::write(&path, &self.media.data)?;
        tracing::info!("Saved {} ({} bytes) to {:?}", self.filename, self.media.size(), path);
        Ok(path)
    }
}

fn free_path(dir: &Path, filename: &str) -> PathBuf {
    let path = dir.join(filename);
    if !path.exists() {
        return path;
    }
    let (stem, extension) = match filename.rsplit_once('.') {
        Some((stem, extension)) => (stem, format!(".{extension}")),
        None => (filename, String::new()),
    };
    (2u32..)
        .map(|n| dir.join(format!("{stem} ({n}){extension}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(path)
}
