//! Codec probing

use super::backend::RecorderBackend;

/// Default preference list, best first
pub const DEFAULT_CODECS: [&str; 6] = [
    r#"video/webm;codecs="vp9,opus""#,
    r#"video/webm;codecs="vp9.0,opus""#,
    r#"video/webm;codecs="avc1""#,
    r#"video/x-matroska;codecs="avc1""#,
    r#"video/webm;codecs="vp8,opus""#,
    "video/webm",
];

pub fn default_codec_preferences() -> Vec<String> {
    DEFAULT_CODECS.iter().map(|c| c.to_string()).collect()
}

/// First codec in `preferences` the backend supports
pub fn select_codec(backend: &dyn RecorderBackend, preferences: &[String]) -> Option<String> {
    preferences
        .iter()
        .find(|codec| backend.is_type_supported(codec))
        .cloned()
}

/// Extension of every artifact; the container is webm whatever codec recorded it
pub const ARTIFACT_EXTENSION: &str = "webm";

/// Media type of an artifact: only the audio/video prefix depends on the source
pub fn media_type_for(audio_only: bool) -> &'static str {
    if audio_only {
        "audio/webm"
    } else {
        "video/webm"
    }
}
