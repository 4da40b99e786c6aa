//! Media container formats and encoder format negotiation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A media type such as `video/webm` or `video/mp4;codecs=avc1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaFormat(String);

impl MediaFormat {
    pub const OCTET_STREAM: &'static str = "application/octet-stream";

    pub fn new(mime: impl Into<String>) -> Self {
        Self(mime.into().trim().to_ascii_lowercase())
    }

    pub fn mime(&self) -> &str {
        &self.0
    }

    /// The type/subtype without parameters
    pub fn essence(&self) -> &str {
        self.0.split(';').next().unwrap_or_default().trim()
    }

    /// File extension for a blob of this format.
    ///
    /// Video types the server does not know by extension are sent as `webm`
    /// so they still land in the feed as video.
    pub fn extension(&self) -> &'static str {
        match self.essence() {
            "video/webm" | "audio/webm" => "webm",
            "video/mp4" => "mp4",
            "video/quicktime" => "mov",
            "video/x-msvideo" => "avi",
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            other if other.starts_with("video/") => "webm",
            _ => "bin",
        }
    }

    /// Guess a format from a file's extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let mime = match ext.as_str() {
            "webm" => "video/webm",
            "mp4" | "m4v" => "video/mp4",
            "mov" => "video/quicktime",
            "avi" => "video/x-msvideo",
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            _ => Self::OCTET_STREAM,
        };
        Self::new(mime)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaFormat {
    fn from(mime: &str) -> Self {
        Self::new(mime)
    }
}

/// Pick the first preferred format the encoder supports, or its own default.
pub fn negotiate_format<F>(
    preferences: &[MediaFormat],
    supports: F,
    fallback: MediaFormat,
) -> MediaFormat
where
    F: Fn(&MediaFormat) -> bool,
{
    preferences
        .iter()
        .find(|format| supports(format))
        .cloned()
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> Vec<MediaFormat> {
        vec!["video/webm".into(), "video/mp4".into()]
    }

    #[test]
    fn test_first_supported_preference_wins() {
        let chosen = negotiate_format(&prefs(), |_| true, "video/x-matroska".into());
        assert_eq!(chosen.mime(), "video/webm");
    }

    #[test]
    fn test_skips_unsupported_preference() {
        let chosen = negotiate_format(
            &prefs(),
            |f| f.essence() == "video/mp4",
            "video/x-matroska".into(),
        );
        assert_eq!(chosen.mime(), "video/mp4");
    }

    #[test]
    fn test_falls_back_to_encoder_default() {
        let chosen = negotiate_format(&prefs(), |_| false, "video/x-matroska".into());
        assert_eq!(chosen.mime(), "video/x-matroska");
    }

    #[test]
    fn test_extension_follows_essence() {
        assert_eq!(MediaFormat::new("video/webm;codecs=vp9,opus").extension(), "webm");
        assert_eq!(MediaFormat::new("Video/MP4").extension(), "mp4");
        assert_eq!(MediaFormat::new("video/x-matroska").extension(), "webm");
        assert_eq!(MediaFormat::new("text/plain").extension(), "bin");
    }

    #[test]
    fn test_from_path() {
        assert_eq!(MediaFormat::from_path(Path::new("clip.MOV")).mime(), "video/quicktime");
        assert_eq!(MediaFormat::from_path(Path::new("me.jpeg")).mime(), "image/jpeg");
        assert_eq!(
            MediaFormat::from_path(Path::new("README")).mime(),
            MediaFormat::OCTET_STREAM
        );
    }
}
