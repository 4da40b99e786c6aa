//! Submitting moments to the feed

mod coordinator;

pub use coordinator::{UploadCoordinator, UploadJob};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::capture::MediaFormat;
use crate::error::ValidationError;

/// The emotions a moment can be tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Excited,
    Calm,
}

impl Emotion {
    pub const ALL: [Emotion; 5] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Excited,
        Emotion::Calm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Excited => "excited",
            Emotion::Calm => "calm",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownEmotion(s.to_string()))
    }
}

/// A file picked for upload in file mode
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
    pub format: MediaFormat,
}

impl SelectedFile {
    /// Stat a picked file. Empty files are accepted here and rejected at submit.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{:?} is not a file", path),
            ));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Self {
            format: MediaFormat::from_path(&path),
            filename,
            size: metadata.len(),
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emotion_parsing_is_case_insensitive() {
        assert_eq!("HAPPY".parse::<Emotion>().unwrap(), Emotion::Happy);
        assert_eq!(" calm ".parse::<Emotion>().unwrap(), Emotion::Calm);
    }

    #[test]
    fn test_unknown_emotion_rejected() {
        assert_eq!(
            "meh".parse::<Emotion>(),
            Err(ValidationError::UnknownEmotion("meh".to_string()))
        );
        assert!("".parse::<Emotion>().is_err());
    }

    #[tokio::test]
    async fn test_selected_file_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smile.JPG");
        std::fs::write(&path, b"jpegdata").unwrap();

        let selected = SelectedFile::open(&path).await.unwrap();
        assert_eq!(selected.filename, "smile.JPG");
        assert_eq!(selected.size, 8);
        assert_eq!(selected.format.mime(), "image/jpeg");
    }

    #[tokio::test]
    async fn test_directory_is_not_selectable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SelectedFile::open(dir.path()).await.is_err());
    }
}
