//! Finished recordings

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::MediaFormat;

/// The immutable media blob produced when a recording stops.
///
/// Cloning is cheap; all clones share the same bytes.
#[derive(Debug, Clone)]
pub struct MediaArtifact {
    data: Arc<[u8]>,
    format: MediaFormat,
    recording_id: Uuid,
    created_at: DateTime<Utc>,
}

impl MediaArtifact {
    pub fn new(data: Vec<u8>, format: MediaFormat, recording_id: Uuid) -> Self {
        Self {
            data: data.into(),
            format,
            recording_id,
            created_at: Utc::now(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn format(&self) -> &MediaFormat {
        &self.format
    }

    /// The recording this artifact was assembled from
    pub fn recording_id(&self) -> Uuid {
        self.recording_id
    }

    /// Upload filename, e.g. `live_rec_1760781234567.webm`.
    /// The device never names its output, so one is generated.
    pub fn filename(&self, prefix: &str) -> String {
        format!(
            "{}_{}.{}",
            prefix,
            self.created_at.timestamp_millis(),
            self.format.extension()
        )
    }
}
