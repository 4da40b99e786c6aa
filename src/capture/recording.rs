//! One record -> stop cycle

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Fragment, MediaArtifact, MediaFormat, RecordingBuffer};

/// Recording state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Stopped,
}

/// A single recording: its negotiated format and the fragments captured so far
#[derive(Debug)]
pub struct RecordingSession {
    id: Uuid,
    state: RecordingState,
    format: MediaFormat,
    buffer: RecordingBuffer,
    started_at: Option<DateTime<Utc>>,
}

impl RecordingSession {
    pub fn new(format: MediaFormat) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RecordingState::Idle,
            format,
            buffer: RecordingBuffer::new(),
            started_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn format(&self) -> &MediaFormat {
        &self.format
    }

    pub fn fragment_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn bytes_captured(&self) -> usize {
        self.buffer.total_bytes()
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    pub(crate) fn begin(&mut self) {
        if self.state != RecordingState::Idle {
            debug!("Recording {} already started", self.id);
            return;
        }
        info!("Recording {} started ({})", self.id, self.format);
        self.started_at = Some(Utc::now());
        self.state = RecordingState::Recording;
    }

    /// Append a fragment. Only accepted while recording; empty ones are dropped.
    pub(crate) fn append(&mut self, fragment: Fragment) -> bool {
        if self.state != RecordingState::Recording {
            return false;
        }
        let sequence = fragment.sequence;
        let accepted = self.buffer.push(fragment);
        if !accepted {
            debug!("Discarded empty fragment {} of recording {}", sequence, self.id);
        }
        accepted
    }

    /// Close the recording and build its artifact. `None` unless recording.
    pub(crate) fn finish(&mut self) -> Option<MediaArtifact> {
        if self.state != RecordingState::Recording {
            return None;
        }
        let fragments = self.buffer.len();
        let data = self.buffer.assemble();
        self.state = RecordingState::Stopped;

        let elapsed_ms = self
            .started_at
            .map(|t| (Utc::now() - t).num_milliseconds())
            .unwrap_or_default();
        info!(
            "Recording {} stopped after {}ms: {} fragments, {} bytes",
            self.id,
            elapsed_ms,
            fragments,
            data.len()
        );
        Some(MediaArtifact::new(data, self.format.clone(), self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_rejected_outside_recording() {
        let mut session = RecordingSession::new("video/webm".into());
        assert!(!session.append(Fragment::new(0, vec![1])));

        session.begin();
        assert!(session.append(Fragment::new(0, vec![1])));

        let artifact = session.finish().unwrap();
        assert_eq!(artifact.size(), 1);
        assert!(!session.append(Fragment::new(1, vec![2])));
        assert!(session.finish().is_none());
    }

    #[test]
    fn test_artifact_tagged_with_format_and_id() {
        let mut session = RecordingSession::new("video/mp4".into());
        session.begin();
        session.append(Fragment::new(0, vec![9; 8]));
        let artifact = session.finish().unwrap();

        assert_eq!(artifact.format().mime(), "video/mp4");
        assert_eq!(artifact.recording_id(), session.id());
        assert_eq!(session.state(), RecordingState::Stopped);
    }
}
