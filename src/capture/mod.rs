//! Live capture pipeline
//!
//! The [`CaptureSession`] owns the single device stream and the current
//! recording. Encoded fragments come back from the device as
//! [`RecorderEvent`]s on a channel and are fed into the session in arrival
//! order; stopping a recording turns them into one [`MediaArtifact`].

mod artifact;
mod buffer;
mod device;
mod format;
mod recording;
mod replay;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use artifact::MediaArtifact;
pub use buffer::RecordingBuffer;
pub use device::{DeviceStream, MediaDevice, MediaTrack, StreamSource, TrackKind};
pub use format::{negotiate_format, MediaFormat};
pub use recording::{RecordingSession, RecordingState};
pub use replay::ReplayDevice;
pub use session::{CaptureSession, SessionState};

use serde::{Deserialize, Serialize};

/// Where the next upload's media comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    #[default]
    FileSelect,
    LiveCapture,
}

/// A chunk of encoded media emitted while recording
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Position in the encoder's output, starting at 0
    pub sequence: u64,
    pub data: Vec<u8>,
}

impl Fragment {
    pub fn new(sequence: u64, data: Vec<u8>) -> Self {
        Self { sequence, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Events emitted by a running encoder
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// A fragment of encoded media
    Data(Fragment),
    /// The encoder flushed its last fragment after a stop request
    Stopped,
    /// The device went away underneath the encoder
    TrackEnded { reason: String },
}
