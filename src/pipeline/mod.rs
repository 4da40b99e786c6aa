//! Capture-to-upload pipeline - drives the capture session and uploads from UI commands

mod engine;

pub use engine::{create_engine_channels, Engine};

use std::path::PathBuf;

use crate::api::FeedPost;
use crate::capture::CaptureMode;

/// Commands that can be sent to the engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Switch between file selection and live capture
    SetMode(CaptureMode),
    /// Pick a file for upload in file mode
    SelectFile(PathBuf),
    /// Forget the picked file
    ClearFile,
    /// Start recording from the live preview
    StartRecording,
    /// Stop recording and assemble the artifact
    StopRecording,
    /// Share the current file or recording
    Submit { emotion: String },
    /// Reload the feed
    RefreshFeed,
    /// Reload the point total
    RefreshPoints,
    /// Release the device, end the server session and stop
    Logout,
    /// Release the device and stop
    Shutdown,
}

/// Status updates from the engine
#[derive(Debug, Clone)]
pub enum EngineStatus {
    ModeChanged(CaptureMode),
    /// Live preview is running, recording can start
    PreviewReady,
    RecordingStarted { format: String },
    RecordingProgress { fragments: usize, bytes: usize },
    /// A recording finished and can be shared
    ArtifactReady { bytes: usize, format: String },
    FileSelected { filename: String, bytes: u64 },
    FileCleared,
    /// The capture device went away
    DeviceLost { reason: String },
    /// Whether the share control should be enabled
    SubmitAvailable(bool),
    Uploading,
    Uploaded { message: String, points: i64 },
    /// Submission refused locally, nothing was sent
    UploadRejected(String),
    /// The server or network refused the submission
    UploadFailed(String),
    Points(i64),
    Feed(Vec<FeedPost>),
    LoggedOut,
    Error(String),
}
