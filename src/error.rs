use thiserror::Error;

/// The capture device could not be opened. The cause text is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceAccessError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No capture device: {0}")]
    NotFound(String),

    #[error("Capture device unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the capture session state machine
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Camera failed: {0}")]
    DeviceAccess(#[from] DeviceAccessError),

    #[error("Camera not active")]
    NoActiveStream,

    #[error("Not recording")]
    NotRecording,

    #[error("Device stream has already been released")]
    StreamReleased,

    #[error("Encoder error: {0}")]
    Encoder(String),
}

/// Local submission checks. None of these reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select a file first")]
    NoFileSelected,

    #[error("Selected file is empty")]
    EmptyFile,

    #[error("Please record a video first")]
    NoArtifact,

    #[error("Recording failed (empty file), try again")]
    EmptyArtifact,

    #[error("Unknown emotion: {0:?}")]
    UnknownEmotion(String),
}

/// Errors returned by the upload coordinator
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("An upload is already in progress")]
    Busy,

    #[error("{message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },
}

/// Errors talking to the feed server
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response from server: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<ApiError> for UploadError {
    fn from(err: ApiError) -> Self {
        let status = err.status();
        let message = match err {
            // Server payload text is surfaced verbatim
            ApiError::Status { message, .. } => message,
            ApiError::Io(e) => format!("could not read media: {}", e),
            _ => "Upload failed. Check the server connection.".to_string(),
        };
        UploadError::Transport { status, message }
    }
}
