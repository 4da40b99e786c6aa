//! Capture session state machine
//!
//! Owns the device stream and the current recording:
//!
//! ```text
//! Idle -> PreviewActive -> Recording -> Stopped
//!   ^          |               |           |
//!   +----------+---------------+-----------+  exit_live_mode
//! ```
//!
//! Re-entering live mode from any state releases the old stream before a
//! fresh one is acquired, so there is never more than one live handle.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    negotiate_format, CaptureMode, DeviceStream, Fragment, MediaArtifact, MediaDevice,
    MediaFormat, RecorderEvent, RecordingSession,
};
use crate::config::CaptureConfig;
use crate::error::CaptureError;

/// Capture session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Stream acquired, not recording
    PreviewActive,
    Recording,
    /// Recording finished, artifact ready
    Stopped,
}

pub struct CaptureSession {
    device: Box<dyn MediaDevice>,
    mode: CaptureMode,
    state: SessionState,
    stream: Option<DeviceStream>,
    recording: Option<RecordingSession>,
    artifact: Option<MediaArtifact>,
    preferred_formats: Vec<MediaFormat>,
    timeslice: Duration,
}

impl CaptureSession {
    pub fn new(device: Box<dyn MediaDevice>, config: &CaptureConfig) -> Self {
        Self {
            device,
            mode: CaptureMode::default(),
            state: SessionState::Idle,
            stream: None,
            recording: None,
            artifact: None,
            preferred_formats: config
                .preferred_formats
                .iter()
                .map(|mime| MediaFormat::new(mime.as_str()))
                .collect(),
            timeslice: config.timeslice(),
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    /// True while a device stream is held
    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn recording(&self) -> Option<&RecordingSession> {
        self.recording.as_ref()
    }

    /// The current artifact, if a recording has finished
    pub fn artifact(&self) -> Option<&MediaArtifact> {
        self.artifact.as_ref()
    }

    /// Switch between file selection and live capture
    pub async fn set_mode(&mut self, mode: CaptureMode) -> Result<(), CaptureError> {
        info!("Capture mode: {:?}", mode);
        self.mode = mode;
        match mode {
            CaptureMode::FileSelect => {
                self.exit_live_mode();
                Ok(())
            }
            CaptureMode::LiveCapture => self.enter_live_mode().await,
        }
    }

    /// Acquire a fresh stream and show the preview.
    ///
    /// On failure the session stays out of live preview and holds no stream.
    pub async fn enter_live_mode(&mut self) -> Result<(), CaptureError> {
        self.mode = CaptureMode::LiveCapture;
        self.release_stream();
        self.recording = None;
        self.state = SessionState::Idle;

        debug!("Requesting capture device...");
        match self.device.acquire().await {
            Ok(stream) => {
                let labels: Vec<&str> = stream.tracks().iter().map(|t| t.label.as_str()).collect();
                info!("Camera ready (stream {}: {})", stream.id(), labels.join(", "));
                self.stream = Some(stream);
                self.artifact = None;
                self.state = SessionState::PreviewActive;
                Ok(())
            }
            Err(e) => {
                warn!("Camera failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Release the stream from any state, even mid-recording.
    pub fn exit_live_mode(&mut self) {
        if self.state == SessionState::Recording {
            warn!("Leaving live mode while recording, captured fragments are dropped");
        }
        self.release_stream();
        self.recording = None;
        self.state = SessionState::Idle;
    }

    /// Begin a new recording on the preview stream.
    ///
    /// Returns the receiver on which the encoder delivers its fragments. Any
    /// previous recording and artifact are discarded.
    pub fn start(&mut self) -> Result<mpsc::UnboundedReceiver<RecorderEvent>, CaptureError> {
        if self.state != SessionState::PreviewActive {
            return Err(CaptureError::NoActiveStream);
        }
        let stream = match self.stream.as_mut() {
            Some(stream) if stream.is_live() => stream,
            _ => return Err(CaptureError::NoActiveStream),
        };

        let fallback = stream.default_format();
        let format = negotiate_format(
            &self.preferred_formats,
            |f| stream.supports_format(f),
            fallback,
        );
        debug!("Recorder created with format {}", format);

        let (tx, rx) = mpsc::unbounded_channel();
        stream.start_encoder(&format, self.timeslice, tx)?;

        let mut recording = RecordingSession::new(format);
        recording.begin();
        self.recording = Some(recording);
        self.artifact = None;
        self.state = SessionState::Recording;
        Ok(rx)
    }

    /// Feed one encoder fragment into the current recording
    pub fn on_fragment(&mut self, fragment: Fragment) -> Result<(), CaptureError> {
        if self.state != SessionState::Recording {
            return Err(CaptureError::NotRecording);
        }
        match self.recording.as_mut() {
            Some(recording) => {
                recording.append(fragment);
                Ok(())
            }
            None => Err(CaptureError::NotRecording),
        }
    }

    /// Ask the encoder to flush its last fragment. The recording stays open
    /// until [`stop`](Self::stop).
    pub fn request_stop(&mut self) -> Result<(), CaptureError> {
        if self.state != SessionState::Recording {
            return Err(CaptureError::NotRecording);
        }
        if let Some(stream) = self.stream.as_mut() {
            stream.stop_encoder();
        }
        Ok(())
    }

    /// Finish the recording and assemble its artifact from every fragment
    /// received so far. A zero-byte artifact is kept as is.
    pub fn stop(&mut self) -> Result<MediaArtifact, CaptureError> {
        if self.state != SessionState::Recording {
            return Err(CaptureError::NotRecording);
        }
        if let Some(stream) = self.stream.as_mut() {
            stream.stop_encoder();
        }
        let artifact = self
            .recording
            .as_mut()
            .and_then(RecordingSession::finish)
            .ok_or(CaptureError::NotRecording)?;

        if artifact.is_empty() {
            warn!("Recording produced an empty artifact");
        }
        self.artifact = Some(artifact.clone());
        self.state = SessionState::Stopped;
        Ok(artifact)
    }

    /// The device disappeared. A running recording is closed with what it
    /// has; the dead stream is released either way.
    pub fn handle_device_lost(&mut self, reason: &str) -> Option<MediaArtifact> {
        warn!("Capture device lost: {}", reason);
        let artifact = match self.state {
            SessionState::Recording => self.stop().ok(),
            SessionState::PreviewActive => {
                self.state = SessionState::Idle;
                None
            }
            SessionState::Idle | SessionState::Stopped => None,
        };
        self.release_stream();
        artifact
    }

    /// Remove the artifact so it cannot be submitted again
    pub fn take_artifact(&mut self) -> Option<MediaArtifact> {
        self.artifact.take()
    }

    fn release_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.device.release(stream);
        }
    }
}
