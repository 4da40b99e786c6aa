//! Pipeline engine
//!
//! Single task that owns the capture session. UI commands, encoder events and
//! the recording time limit are all handled from one `select!` loop, so the
//! session is only ever mutated from one place and fragments are appended in
//! the order the encoder sent them.

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::api::FeedClient;
use crate::capture::{CaptureMode, CaptureSession, MediaDevice, RecorderEvent};
use crate::config::Config;
use crate::upload::{SelectedFile, UploadCoordinator, UploadJob};

use super::{EngineCommand, EngineStatus};

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Create the command and status channels for an engine
pub fn create_engine_channels() -> (
    mpsc::Sender<EngineCommand>,
    mpsc::Receiver<EngineCommand>,
    broadcast::Sender<EngineStatus>,
    broadcast::Receiver<EngineStatus>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (status_tx, status_rx) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
    (cmd_tx, cmd_rx, status_tx, status_rx)
}

/// The engine ties the capture session to the upload coordinator
pub struct Engine {
    /// Configuration
    config: Config,
    /// Device stream and recording owner
    capture: CaptureSession,
    /// Upload coordinator
    uploader: UploadCoordinator,
    /// Feed server client for points, feed and logout
    client: FeedClient,
    /// File picked in file mode
    selected_file: Option<SelectedFile>,
    /// Command receiver
    cmd_rx: mpsc::Receiver<EngineCommand>,
    /// Status broadcaster
    status_tx: broadcast::Sender<EngineStatus>,
    /// Encoder events for the running recording
    recorder_rx: Option<mpsc::UnboundedReceiver<RecorderEvent>>,
    /// When the running recording is stopped automatically
    recording_deadline: Option<Instant>,
}

impl Engine {
    pub fn new(
        config: Config,
        device: Box<dyn MediaDevice>,
        client: FeedClient,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        status_tx: broadcast::Sender<EngineStatus>,
    ) -> Self {
        let capture = CaptureSession::new(device, &config.capture);
        let uploader = UploadCoordinator::new(client.clone(), &config.upload);

        Self {
            config,
            capture,
            uploader,
            client,
            selected_file: None,
            cmd_rx,
            status_tx,
            recorder_rx: None,
            recording_deadline: None,
        }
    }

    /// Run the engine main loop until shutdown or logout
    pub async fn run(&mut self) -> Result<()> {
        info!("Engine starting");
        self.publish(EngineStatus::ModeChanged(self.capture.mode()));
        self.publish(EngineStatus::SubmitAvailable(true));

        loop {
            tokio::select! {
                // Handle commands
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        info!("Command channel closed");
                        break;
                    };
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }

                // Handle encoder output
                event = next_recorder_event(self.recorder_rx.as_mut()) => {
                    self.handle_recorder_event(event);
                }

                // Recording time limit
                _ = sleep_until_deadline(self.recording_deadline) => {
                    info!(
                        "Recording reached {}s limit, stopping",
                        self.config.capture.max_recording_secs
                    );
                    self.stop_recording().await;
                }
            }
        }

        self.teardown();
        info!("Engine stopped");
        Ok(())
    }

    /// Returns false when the loop should end
    async fn handle_command(&mut self, cmd: EngineCommand) -> bool {
        debug!("Command: {:?}", cmd);
        match cmd {
            EngineCommand::SetMode(mode) => self.set_mode(mode).await,
            EngineCommand::SelectFile(path) => match SelectedFile::open(&path).await {
                Ok(file) => {
                    info!("Selected {:?} ({} bytes)", file.path, file.size);
                    self.publish(EngineStatus::FileSelected {
                        filename: file.filename.clone(),
                        bytes: file.size,
                    });
                    self.selected_file = Some(file);
                }
                Err(e) => {
                    warn!("Cannot select {:?}: {}", path, e);
                    self.publish(EngineStatus::Error(format!(
                        "Cannot select {}: {}",
                        path.display(),
                        e
                    )));
                }
            },
            EngineCommand::ClearFile => {
                self.selected_file = None;
                self.publish(EngineStatus::FileCleared);
            }
            EngineCommand::StartRecording => self.start_recording(),
            EngineCommand::StopRecording => self.stop_recording().await,
            EngineCommand::Submit { emotion } => self.submit(&emotion).await,
            EngineCommand::RefreshFeed => self.refresh_feed().await,
            EngineCommand::RefreshPoints => self.refresh_points().await,
            EngineCommand::Logout => {
                info!("Logout requested");
                self.teardown();
                if let Err(e) = self.client.logout().await {
                    warn!("Logout request failed: {}", e);
                }
                self.publish(EngineStatus::LoggedOut);
                return false;
            }
            EngineCommand::Shutdown => {
                info!("Shutdown command received");
                return false;
            }
        }
        true
    }

    async fn set_mode(&mut self, mode: CaptureMode) {
        // Leaving or re-entering live mode drops any running recording
        self.clear_recorder();
        let result = self.capture.set_mode(mode).await;
        self.publish(EngineStatus::ModeChanged(mode));
        match result {
            Ok(()) if mode == CaptureMode::LiveCapture => self.publish(EngineStatus::PreviewReady),
            Ok(()) => {}
            Err(e) => self.publish(EngineStatus::Error(e.to_string())),
        }
    }

    fn start_recording(&mut self) {
        match self.capture.start() {
            Ok(rx) => {
                self.recorder_rx = Some(rx);
                self.recording_deadline = self
                    .config
                    .capture
                    .max_recording()
                    .map(|limit| Instant::now() + limit);

                let format = self
                    .capture
                    .recording()
                    .map(|r| r.format().to_string())
                    .unwrap_or_default();
                self.publish(EngineStatus::RecordingStarted { format });
            }
            Err(e) => {
                warn!("Cannot start recording: {}", e);
                self.publish(EngineStatus::Error(e.to_string()));
            }
        }
    }

    /// Ask the encoder to flush, collect what it still sends, then build the artifact
    async fn stop_recording(&mut self) {
        self.recording_deadline = None;
        if let Err(e) = self.capture.request_stop() {
            warn!("Cannot stop recording: {}", e);
            self.publish(EngineStatus::Error(e.to_string()));
            return;
        }

        let mut lost: Option<String> = None;
        if let Some(mut rx) = self.recorder_rx.take() {
            let timeout = self.config.capture.finalize_timeout();
            let capture = &mut self.capture;
            let drained = tokio::time::timeout(timeout, async {
                while let Some(event) = rx.recv().await {
                    match event {
                        RecorderEvent::Data(fragment) => {
                            if let Err(e) = capture.on_fragment(fragment) {
                                debug!("Dropped fragment: {}", e);
                            }
                        }
                        RecorderEvent::Stopped => break,
                        RecorderEvent::TrackEnded { reason } => {
                            lost = Some(reason);
                            break;
                        }
                    }
                }
            })
            .await;

            if drained.is_err() {
                warn!(
                    "Encoder did not finish within {:?}, keeping fragments received so far",
                    timeout
                );
            }
        }

        match lost {
            Some(reason) => self.device_lost(reason),
            None => self.finish_recording(),
        }
    }

    fn finish_recording(&mut self) {
        self.clear_recorder();
        match self.capture.stop() {
            Ok(artifact) => {
                info!(
                    "Recording saved ({} bytes, {})",
                    artifact.size(),
                    artifact.format()
                );
                self.publish(EngineStatus::ArtifactReady {
                    bytes: artifact.size(),
                    format: artifact.format().to_string(),
                });
            }
            Err(e) => self.publish(EngineStatus::Error(e.to_string())),
        }
    }

    fn device_lost(&mut self, reason: String) {
        self.clear_recorder();
        let artifact = self.capture.handle_device_lost(&reason);
        self.publish(EngineStatus::DeviceLost { reason });
        if let Some(artifact) = artifact {
            self.publish(EngineStatus::ArtifactReady {
                bytes: artifact.size(),
                format: artifact.format().to_string(),
            });
        }
    }

    fn handle_recorder_event(&mut self, event: Option<RecorderEvent>) {
        match event {
            Some(RecorderEvent::Data(fragment)) => {
                if let Err(e) = self.capture.on_fragment(fragment) {
                    debug!("Dropped fragment: {}", e);
                    return;
                }
                if let Some(recording) = self.capture.recording() {
                    self.publish(EngineStatus::RecordingProgress {
                        fragments: recording.fragment_count(),
                        bytes: recording.bytes_captured(),
                    });
                }
            }
            Some(RecorderEvent::Stopped) => {
                // Encoder finished without being asked
                warn!("Encoder stopped on its own");
                self.finish_recording();
            }
            Some(RecorderEvent::TrackEnded { reason }) => self.device_lost(reason),
            None => {
                if self.capture.is_recording() {
                    self.device_lost("encoder went away".to_string());
                } else {
                    self.clear_recorder();
                }
            }
        }
    }

    async fn submit(&mut self, emotion: &str) {
        let mode = self.capture.mode();
        let prepared = self.uploader.prepare(
            mode,
            emotion,
            self.selected_file.as_ref(),
            self.capture.artifact(),
        );
        // Local rejections never disable the submit control
        let job: UploadJob = match prepared {
            Ok(job) => job,
            Err(e) => {
                info!("Upload rejected: {}", e);
                self.publish(EngineStatus::UploadRejected(e.to_string()));
                return;
            }
        };

        debug!("Sharing {:?} moment feeling {}", mode, job.emotion());
        self.publish(EngineStatus::SubmitAvailable(false));
        self.publish(EngineStatus::Uploading);

        match self.uploader.send(job).await {
            Ok(receipt) => {
                // An artifact or file is shared at most once
                self.capture.take_artifact();
                self.selected_file = None;

                self.publish(EngineStatus::Uploaded {
                    message: receipt.message,
                    points: receipt.points,
                });
                self.publish(EngineStatus::Points(receipt.points));

                if mode == CaptureMode::LiveCapture {
                    // Fresh stream for the next moment
                    self.clear_recorder();
                    match self.capture.enter_live_mode().await {
                        Ok(()) => self.publish(EngineStatus::PreviewReady),
                        Err(e) => self.publish(EngineStatus::Error(e.to_string())),
                    }
                }
                self.publish(EngineStatus::SubmitAvailable(true));
                self.refresh_feed().await;
            }
            Err(e) => {
                error!("Upload failed: {}", e);
                self.publish(EngineStatus::UploadFailed(e.to_string()));
                self.publish(EngineStatus::SubmitAvailable(true));
            }
        }
    }

    async fn refresh_feed(&mut self) {
        match self.client.feed().await {
            Ok(posts) => {
                debug!("Feed has {} posts", posts.len());
                self.publish(EngineStatus::Feed(posts));
            }
            Err(e) => {
                warn!("Failed to load feed: {}", e);
                self.publish(EngineStatus::Error(format!("Failed to load feed: {}", e)));
            }
        }
    }

    async fn refresh_points(&mut self) {
        match self.client.points().await {
            Ok(points) => self.publish(EngineStatus::Points(points)),
            Err(e) => {
                warn!("Failed to load points: {}", e);
                self.publish(EngineStatus::Error(format!("Failed to load points: {}", e)));
            }
        }
    }

    fn clear_recorder(&mut self) {
        self.recorder_rx = None;
        self.recording_deadline = None;
    }

    fn teardown(&mut self) {
        self.clear_recorder();
        self.capture.exit_live_mode();
    }

    fn publish(&self, status: EngineStatus) {
        let _ = self.status_tx.send(status);
    }
}

async fn next_recorder_event(
    rx: Option<&mut mpsc::UnboundedReceiver<RecorderEvent>>,
) -> Option<RecorderEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
