//! Upload coordinator
//!
//! A submission is prepared first: the emotion and media source are checked
//! locally and bound into an [`UploadJob`]. Only a prepared job is sent to the
//! feed server, as one multipart request. At most one job is in flight per
//! coordinator (clones share the guard).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Emotion, SelectedFile};
use crate::api::{FeedClient, UploadBody, UploadReceipt};
use crate::capture::{CaptureMode, MediaArtifact};
use crate::config::UploadConfig;
use crate::error::{UploadError, ValidationError};

/// One validated submission attempt: the media plus its emotion tag
#[derive(Debug)]
pub struct UploadJob {
    emotion: Emotion,
    body: UploadBody,
}

impl UploadJob {
    pub fn emotion(&self) -> Emotion {
        self.emotion
    }
}

/// Submits moments to the feed
#[derive(Clone)]
pub struct UploadCoordinator {
    client: FeedClient,
    filename_prefix: String,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when dropped, whatever the outcome
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl UploadCoordinator {
    pub fn new(client: FeedClient, config: &UploadConfig) -> Self {
        Self {
            client,
            filename_prefix: config.filename_prefix.clone(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check a submission for `mode`: the picked file in file mode, the
    /// recorded artifact in live mode. Never touches the network.
    ///
    /// Nothing is consumed here; the caller discards the artifact or
    /// selection once the job has been sent successfully.
    pub fn prepare(
        &self,
        mode: CaptureMode,
        emotion: &str,
        file: Option<&SelectedFile>,
        artifact: Option<&MediaArtifact>,
    ) -> Result<UploadJob, ValidationError> {
        let emotion: Emotion = emotion.parse()?;
        let body = match mode {
            CaptureMode::FileSelect => {
                let file = file.ok_or(ValidationError::NoFileSelected)?;
                if file.size == 0 {
                    return Err(ValidationError::EmptyFile);
                }
                debug!("Prepared selected file {:?}", file.path);
                UploadBody::File {
                    path: file.path.clone(),
                    filename: file.filename.clone(),
                    len: file.size,
                    format: file.format.clone(),
                }
            }
            CaptureMode::LiveCapture => {
                let artifact = artifact.ok_or(ValidationError::NoArtifact)?;
                if artifact.is_empty() {
                    return Err(ValidationError::EmptyArtifact);
                }
                debug!("Prepared recording {}", artifact.recording_id());
                UploadBody::Bytes {
                    data: artifact.data().to_vec(),
                    filename: artifact.filename(&self.filename_prefix),
                    format: artifact.format().clone(),
                }
            }
        };
        Ok(UploadJob { emotion, body })
    }

    /// Send a prepared job. Fails with [`UploadError::Busy`] while another
    /// job is in flight.
    pub async fn send(&self, job: UploadJob) -> Result<UploadReceipt, UploadError> {
        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            warn!("Upload already in progress, ignoring submit");
            return Err(UploadError::Busy);
        };

        info!("Uploading moment (feeling {})", job.emotion);
        match self.client.upload(job.emotion.as_str(), job.body).await {
            Ok(receipt) => {
                info!("{} (points: {})", receipt.message, receipt.points);
                Ok(receipt)
            }
            Err(e) => {
                warn!("Upload failed: {}", e);
                Err(e.into())
            }
        }
    }
}
