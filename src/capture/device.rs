//! Capture device trait and the live stream handle it hands out

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{MediaFormat, RecorderEvent};
use crate::error::{CaptureError, DeviceAccessError};

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One track of a device stream
#[derive(Debug, Clone)]
pub struct MediaTrack {
    pub kind: TrackKind,
    pub label: String,
    live: bool,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            live: true,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// The device side of a live stream: the hardware feed plus its encoder.
pub trait StreamSource: Send {
    /// Whether the encoder can produce this format
    fn supports_format(&self, format: &MediaFormat) -> bool;

    /// Format the encoder picks when none of the preferred ones is supported
    fn default_format(&self) -> MediaFormat;

    /// Begin encoding. Fragments are sent every `timeslice`; after
    /// `stop_encoder` the source flushes what it has and sends
    /// [`RecorderEvent::Stopped`].
    fn start_encoder(
        &mut self,
        format: &MediaFormat,
        timeslice: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError>;

    /// Ask a running encoder to finish. No-op when idle.
    fn stop_encoder(&mut self);

    /// Stop the hardware feed for every track
    fn stop_tracks(&mut self);
}

/// A combined audio+video capture device
#[async_trait]
pub trait MediaDevice: Send + Sync {
    /// Request a live audio+video stream
    async fn acquire(&self) -> Result<DeviceStream, DeviceAccessError>;

    /// Stop every track of `stream`. Safe to call on an already released stream.
    fn release(&self, mut stream: DeviceStream) {
        stream.release();
    }
}

/// Exclusive handle to a live device stream.
///
/// Once released it can never be read from again; dropping the handle releases it.
pub struct DeviceStream {
    id: Uuid,
    tracks: Vec<MediaTrack>,
    source: Box<dyn StreamSource>,
    released: bool,
}

impl DeviceStream {
    pub fn new(tracks: Vec<MediaTrack>, source: Box<dyn StreamSource>) -> Self {
        let id = Uuid::new_v4();
        debug!("Device stream {} opened with {} tracks", id, tracks.len());
        Self {
            id,
            tracks,
            source,
            released: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// True while the handle is unreleased and at least one track is live
    pub fn is_live(&self) -> bool {
        !self.released && self.tracks.iter().any(MediaTrack::is_live)
    }

    pub fn supports_format(&self, format: &MediaFormat) -> bool {
        self.source.supports_format(format)
    }

    pub fn default_format(&self) -> MediaFormat {
        self.source.default_format()
    }

    /// Start the encoder on this stream
    pub fn start_encoder(
        &mut self,
        format: &MediaFormat,
        timeslice: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError> {
        if self.released {
            return Err(CaptureError::StreamReleased);
        }
        self.source.start_encoder(format, timeslice, events)
    }

    pub fn stop_encoder(&mut self) {
        if !self.released {
            self.source.stop_encoder();
        }
    }

    /// Stop the encoder and all tracks. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.source.stop_encoder();
        self.source.stop_tracks();
        for track in &mut self.tracks {
            track.live = false;
        }
        self.released = true;
        info!("Device stream {} released", self.id);
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks)
            .field("released", &self.released)
            .finish()
    }
}
