//! File replay capture device
//!
//! Plays a media file back as if it were a live camera: the "encoder" emits
//! the file's bytes one fragment per timeslice. When the file runs out the
//! feed ends like an unplugged device, so a recording that spans the whole
//! file reproduces it byte for byte.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    DeviceStream, Fragment, MediaDevice, MediaFormat, MediaTrack, RecorderEvent, StreamSource,
    TrackKind,
};
use crate::error::{CaptureError, DeviceAccessError};

const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;

/// Capture device backed by a media file
pub struct ReplayDevice {
    source: Option<PathBuf>,
    chunk_bytes: usize,
}

impl ReplayDevice {
    pub fn new(source: Option<PathBuf>) -> Self {
        Self {
            source,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }

    /// Bytes emitted per timeslice
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }
}

#[async_trait]
impl MediaDevice for ReplayDevice {
    async fn acquire(&self) -> Result<DeviceStream, DeviceAccessError> {
        let path = self.source.clone().ok_or_else(|| {
            DeviceAccessError::NotFound("no capture source configured".to_string())
        })?;

        // Opening the file is the permission check
        if let Err(e) = tokio::fs::File::open(&path).await {
            return Err(match e.kind() {
                std::io::ErrorKind::NotFound => {
                    DeviceAccessError::NotFound(format!("{}: {}", path.display(), e))
                }
                std::io::ErrorKind::PermissionDenied => {
                    DeviceAccessError::PermissionDenied(format!("{}: {}", path.display(), e))
                }
                _ => DeviceAccessError::Unavailable(format!("{}: {}", path.display(), e)),
            });
        }

        info!("Replay device opened {:?}", path);
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "replay".to_string());

        let tracks = vec![
            MediaTrack::new(TrackKind::Audio, format!("{} (audio)", label)),
            MediaTrack::new(TrackKind::Video, format!("{} (video)", label)),
        ];
        let source = ReplaySource {
            format: MediaFormat::from_path(&path),
            path,
            chunk_bytes: self.chunk_bytes,
            feed: CancellationToken::new(),
            encoder: None,
        };
        Ok(DeviceStream::new(tracks, Box::new(source)))
    }
}

struct ReplaySource {
    path: PathBuf,
    format: MediaFormat,
    chunk_bytes: usize,
    /// Cancelled when the tracks are stopped
    feed: CancellationToken,
    /// Cancelled to stop the running encoder
    encoder: Option<CancellationToken>,
}

impl StreamSource for ReplaySource {
    fn supports_format(&self, format: &MediaFormat) -> bool {
        // Replay can only reproduce the container it reads
        format.essence() == self.format.essence()
    }

    fn default_format(&self) -> MediaFormat {
        self.format.clone()
    }

    fn start_encoder(
        &mut self,
        format: &MediaFormat,
        timeslice: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError> {
        if self.feed.is_cancelled() {
            return Err(CaptureError::StreamReleased);
        }
        if self.encoder.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return Err(CaptureError::Encoder("encoder already running".to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CaptureError::Encoder(format!("no async runtime: {}", e)))?;

        if format.essence() != self.format.essence() {
            debug!(
                "Replay source is {}, ignoring requested format {}",
                self.format, format
            );
        }

        let stop = CancellationToken::new();
        self.encoder = Some(stop.clone());

        let path = self.path.clone();
        let feed = self.feed.clone();
        let chunk_bytes = self.chunk_bytes;
        runtime.spawn(async move {
            if let Err(e) = replay(path, timeslice, chunk_bytes, stop, feed, &events).await {
                warn!("Replay encoder failed: {}", e);
                let _ = events.send(RecorderEvent::TrackEnded {
                    reason: e.to_string(),
                });
            }
        });
        Ok(())
    }

    fn stop_encoder(&mut self) {
        if let Some(stop) = self.encoder.take() {
            stop.cancel();
        }
    }

    fn stop_tracks(&mut self) {
        self.feed.cancel();
    }
}

async fn replay(
    path: PathBuf,
    timeslice: Duration,
    chunk_bytes: usize,
    stop: CancellationToken,
    feed: CancellationToken,
    events: &mpsc::UnboundedSender<RecorderEvent>,
) -> std::io::Result<()> {
    let mut file = tokio::fs::File::open(&path).await?;
    let mut sequence = 0u64;
    let mut ticker = tokio::time::interval_at(Instant::now() + timeslice, timeslice);

    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => {
                // Flush one last slice, then report completion
                let chunk = read_chunk(&mut file, chunk_bytes).await?;
                if !chunk.is_empty() {
                    let _ = events.send(RecorderEvent::Data(Fragment::new(sequence, chunk)));
                }
                let _ = events.send(RecorderEvent::Stopped);
                debug!("Replay encoder stopped after {} fragments", sequence);
                return Ok(());
            }

            _ = feed.cancelled() => {
                let _ = events.send(RecorderEvent::TrackEnded {
                    reason: "device tracks stopped".to_string(),
                });
                return Ok(());
            }

            _ = ticker.tick() => {
                let chunk = read_chunk(&mut file, chunk_bytes).await?;
                if chunk.is_empty() {
                    let _ = events.send(RecorderEvent::TrackEnded {
                        reason: format!("replay source {:?} ended", path),
                    });
                    return Ok(());
                }
                if events.send(RecorderEvent::Data(Fragment::new(sequence, chunk))).is_err() {
                    debug!("Recorder receiver dropped, ending replay");
                    return Ok(());
                }
                sequence += 1;
            }
        }
    }
}

async fn read_chunk(file: &mut tokio::fs::File, chunk_bytes: usize) -> std::io::Result<Vec<u8>> {
    let mut chunk = vec![0u8; chunk_bytes];
    let mut filled = 0;
    while filled < chunk_bytes {
        let n = file.read(&mut chunk[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    chunk.truncate(filled);
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<RecorderEvent>) -> RecorderEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for recorder event")
            .expect("recorder channel closed")
    }

    fn media_file(len: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".webm").tempfile().unwrap();
        let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let err = ReplayDevice::new(None).acquire().await.unwrap_err();
        assert!(matches!(err, DeviceAccessError::NotFound(_)));

        let err = ReplayDevice::new(Some(PathBuf::from("/nonexistent/clip.webm")))
            .acquire()
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceAccessError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_format_follows_source_file() {
        let file = media_file(4);
        let stream = ReplayDevice::new(Some(file.path().to_path_buf()))
            .acquire()
            .await
            .unwrap();

        assert!(stream.supports_format(&"video/webm".into()));
        assert!(!stream.supports_format(&"video/mp4".into()));
        assert_eq!(stream.default_format().mime(), "video/webm");
        assert!(stream.is_live());
    }

    #[tokio::test]
    async fn test_whole_file_replays_then_track_ends() {
        let file = media_file(10);
        let mut stream = ReplayDevice::new(Some(file.path().to_path_buf()))
            .with_chunk_bytes(4)
            .acquire()
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        stream
            .start_encoder(&"video/webm".into(), Duration::from_millis(5), tx)
            .unwrap();

        let mut data = Vec::new();
        loop {
            match next_event(&mut rx).await {
                RecorderEvent::Data(fragment) => data.extend(fragment.data),
                RecorderEvent::TrackEnded { .. } => break,
                RecorderEvent::Stopped => panic!("unexpected stop"),
            }
        }
        assert_eq!(data, std::fs::read(file.path()).unwrap());
    }

    #[tokio::test]
    async fn test_stop_flushes_and_completes() {
        let file = media_file(1000);
        let mut stream = ReplayDevice::new(Some(file.path().to_path_buf()))
            .with_chunk_bytes(8)
            .acquire()
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        stream
            .start_encoder(&"video/webm".into(), Duration::from_millis(10), tx)
            .unwrap();

        let mut data = Vec::new();
        if let RecorderEvent::Data(fragment) = next_event(&mut rx).await {
            data.extend(fragment.data);
        }
        stream.stop_encoder();

        loop {
            match next_event(&mut rx).await {
                RecorderEvent::Data(fragment) => data.extend(fragment.data),
                RecorderEvent::Stopped => break,
                RecorderEvent::TrackEnded { reason } => panic!("track ended: {}", reason),
            }
        }
        let source_bytes = std::fs::read(file.path()).unwrap();
        assert!(data.len() >= 16);
        assert_eq!(&source_bytes[..data.len()], data.as_slice());
    }

    #[tokio::test]
    async fn test_release_ends_encoder() {
        let file = media_file(1000);
        let mut stream = ReplayDevice::new(Some(file.path().to_path_buf()))
            .with_chunk_bytes(8)
            .acquire()
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        stream
            .start_encoder(&"video/webm".into(), Duration::from_millis(10), tx)
            .unwrap();
        stream.release();

        // Encoder stop wins over the feed ending
        loop {
            match next_event(&mut rx).await {
                RecorderEvent::Data(_) => continue,
                RecorderEvent::Stopped => break,
                RecorderEvent::TrackEnded { reason } => panic!("track ended: {}", reason),
            }
        }
        assert!(!stream.is_live());
    }
}
