//! Scripted capture device for tests

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{
    DeviceStream, Fragment, MediaDevice, MediaFormat, MediaTrack, RecorderEvent, StreamSource,
    TrackKind,
};
use crate::error::{CaptureError, DeviceAccessError};

#[derive(Default)]
struct Inner {
    acquisitions: usize,
    live_streams: usize,
    tracks_stopped: usize,
    encoder_starts: usize,
    fail_with: Option<DeviceAccessError>,
    supported: Option<Vec<MediaFormat>>,
    default_format: Option<MediaFormat>,
    script: Vec<Vec<u8>>,
    silent_stop: bool,
    sender: Option<mpsc::UnboundedSender<RecorderEvent>>,
    last_format: Option<MediaFormat>,
}

/// Shared view of everything the scripted device did
#[derive(Clone, Default)]
pub struct ScriptedDeviceState {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedDeviceState {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Fragments emitted as soon as the encoder starts
    pub fn set_script(&self, fragments: Vec<Vec<u8>>) {
        self.lock().script = fragments;
    }

    pub fn fail_next_acquire(&self, err: DeviceAccessError) {
        self.lock().fail_with = Some(err);
    }

    pub fn set_supported(&self, formats: Vec<MediaFormat>) {
        self.lock().supported = Some(formats);
    }

    pub fn set_default_format(&self, format: MediaFormat) {
        self.lock().default_format = Some(format);
    }

    /// Never send the stop completion event
    pub fn set_silent_stop(&self, silent: bool) {
        self.lock().silent_stop = silent;
    }

    /// Push an event as if the encoder produced it
    pub fn emit(&self, event: RecorderEvent) {
        if let Some(tx) = self.lock().sender.as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.lock().acquisitions
    }

    pub fn live_streams(&self) -> usize {
        self.lock().live_streams
    }

    pub fn tracks_stopped(&self) -> usize {
        self.lock().tracks_stopped
    }

    pub fn encoder_starts(&self) -> usize {
        self.lock().encoder_starts
    }

    pub fn last_format(&self) -> Option<MediaFormat> {
        self.lock().last_format.clone()
    }
}

pub struct ScriptedDevice {
    state: ScriptedDeviceState,
}

impl ScriptedDevice {
    pub fn new(state: ScriptedDeviceState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl MediaDevice for ScriptedDevice {
    async fn acquire(&self) -> Result<DeviceStream, DeviceAccessError> {
        let mut inner = self.state.lock();
        if let Some(err) = inner.fail_with.take() {
            return Err(err);
        }
        inner.acquisitions += 1;
        inner.live_streams += 1;
        drop(inner);

        let tracks = vec![
            MediaTrack::new(TrackKind::Audio, "scripted mic"),
            MediaTrack::new(TrackKind::Video, "scripted camera"),
        ];
        Ok(DeviceStream::new(
            tracks,
            Box::new(ScriptedSource {
                state: self.state.clone(),
                encoding: false,
            }),
        ))
    }
}

struct ScriptedSource {
    state: ScriptedDeviceState,
    encoding: bool,
}

impl StreamSource for ScriptedSource {
    fn supports_format(&self, format: &MediaFormat) -> bool {
        match &self.state.lock().supported {
            Some(list) => list.contains(format),
            None => true,
        }
    }

    fn default_format(&self) -> MediaFormat {
        self.state
            .lock()
            .default_format
            .clone()
            .unwrap_or_else(|| MediaFormat::new("video/x-matroska"))
    }

    fn start_encoder(
        &mut self,
        format: &MediaFormat,
        _timeslice: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError> {
        let mut inner = self.state.lock();
        inner.encoder_starts += 1;
        inner.last_format = Some(format.clone());
        for (sequence, data) in inner.script.iter().enumerate() {
            let _ = events.send(RecorderEvent::Data(Fragment::new(sequence as u64, data.clone())));
        }
        inner.sender = Some(events);
        self.encoding = true;
        Ok(())
    }

    fn stop_encoder(&mut self) {
        if !self.encoding {
            return;
        }
        self.encoding = false;
        let mut inner = self.state.lock();
        if !inner.silent_stop {
            if let Some(tx) = inner.sender.take() {
                let _ = tx.send(RecorderEvent::Stopped);
            }
        }
    }

    fn stop_tracks(&mut self) {
        let mut inner = self.state.lock();
        inner.tracks_stopped += 1;
        inner.live_streams = inner.live_streams.saturating_sub(1);
    }
}
