//! Capture devices
//!
//! `MediaDevices` is the seam to whatever opens microphones and cameras on
//! the host (a browser's `getUserMedia`, a native capture backend). The call
//! layer only asks for a combined stream and reacts to the failure cases.
//!
//! `SyntheticDevices` ships with the crate for the demo binary and tests. It
//! produces tracks without touching hardware and can be configured to deny
//! permission or report a missing or busy device.

use crate::call::media::track::{MediaStream, MediaTrack, TrackKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// What to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    /// Microphone, plus camera when `wants_video`
    pub fn call(wants_video: bool) -> Self {
        Self { audio: true, video: wants_video }
    }
}

/// Why local capture could not start
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaAccessError {
    #[error("permission to capture media was denied")]
    PermissionDenied,
    #[error("no {0} device found")]
    NoDevice(TrackKind),
    #[error("{0} device is busy")]
    DeviceBusy(TrackKind),
    #[error("no media kind requested")]
    NothingRequested,
}

/// Host capture facility
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Open the requested devices and return one combined stream
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<MediaStream, MediaAccessError>;
}

/// Availability of one synthetic device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Available,
    Missing,
    Busy,
}

/// In-process devices producing tracks without hardware
#[derive(Debug)]
pub struct SyntheticDevices {
    permission_granted: bool,
    microphone: DeviceStatus,
    camera: DeviceStatus,
    requests: AtomicUsize,
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticDevices {
    /// Microphone and camera available, permission granted
    pub fn new() -> Self {
        Self {
            permission_granted: true,
            microphone: DeviceStatus::Available,
            camera: DeviceStatus::Available,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn deny_permission(mut self) -> Self {
        self.permission_granted = false;
        self
    }

    pub fn with_microphone(mut self, status: DeviceStatus) -> Self {
        self.microphone = status;
        self
    }

    pub fn with_camera(mut self, status: DeviceStatus) -> Self {
        self.camera = status;
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of capture requests served so far, successful or not
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn check(status: DeviceStatus, kind: TrackKind) -> Result<(), MediaAccessError> {
        match status {
            DeviceStatus::Available => Ok(()),
            DeviceStatus::Missing => Err(MediaAccessError::NoDevice(kind)),
            DeviceStatus::Busy => Err(MediaAccessError::DeviceBusy(kind)),
        }
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<MediaStream, MediaAccessError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        // stands in for the permission prompt
        tokio::task::yield_now().await;

        if !constraints.audio && !constraints.video {
            return Err(MediaAccessError::NothingRequested);
        }
        if !self.permission_granted {
            return Err(MediaAccessError::PermissionDenied);
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            Self::check(self.microphone, TrackKind::Audio)?;
            tracks.push(Arc::new(MediaTrack::new(TrackKind::Audio, "Synthetic Microphone")));
        }
        if constraints.video {
            Self::check(self.camera, TrackKind::Video)?;
            tracks.push(Arc::new(MediaTrack::new(TrackKind::Video, "Synthetic Camera")));
        }
        Ok(MediaStream::new(tracks))
    }
}
