//! Local Media Controller
//!
//! Owns the local capture stream for one call session. Every outbound peer
//! connection is fed from this stream's tracks.
//!
//! Muting never stops or re-creates a track: it only flips the enabled flag,
//! so the tracks stay attached to every peer connection and unmuting takes
//! effect everywhere at once. Stopping happens exactly once, in `release`.

pub mod devices;
pub mod track;

pub use devices::{DeviceStatus, MediaAccessError, MediaConstraints, MediaDevices, SyntheticDevices};
pub use track::{MediaStream, MediaTrack, TrackKind};

use std::sync::atomic::{AtomicBool, Ordering};

/// Local capture stream plus its mute and release controls
#[derive(Debug)]
pub struct LocalMediaController {
    stream: MediaStream,
    released: AtomicBool,
}

impl LocalMediaController {
    /// Capture the microphone, and the camera if `wants_video`.
    ///
    /// # Errors
    ///
    /// Returns the device layer's `MediaAccessError` unchanged.
    pub async fn acquire(devices: &dyn MediaDevices, wants_video: bool) -> Result<Self, MediaAccessError> {
        tracing::info!("[Media] Requesting local media (video={})", wants_video);
        let stream = devices
            .get_user_media(MediaConstraints::call(wants_video))
            .await
            .map_err(|e| {
                tracing::error!("[Media] Local media unavailable: {}", e);
                e
            })?;

        tracing::info!(
            "[Media] Acquired stream {} with {} track(s)",
            stream.id(),
            stream.track_count()
        );
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already captured stream
    pub fn from_stream(stream: MediaStream) -> Self {
        Self {
            stream,
            released: AtomicBool::new(false),
        }
    }

    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    /// Flip every audio track; returns the resulting enabled state
    pub fn toggle_audio(&self) -> bool {
        self.toggle(TrackKind::Audio)
    }

    /// Flip every video track; returns the resulting enabled state
    pub fn toggle_video(&self) -> bool {
        self.toggle(TrackKind::Video)
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.is_enabled(TrackKind::Audio)
    }

    pub fn is_video_enabled(&self) -> bool {
        self.is_enabled(TrackKind::Video)
    }

    fn is_enabled(&self, kind: TrackKind) -> bool {
        !self.is_released()
            && self
                .stream
                .tracks_of(kind)
                .next()
                .map(|t| t.is_enabled())
                .unwrap_or(false)
    }

    fn toggle(&self, kind: TrackKind) -> bool {
        if self.is_released() {
            return false;
        }
        let mut enabled = None;
        for track in self.stream.tracks_of(kind) {
            let next = !track.is_enabled();
            track.set_enabled(next);
            enabled.get_or_insert(next);
        }
        let enabled = enabled.unwrap_or(false);
        tracing::debug!("[Media] {} enabled = {}", kind, enabled);
        enabled
    }

    /// Stop every track. Only the first call does anything; it returns true.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        let stopped = self.stream.tracks().iter().filter(|t| t.stop()).count();
        tracing::info!("[Media] Released stream {} ({} track(s) stopped)", self.stream.id(), stopped);
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for LocalMediaController {
    fn drop(&mut self) {
        self.release();
    }
}
