use super::AudioHandle;
use crate::error::PlaybackError;
use async_trait::async_trait;

/// Notifications from the output device back to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The audio started by `play(.., attempt)` ran to its end.
    Ended { attempt: u64 },
}

/// The single playback device.
///
/// Every `play` carries the attempt token it was started under; the device
/// echoes it back in [`PlaybackEvent::Ended`] so late events can be told apart
/// from current ones.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Prime the device from a user gesture.
    async fn unlock(&self) -> Result<(), PlaybackError>;

    /// Replace whatever is playing with `handle`.
    async fn play(&self, handle: &AudioHandle, attempt: u64) -> Result<(), PlaybackError>;

    fn pause(&self);

    fn resume(&self);

    /// Stop and rewind.
    fn stop(&self);

    /// Stop only if the audio playing was started by `attempt`.
    fn cancel(&self, attempt: u64);
}
