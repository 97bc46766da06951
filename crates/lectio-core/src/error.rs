//! Error taxonomy shared across the session core.
//!
//! Only [`SessionError::LoadFailure`] is meant to reach the view as a blocking
//! state. Persistence failures never leave their call site, and audio failures
//! surface as notices on the snapshot.

use thiserror::Error;

/// Failures talking to the reading/narration collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Failures producing narration audio. `Clone` because single-flight
/// synthesis hands the same result to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("narration unavailable: {0}")]
    SynthesisUnavailable(String),
    #[error("audio for chunk {0} was released before synthesis finished")]
    Stale(usize),
}

/// Failures starting playback on the audio output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// The output refuses to start without an explicit user action. Expected,
    /// never shown as an error.
    #[error("playback is blocked until the reader starts it")]
    Blocked,
    #[error("playback failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("could not load {what}: {reason}")]
    LoadFailure { what: String, reason: String },
}

impl SessionError {
    pub fn load(what: impl Into<String>, reason: impl ToString) -> Self {
        SessionError::LoadFailure {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}
