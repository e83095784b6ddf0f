//! Error types shared by the playback core.
//!
//! State-consistency errors are reported synchronously to whoever issued the
//! command. [`PlaybackError::StaleSession`] is the exception: it is produced
//! by completions and deferred merges that lost a race with `stop`, and is
//! only ever logged.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the scheduler and its state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// Skip/pause/now-playing issued while the guild is idle.
    #[error("nothing is playing")]
    NothingPlaying,

    /// Pause while paused, resume while playing or idle.
    #[error("invalid playback state: {0}")]
    InvalidState(&'static str),

    /// Queue position outside `1..=size`.
    #[error("position {position} is out of range (queue has {size} tracks)")]
    OutOfRange { position: i64, size: usize },

    /// Extraction produced no playable track.
    #[error("no playable tracks found")]
    EmptyResult,

    /// The voice transport reported a failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The guild session this request belonged to no longer exists.
    #[error("guild session is stale")]
    StaleSession,

    /// The queue is at its configured capacity.
    #[error("queue is full ({capacity} tracks)")]
    QueueFull { capacity: usize },
}

impl PlaybackError {
    /// Whether the error should ever be shown to a user.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, PlaybackError::StaleSession)
    }

    /// Text shown to the user for this condition.
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::NothingPlaying => "❌ Nothing is playing right now!".to_string(),
            PlaybackError::InvalidState(reason) => format!("❌ {}", reason),
            PlaybackError::OutOfRange { size, .. } => format!(
                "❌ Invalid track number. Must be between 1 and {}.",
                size
            ),
            PlaybackError::EmptyResult => "❌ No playable tracks found!".to_string(),
            PlaybackError::Transport(e) => format!("❌ Playback error: {}", e),
            PlaybackError::StaleSession => String::new(),
            PlaybackError::QueueFull { capacity } => {
                format!("❌ The queue is full (maximum {} tracks).", capacity)
            }
        }
    }
}

/// Failures of the voice transport itself.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("failed to join voice channel: {0}")]
    Join(String),

    #[error("track control failed: {0}")]
    Control(String),
}

/// Failures while resolving a query into tracks.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to run extractor: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("extractor exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_session_is_never_user_visible() {
        assert!(!PlaybackError::StaleSession.is_user_visible());
        assert!(PlaybackError::NothingPlaying.is_user_visible());
        assert!(PlaybackError::Transport("boom".into()).is_user_visible());
    }

    #[test]
    fn out_of_range_message_names_bounds() {
        let err = PlaybackError::OutOfRange { position: 7, size: 3 };
        assert_eq!(
            err.user_message(),
            "❌ Invalid track number. Must be between 1 and 3."
        );
    }
}
