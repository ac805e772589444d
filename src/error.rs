//! Engine and collaborator error types.

use derive_more::{Display, Error};
use tracing::instrument;

use crate::engine::Phase;

/// Error returned by session operations.
///
/// None of these end the session on their own; the controller decides
/// whether an error leaves the player in place or surfaces a retry prompt.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum EngineError {
    /// Content for a stage could not be loaded (fetch failed or came back empty).
    #[display("Content unavailable: {}", _0)]
    ContentUnavailable(String),

    /// The operation is not valid in the current phase.
    #[display("Operation requires phase {:?}, session is in {:?}", expected, actual)]
    WrongPhase {
        /// Phase the operation needs.
        expected: Phase,
        /// Phase the session is actually in.
        actual: Phase,
    },

    /// The session is over; no further mutations are accepted.
    #[display("Session is over")]
    SessionOver,

    /// The round countdown is paused.
    #[display("Session is paused")]
    Paused,

    /// The player identity could not be resolved.
    #[display("Invalid player identity: {}", _0)]
    InvalidIdentity(String),

    /// No hints left for the current item.
    #[display("No hints left for this item")]
    HintsExhausted,

    /// The guess targeted an item that is no longer current.
    #[display("Guess targeted a stale item")]
    StaleRound,

    /// The task driving the session has exited.
    #[display("Session runner has stopped")]
    RunnerStopped,
}

impl std::error::Error for EngineError {}

/// Which external collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum BackendErrorKind {
    /// Content Store fetch failed.
    #[display("content fetch")]
    ContentFetch,
    /// Score or reward write failed.
    #[display("persistence")]
    Persistence,
    /// Leaderboard poll failed.
    #[display("leaderboard fetch")]
    LeaderboardFetch,
    /// Identity bootstrap failed.
    #[display("identity")]
    Identity,
}

/// Failure reported by an external collaborator, with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Backend {} error: {} at {}:{}", kind, message, file, line)]
pub struct BackendError {
    /// Which collaborator failed.
    pub kind: BackendErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl BackendError {
    /// Creates a new backend error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Shorthand for a persistence failure.
    #[track_caller]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Persistence, message)
    }

    /// Shorthand for a content fetch failure.
    #[track_caller]
    pub fn content(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::ContentFetch, message)
    }

    /// Shorthand for a leaderboard fetch failure.
    #[track_caller]
    pub fn leaderboard(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::LeaderboardFetch, message)
    }

    /// Shorthand for an identity resolution failure.
    #[track_caller]
    pub fn identity(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Identity, message)
    }
}
