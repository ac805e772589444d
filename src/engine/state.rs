//! The session aggregate observed by the presentation layer.

use derive_getters::Getters;
use serde::Serialize;

use crate::backend::{PlayerIdentity, SessionId};
use crate::content::Item;

/// Top-level session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum Phase {
    /// Waiting for the player to start.
    Intro,
    /// A round is being played.
    Active,
    /// The engine is switching stage content.
    RoundTransition,
    /// Terminal.
    GameOver,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum EndReason {
    /// No tries left.
    TriesExhausted,
    /// No content left to present.
    PoolExhausted,
    /// The final stage was cleared under the `end` policy.
    FinalStageCleared,
    /// The player quit.
    Quit,
}

/// Transient feedback about the last guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Feedback {
    /// The last guess was wrong.
    Incorrect,
}

/// Snapshot of everything a session tracks.
///
/// Owned and mutated only by the session controller; everyone else sees clones.
#[derive(Debug, Clone, PartialEq, Serialize, Getters)]
pub struct SessionState {
    pub(crate) session_id: SessionId,
    pub(crate) player: Option<PlayerIdentity>,
    pub(crate) phase: Phase,
    pub(crate) current_item: Option<Item>,
    pub(crate) score: u32,
    pub(crate) tries_remaining: u32,
    pub(crate) streak: u32,
    pub(crate) max_streak: u32,
    pub(crate) hint_budget: u32,
    pub(crate) stage: u32,
    pub(crate) lap: u32,
    pub(crate) seconds_remaining: u32,
    pub(crate) paused: bool,
    pub(crate) feedback: Option<Feedback>,
    pub(crate) active_hint: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) end_reason: Option<EndReason>,
}

impl SessionState {
    /// Fresh intro state for a new session id.
    pub(crate) fn intro(session_id: SessionId, tries: u32, hint_budget: u32) -> Self {
        Self {
            session_id,
            player: None,
            phase: Phase::Intro,
            current_item: None,
            score: 0,
            tries_remaining: tries,
            streak: 0,
            max_streak: 0,
            hint_budget,
            stage: 1,
            lap: 0,
            seconds_remaining: 0,
            paused: false,
            feedback: None,
            active_hint: None,
            message: None,
            end_reason: None,
        }
    }

    /// Returns `true` once the session has ended.
    pub fn is_over(&self) -> bool {
        self.phase == Phase::GameOver
    }
}
