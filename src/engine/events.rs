//! Events broadcast to presentation-layer subscribers.

use serde::Serialize;

use crate::config::RewardKind;
use crate::engine::EndReason;

/// Something a subscriber may want to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EngineEvent {
    /// A stage threshold was reached and its reward issued.
    StageCompleted {
        /// Reward granted.
        reward: RewardKind,
        /// Stage that was completed.
        stage: u32,
    },
    /// The session reached `GameOver`. Fires exactly once per session.
    SessionEnded {
        /// Score at the end of the session.
        final_score: u32,
        /// Why it ended.
        reason: EndReason,
    },
    /// The player sits in the leaderboard's top tier.
    RankChanged {
        /// 1-based rank.
        rank: usize,
        /// Leaderboard total score.
        score: u32,
    },
    /// The player's rank strictly improved since the previous poll.
    RankUp {
        /// Rank at the previous poll.
        previous: usize,
        /// Rank now.
        current: usize,
        /// Places gained.
        delta: usize,
    },
}
