//! Leaderboard entries and point-in-time snapshots.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::backend::PlayerId;

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
pub struct LeaderboardEntry {
    player_id: PlayerId,
    player_name: String,
    total_score: u32,
}

/// Ordered leaderboard as returned by one poll. Replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Getters, new)]
pub struct LeaderboardSnapshot {
    entries: Vec<LeaderboardEntry>,
    fetched_at: DateTime<Utc>,
}

impl LeaderboardSnapshot {
    /// 1-based rank and entry for `player_id`, if present.
    pub fn locate(&self, player_id: &str) -> Option<(usize, &LeaderboardEntry)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.player_id == player_id)
            .map(|(index, entry)| (index + 1, entry))
    }
}
