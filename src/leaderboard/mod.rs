//! Leaderboard polling and rank-change detection.

mod http;
mod monitor;
mod snapshot;

pub use http::HttpLeaderboardClient;
pub use monitor::{LeaderboardMonitor, MonitorSettings, RankObservation, RankTracker, RankUp};
pub use snapshot::{LeaderboardEntry, LeaderboardSnapshot};

use async_trait::async_trait;

use crate::error::BackendError;

/// Source of the global leaderboard.
#[async_trait]
pub trait LeaderboardService: Send + Sync + std::fmt::Debug {
    /// Top `n` entries, best first.
    async fn fetch_top(&self, n: usize) -> Result<Vec<LeaderboardEntry>, BackendError>;
}
