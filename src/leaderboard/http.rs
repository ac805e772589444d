//! Leaderboard service reached over HTTP.

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::BackendError;
use crate::leaderboard::{LeaderboardEntry, LeaderboardService};

/// Fetches `GET {base_url}/leaderboard?top=N`, expecting a JSON array of
/// [`LeaderboardEntry`] ordered by rank.
#[derive(Debug, Clone)]
pub struct HttpLeaderboardClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpLeaderboardClient {
    /// Creates a client for the service rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Service root.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LeaderboardService for HttpLeaderboardClient {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn fetch_top(&self, n: usize) -> Result<Vec<LeaderboardEntry>, BackendError> {
        let url = format!("{}/leaderboard?top={}", self.base_url, n);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::leaderboard(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::leaderboard(format!(
                "Leaderboard returned {}",
                status
            )));
        }

        let mut entries: Vec<LeaderboardEntry> = response
            .json()
            .await
            .map_err(|e| BackendError::leaderboard(format!("Malformed leaderboard body: {}", e)))?;
        entries.truncate(n);
        debug!(count = entries.len(), "Fetched leaderboard");
        Ok(entries)
    }
}
