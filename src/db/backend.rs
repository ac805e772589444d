//! Async collaborator adapter over [`GameRepository`].

use async_trait::async_trait;
use tracing::instrument;

use crate::backend::{IdentityProvider, PlayerIdentity, RewardGrant, ScoreBackend, ScoreRecord};
use crate::db::{DbError, GameRepository};
use crate::error::{BackendError, BackendErrorKind};
use crate::leaderboard::{LeaderboardEntry, LeaderboardService};

/// Serves scores, identities, and the leaderboard from one SQLite file.
///
/// Diesel calls block, so each operation runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    repository: GameRepository,
}

impl SqliteBackend {
    /// Wraps a repository.
    pub fn new(repository: GameRepository) -> Self {
        Self { repository }
    }

    /// Underlying repository.
    pub fn repository(&self) -> &GameRepository {
        &self.repository
    }

    async fn blocking<T, F>(&self, kind: BackendErrorKind, op: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(GameRepository) -> Result<T, DbError> + Send + 'static,
    {
        let repository = self.repository.clone();
        tokio::task::spawn_blocking(move || op(repository))
            .await
            .map_err(|e| BackendError::new(kind, format!("Database task failed: {}", e)))?
            .map_err(|e| e.into_backend(kind))
    }
}

#[async_trait]
impl ScoreBackend for SqliteBackend {
    #[instrument(skip(self, record), fields(session_id = %record.session_id()))]
    async fn submit_score(&self, record: &ScoreRecord) -> Result<(), BackendError> {
        let record = record.clone();
        self.blocking(BackendErrorKind::Persistence, move |repo| {
            repo.record_score(&record).map(|_| ())
        })
        .await
    }

    #[instrument(skip(self, grant), fields(session_id = %grant.session_id()))]
    async fn submit_reward(&self, grant: &RewardGrant) -> Result<(), BackendError> {
        let grant = grant.clone();
        self.blocking(BackendErrorKind::Persistence, move |repo| {
            repo.record_reward(&grant).map(|_| ())
        })
        .await
    }
}

#[async_trait]
impl IdentityProvider for SqliteBackend {
    #[instrument(skip(self))]
    async fn resolve_identity(&self, player_name: &str) -> Result<PlayerIdentity, BackendError> {
        let name = player_name.to_string();
        self.blocking(BackendErrorKind::Identity, move |repo| {
            repo.get_or_create_player(&name).map(|player| player.identity())
        })
        .await
    }
}

#[async_trait]
impl LeaderboardService for SqliteBackend {
    #[instrument(skip(self))]
    async fn fetch_top(&self, n: usize) -> Result<Vec<LeaderboardEntry>, BackendError> {
        self.blocking(BackendErrorKind::LeaderboardFetch, move |repo| repo.leaderboard(n))
            .await
    }
}
