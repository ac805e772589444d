//! Persistence and identity collaborator seams.
//!
//! The engine never owns a storage schema; it hands [`ScoreRecord`]s and
//! [`RewardGrant`]s to a [`ScoreBackend`] through the [`PersistenceOutbox`] so
//! that slow or failing writes never block a guess.

mod outbox;
mod records;

pub use outbox::{OutboxReport, PersistRecord, PersistenceOutbox};
pub use records::{PlayerId, PlayerIdentity, RewardGrant, ScoreRecord, SessionId};

use async_trait::async_trait;

use crate::error::BackendError;

/// Durable sink for completed-session scores and reward grants.
#[async_trait]
pub trait ScoreBackend: Send + Sync + std::fmt::Debug {
    /// Records a score snapshot.
    async fn submit_score(&self, record: &ScoreRecord) -> Result<(), BackendError>;

    /// Records a reward grant.
    async fn submit_reward(&self, grant: &RewardGrant) -> Result<(), BackendError>;
}

/// Resolves a player name into a stable identity before a session starts.
#[async_trait]
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// Returns the identity for `player_name`, creating one if needed.
    async fn resolve_identity(&self, player_name: &str) -> Result<PlayerIdentity, BackendError>;
}
