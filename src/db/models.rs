//! Database models and conversions from engine records.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use tracing::instrument;

use crate::backend::{PlayerIdentity, RewardGrant, ScoreRecord};
use crate::config::RewardKind;
use crate::db::{DbError, schema};

/// Player profile row.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::players)]
pub struct Player {
    id: String,
    display_name: String,
    created_at: NaiveDateTime,
}

impl Player {
    /// Engine-facing identity for this player.
    pub fn identity(&self) -> PlayerIdentity {
        PlayerIdentity::new(self.id.clone(), self.display_name.clone())
    }
}

/// Insertable player row.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::players)]
pub struct NewPlayer {
    id: String,
    display_name: String,
}

/// Stored score snapshot.
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Getters)]
#[diesel(table_name = schema::score_records)]
#[diesel(belongs_to(Player))]
pub struct ScoreRow {
    id: i32,
    session_id: String,
    player_id: String,
    score: i32,
    stage: i32,
    streak: i32,
    recorded_at: NaiveDateTime,
}

/// Insertable score snapshot.
#[derive(Debug, Clone, Insertable, Getters)]
#[diesel(table_name = schema::score_records)]
pub struct NewScoreRow {
    session_id: String,
    player_id: String,
    score: i32,
    stage: i32,
    streak: i32,
    recorded_at: NaiveDateTime,
}

impl TryFrom<&ScoreRecord> for NewScoreRow {
    type Error = DbError;

    #[instrument(skip(record), fields(session_id = %record.session_id()))]
    fn try_from(record: &ScoreRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            session_id: record.session_id().clone(),
            player_id: record.player_id().clone(),
            score: column_int(*record.score(), "score")?,
            stage: column_int(*record.stage(), "stage")?,
            streak: column_int(*record.streak(), "streak")?,
            recorded_at: record.recorded_at().naive_utc(),
        })
    }
}

/// Stored reward grant.
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Getters)]
#[diesel(table_name = schema::reward_grants)]
#[diesel(belongs_to(Player))]
pub struct RewardRow {
    id: i32,
    session_id: String,
    player_id: String,
    stage: i32,
    reward_kind: String,
    score: i32,
    granted_at: NaiveDateTime,
}

impl RewardRow {
    /// Parses the stored reward kind.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the column holds an unknown reward.
    #[instrument(skip(self), fields(reward_kind = %self.reward_kind))]
    pub fn parse_reward(&self) -> Result<RewardKind, DbError> {
        self.reward_kind
            .parse()
            .map_err(|_| DbError::new(format!("Invalid reward kind: '{}'", self.reward_kind)))
    }
}

/// Insertable reward grant.
#[derive(Debug, Clone, Insertable, Getters)]
#[diesel(table_name = schema::reward_grants)]
pub struct NewRewardRow {
    session_id: String,
    player_id: String,
    stage: i32,
    reward_kind: String,
    score: i32,
    granted_at: NaiveDateTime,
}

impl TryFrom<&RewardGrant> for NewRewardRow {
    type Error = DbError;

    #[instrument(skip(grant), fields(session_id = %grant.session_id()))]
    fn try_from(grant: &RewardGrant) -> Result<Self, Self::Error> {
        Ok(Self {
            session_id: grant.session_id().clone(),
            player_id: grant.player_id().clone(),
            stage: column_int(*grant.stage(), "stage")?,
            reward_kind: grant.reward_kind().to_string(),
            score: column_int(*grant.score(), "score")?,
            granted_at: grant.timestamp().naive_utc(),
        })
    }
}

#[track_caller]
fn column_int(value: u32, column: &str) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|_| DbError::column_range(column, value))
}
