//! Append-only facts handed to the persistence backend.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::config::RewardKind;

/// Opaque identifier correlating every record of one session.
pub type SessionId = String;

/// Unique identifier for a player.
pub type PlayerId = String;

/// A resolved player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Getters, new)]
pub struct PlayerIdentity {
    player_id: PlayerId,
    player_name: String,
}

/// Score snapshot for a session, taken at stage completion and at session end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
pub struct ScoreRecord {
    session_id: SessionId,
    player_id: PlayerId,
    player_name: String,
    score: u32,
    stage: u32,
    streak: u32,
    recorded_at: DateTime<Utc>,
}

/// Reward issued for completing a stage. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
pub struct RewardGrant {
    session_id: SessionId,
    player_id: PlayerId,
    stage: u32,
    reward_kind: RewardKind,
    score: u32,
    timestamp: DateTime<Utc>,
}
