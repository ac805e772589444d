//! SQLite persistence for players, scores, and rewards.

mod backend;
mod error;
mod models;
mod repository;
mod schema;

pub use backend::SqliteBackend;
pub use error::DbError;
pub use models::{NewPlayer, NewRewardRow, NewScoreRow, Player, RewardRow, ScoreRow};
pub use repository::GameRepository;
