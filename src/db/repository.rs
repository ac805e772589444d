//! Database repository for players, score snapshots, and reward grants.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument};

use crate::backend::{RewardGrant, ScoreRecord};
use crate::db::{DbError, NewPlayer, NewRewardRow, NewScoreRow, Player, RewardRow, ScoreRow, schema};
use crate::leaderboard::LeaderboardEntry;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// SQLite repository. Opens a fresh connection per call.
#[derive(Debug, Clone)]
pub struct GameRepository {
    db_path: String,
}

impl GameRepository {
    /// Creates a repository for the database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is empty.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, DbError> {
        if db_path.trim().is_empty() {
            return Err(DbError::new("Database path is empty"));
        }
        info!(path = %db_path, "Creating GameRepository");
        Ok(Self { db_path })
    }

    /// Path this repository connects to.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))
    }

    /// Applies any pending schema migrations. Returns how many ran.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<usize, DbError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(format!("Migration failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(applied.len())
    }

    /// Returns the player named `display_name`, creating one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_or_create_player(&self, display_name: &str) -> Result<Player, DbError> {
        let mut conn = self.connection()?;

        let existing = schema::players::table
            .filter(schema::players::display_name.eq(display_name))
            .select(Player::as_select())
            .first(&mut conn)
            .optional()?;
        if let Some(player) = existing {
            debug!(player_id = %player.id(), "Existing player found");
            return Ok(player);
        }

        let new_player = NewPlayer::new(uuid::Uuid::new_v4().to_string(), display_name.to_string());
        let inserted = diesel::insert_into(schema::players::table)
            .values(&new_player)
            .returning(Player::as_returning())
            .get_result(&mut conn)
            .map_err(DbError::from);
        let player = match inserted {
            Ok(player) => player,
            // Another session registered the same name between lookup and insert.
            Err(e) if e.conflict => {
                debug!("Player created concurrently; reloading");
                return Ok(schema::players::table
                    .filter(schema::players::display_name.eq(display_name))
                    .select(Player::as_select())
                    .first(&mut conn)?);
            }
            Err(e) => return Err(e),
        };

        info!(player_id = %player.id(), display_name = %player.display_name(), "Player created");
        Ok(player)
    }

    /// Looks up a player by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_player(&self, player_id: &str) -> Result<Option<Player>, DbError> {
        let mut conn = self.connection()?;
        let player = schema::players::table
            .find(player_id)
            .select(Player::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(player)
    }

    /// Appends a score snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the record does not fit the schema or the insert fails.
    #[instrument(skip(self, record), fields(session_id = %record.session_id(), score = record.score()))]
    pub fn record_score(&self, record: &ScoreRecord) -> Result<ScoreRow, DbError> {
        let row = NewScoreRow::try_from(record)?;
        let mut conn = self.connection()?;

        let stored = diesel::insert_into(schema::score_records::table)
            .values(&row)
            .returning(ScoreRow::as_returning())
            .get_result(&mut conn)?;

        info!(row_id = stored.id(), "Score recorded");
        Ok(stored)
    }

    /// Appends a reward grant.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the grant does not fit the schema or the insert fails.
    #[instrument(skip(self, grant), fields(session_id = %grant.session_id(), stage = grant.stage()))]
    pub fn record_reward(&self, grant: &RewardGrant) -> Result<RewardRow, DbError> {
        let row = NewRewardRow::try_from(grant)?;
        let mut conn = self.connection()?;

        let stored = diesel::insert_into(schema::reward_grants::table)
            .values(&row)
            .returning(RewardRow::as_returning())
            .get_result(&mut conn)?;

        info!(row_id = stored.id(), reward = %stored.reward_kind(), "Reward recorded");
        Ok(stored)
    }

    /// Rewards granted to a player, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn rewards_for(&self, player_id: &str) -> Result<Vec<RewardRow>, DbError> {
        let mut conn = self.connection()?;
        let rows = schema::reward_grants::table
            .filter(schema::reward_grants::player_id.eq(player_id))
            .order(schema::reward_grants::id.asc())
            .select(RewardRow::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    /// Score snapshots for one session, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn scores_for_session(&self, session_id: &str) -> Result<Vec<ScoreRow>, DbError> {
        let mut conn = self.connection()?;
        let rows = schema::score_records::table
            .filter(schema::score_records::session_id.eq(session_id))
            .order(schema::score_records::id.asc())
            .select(ScoreRow::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    /// Top `n` players by total score.
    ///
    /// A player's total is the sum, over their sessions, of the best score
    /// recorded in each session. Ties break on display name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn leaderboard(&self, n: usize) -> Result<Vec<LeaderboardEntry>, DbError> {
        let mut conn = self.connection()?;

        let rows = schema::score_records::table
            .inner_join(schema::players::table)
            .select((
                schema::players::id,
                schema::players::display_name,
                schema::score_records::session_id,
                schema::score_records::score,
            ))
            .load::<(String, String, String, i32)>(&mut conn)?;

        let mut best_per_session: HashMap<(String, String), (String, u32)> = HashMap::new();
        for (player_id, name, session_id, score) in rows {
            let score = u32::try_from(score).unwrap_or(0);
            let best = best_per_session
                .entry((player_id, session_id))
                .or_insert((name, 0));
            best.1 = best.1.max(score);
        }

        let mut totals: HashMap<String, (String, u32)> = HashMap::new();
        for ((player_id, _), (name, best)) in best_per_session {
            let total = totals.entry(player_id).or_insert((name, 0));
            total.1 = total.1.saturating_add(best);
        }

        let mut entries: Vec<LeaderboardEntry> = totals
            .into_iter()
            .map(|(player_id, (name, total))| LeaderboardEntry::new(player_id, name, total))
            .collect();
        entries.sort_by(|a, b| {
            b.total_score()
                .cmp(a.total_score())
                .then_with(|| a.player_name().cmp(b.player_name()))
        });
        entries.truncate(n);

        info!(count = entries.len(), "Leaderboard computed");
        Ok(entries)
    }
}
