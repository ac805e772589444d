//! Strictly Guess - a staged guessing game engine
//!
//! Players identify one item at a time under a countdown. Correct answers
//! build score and streak, stage thresholds grant rewards and raise the
//! difficulty band, and a background poller reports leaderboard rank changes.
//!
//! # Architecture
//!
//! - **Engine**: session state machine, scoring, countdown, stage progression
//! - **Content**: item catalog, difficulty bands, pool loading with prefetch
//! - **Backend**: score/reward persistence through a retrying outbox
//! - **Leaderboard**: periodic polling and rank-change detection
//! - **Db**: SQLite implementation of every collaborator
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strictly_guess::{
//!     CatalogContentStore, Collaborators, EngineConfig, GameRepository, Guess,
//!     SessionRunner, SqliteBackend,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let repository = GameRepository::new("strictly_guess.db".to_string())?;
//! repository.run_migrations()?;
//! let backend = Arc::new(SqliteBackend::new(repository));
//! let content = Arc::new(CatalogContentStore::from_file("data/catalog.toml")?);
//!
//! let collaborators = Collaborators {
//!     content,
//!     backend: backend.clone(),
//!     identity: backend.clone(),
//! };
//! let (handle, _task) = SessionRunner::spawn(EngineConfig::default(), collaborators, Some(backend))?;
//! handle.start_session("Alice").await?;
//! handle.submit_guess(Guess::parse("cat")?).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod backend;
mod config;
mod content;
mod db;
mod engine;
mod error;
mod leaderboard;

// Crate-level exports - Configuration
pub use config::{ConfigError, EngineConfig, FinalStagePolicy, MAX_DIFFICULTY, RewardKind, StageRequirement};

// Crate-level exports - Errors
pub use error::{BackendError, BackendErrorKind, EngineError};

// Crate-level exports - Content
pub use content::{
    CatalogContentStore, ContentPool, ContentStore, Difficulty, DifficultyBand, Item, ItemId,
    PoolExhausted, PoolSource,
};

// Crate-level exports - Persistence seams
pub use backend::{
    IdentityProvider, OutboxReport, PersistRecord, PersistenceOutbox, PlayerId, PlayerIdentity,
    RewardGrant, ScoreBackend, ScoreRecord, SessionId,
};

// Crate-level exports - Engine
pub use engine::{
    Collaborators, Countdown, EndReason, EngineEvent, Feedback, Guess, GuessError, GuessResult,
    Invariant, InvariantSet, InvariantViolation, MAX_GUESS_CHARS, NextStage, Phase, RoundTimer,
    RoundToken, SessionController, SessionHandle, SessionInvariants, SessionRunner, SessionState,
    SkipOutcome, StageAdvance, StageCompletion, StageProgression, TICK, Tally, TickOutcome, Tries,
    TriesOutcome, Verdict, check_stage_completion, evaluate_guess,
};

// Crate-level exports - Leaderboard
pub use leaderboard::{
    HttpLeaderboardClient, LeaderboardEntry, LeaderboardMonitor, LeaderboardService,
    LeaderboardSnapshot, MonitorSettings, RankObservation, RankTracker, RankUp,
};

// Crate-level exports - Database
pub use db::{
    DbError, GameRepository, NewPlayer, NewRewardRow, NewScoreRow, Player, RewardRow, ScoreRow,
    SqliteBackend,
};
