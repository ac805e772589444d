//! Engine configuration loaded from TOML.

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Highest difficulty level an item can carry, and therefore the highest stage.
pub const MAX_DIFFICULTY: u8 = 5;

/// Reward issued when a stage's score threshold is reached.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RewardKind {
    /// First-tier reward.
    Sticker,
    /// Second-tier reward.
    Badge,
    /// Third-tier reward.
    Medal,
    /// Fourth-tier reward.
    Trophy,
    /// Top reward.
    Crown,
}

/// Score threshold and reward for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Getters, derive_new::new)]
pub struct StageRequirement {
    /// Stage this requirement applies to (1-based).
    stage: u32,
    /// Cumulative score needed to complete the stage.
    score_threshold: u32,
    /// Reward granted on completion.
    reward: RewardKind,
}

/// What happens after the highest stage is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FinalStagePolicy {
    /// Keep playing the final stage's remaining pool.
    #[default]
    Stay,
    /// End the session.
    End,
    /// Wrap to stage 1 and start a new lap.
    Loop,
}

/// Tunables for a game session.
#[derive(Debug, Clone, PartialEq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct EngineConfig {
    /// Countdown for a fresh round, in seconds.
    #[serde(default = "default_round_seconds")]
    round_seconds: u32,

    /// Countdown after a round expired, in seconds.
    ///
    /// Deliberately separate from `round_seconds`.
    #[serde(default = "default_timeout_reset_seconds")]
    timeout_reset_seconds: u32,

    /// Attempts a player starts with.
    #[serde(default = "default_max_tries")]
    max_tries: u32,

    /// Hints available per item.
    #[serde(default = "default_hint_budget")]
    hint_budget: u32,

    /// Items fetched per stage pool.
    #[serde(default = "default_batch_size")]
    batch_size: usize,

    /// Stage thresholds and rewards, ordered by stage.
    #[serde(default = "default_stages")]
    stages: Vec<StageRequirement>,

    /// Behavior once the last stage is completed.
    #[serde(default)]
    final_stage_policy: FinalStagePolicy,

    /// Seconds between leaderboard polls.
    #[serde(default = "default_leaderboard_poll_seconds")]
    leaderboard_poll_seconds: u64,

    /// Entries requested per leaderboard poll.
    #[serde(default = "default_leaderboard_size")]
    leaderboard_size: usize,

    /// Ranks at or above this are reported as top tier.
    #[serde(default = "default_top_tier")]
    top_tier: usize,

    /// Seconds between retries of failed persistence writes.
    #[serde(default = "default_persistence_retry_seconds")]
    persistence_retry_seconds: u64,

    /// Attempts before a persistence write is dropped.
    #[serde(default = "default_persistence_max_attempts")]
    persistence_max_attempts: u32,

    /// Seed for item selection; entropy when absent.
    #[serde(default)]
    #[setters(strip_option)]
    rng_seed: Option<u64>,
}

fn default_round_seconds() -> u32 {
    30
}

fn default_timeout_reset_seconds() -> u32 {
    20
}

fn default_max_tries() -> u32 {
    3
}

fn default_hint_budget() -> u32 {
    3
}

fn default_batch_size() -> usize {
    20
}

fn default_stages() -> Vec<StageRequirement> {
    vec![
        StageRequirement::new(1, 5, RewardKind::Sticker),
        StageRequirement::new(2, 12, RewardKind::Badge),
        StageRequirement::new(3, 20, RewardKind::Medal),
        StageRequirement::new(4, 30, RewardKind::Trophy),
        StageRequirement::new(5, 45, RewardKind::Crown),
    ]
}

fn default_leaderboard_poll_seconds() -> u64 {
    15
}

fn default_leaderboard_size() -> usize {
    10
}

fn default_top_tier() -> usize {
    3
}

fn default_persistence_retry_seconds() -> u64 {
    5
}

fn default_persistence_max_attempts() -> u32 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            round_seconds: default_round_seconds(),
            timeout_reset_seconds: default_timeout_reset_seconds(),
            max_tries: default_max_tries(),
            hint_budget: default_hint_budget(),
            batch_size: default_batch_size(),
            stages: default_stages(),
            final_stage_policy: FinalStagePolicy::default(),
            leaderboard_poll_seconds: default_leaderboard_poll_seconds(),
            leaderboard_size: default_leaderboard_size(),
            top_tier: default_top_tier(),
            persistence_retry_seconds: default_persistence_retry_seconds(),
            persistence_max_attempts: default_persistence_max_attempts(),
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or fails validation.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading engine config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on parse or validation failure.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        info!(
            stages = config.stages.len(),
            policy = %config.final_stage_policy,
            "Engine config loaded"
        );
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first violated constraint.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::new("At least one stage is required".to_string()));
        }
        if self.stages.len() > MAX_DIFFICULTY as usize {
            return Err(ConfigError::new(format!(
                "At most {} stages are supported, got {}",
                MAX_DIFFICULTY,
                self.stages.len()
            )));
        }
        for (index, requirement) in self.stages.iter().enumerate() {
            let expected = index as u32 + 1;
            if requirement.stage != expected {
                return Err(ConfigError::new(format!(
                    "Stages must be numbered 1..=N in order; expected {}, found {}",
                    expected, requirement.stage
                )));
            }
        }
        if self
            .stages
            .windows(2)
            .any(|pair| pair[1].score_threshold < pair[0].score_threshold)
        {
            return Err(ConfigError::new(
                "Stage thresholds must be non-decreasing".to_string(),
            ));
        }
        if self.round_seconds == 0 || self.timeout_reset_seconds == 0 {
            return Err(ConfigError::new("Round durations must be positive".to_string()));
        }
        if self.max_tries == 0 {
            return Err(ConfigError::new("max_tries must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::new("batch_size must be positive".to_string()));
        }
        if self.leaderboard_poll_seconds == 0 || self.persistence_retry_seconds == 0 {
            return Err(ConfigError::new("Intervals must be positive".to_string()));
        }
        Ok(())
    }

    /// Highest configured stage.
    pub fn max_stage(&self) -> u32 {
        self.stages.len() as u32
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
