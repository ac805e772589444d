//! Playable items and difficulty bands.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::MAX_DIFFICULTY;

/// Unique identifier for an item.
pub type ItemId = String;

/// Item difficulty, always within `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Difficulty(u8);

impl Difficulty {
    /// Easiest difficulty.
    pub const MIN: Difficulty = Difficulty(1);
    /// Hardest difficulty.
    pub const MAX: Difficulty = Difficulty(MAX_DIFFICULTY);

    /// Returns the numeric level.
    pub fn level(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=MAX_DIFFICULTY).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!("difficulty {} outside 1..={}", value, MAX_DIFFICULTY))
        }
    }
}

impl From<Difficulty> for u8 {
    fn from(value: Difficulty) -> Self {
        value.0
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of difficulties served for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Getters)]
pub struct DifficultyBand {
    min: Difficulty,
    max: Difficulty,
}

impl DifficultyBand {
    /// Band for a stage: `[max(1, stage-1), min(5, stage+1)]`.
    #[instrument]
    pub fn for_stage(stage: u32) -> Self {
        let cap = u32::from(MAX_DIFFICULTY);
        let low = stage.saturating_sub(1).clamp(1, cap) as u8;
        let high = stage.saturating_add(1).clamp(1, cap) as u8;
        Self {
            min: Difficulty(low),
            max: Difficulty(high),
        }
    }

    /// Returns true if the difficulty falls inside the band.
    pub fn contains(&self, difficulty: Difficulty) -> bool {
        self.min <= difficulty && difficulty <= self.max
    }
}

/// A guessable piece of content. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Getters, derive_new::new)]
pub struct Item {
    /// Stable identity.
    id: ItemId,
    /// Prompt text shown to the player.
    prompt: String,
    /// Glyph rendered alongside the prompt.
    display_glyph: String,
    /// Expected answer.
    answer_text: String,
    /// Difficulty level.
    difficulty: Difficulty,
}
