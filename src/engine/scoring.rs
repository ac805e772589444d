//! Guess evaluation, score and streak bookkeeping.

use tracing::{debug, instrument};

use crate::config::{RewardKind, StageRequirement};
use crate::content::Item;
use crate::engine::Guess;

/// Result of comparing a guess to an item's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Verdict {
    /// Exact match after trimming and case folding.
    Correct,
    /// Anything else.
    Incorrect,
}

/// Compares a guess against `item`'s answer.
///
/// Case-insensitive and whitespace-trimmed exact match; no partial credit.
#[instrument(skip(item, guess), fields(item_id = %item.id()))]
pub fn evaluate_guess(item: &Item, guess: &Guess) -> Verdict {
    let verdict = if normalize(guess.as_str()) == normalize(item.answer_text()) {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    };
    debug!(%verdict, "Guess evaluated");
    verdict
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Score and streak counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    /// Correct guesses this session.
    pub score: u32,
    /// Consecutive correct guesses.
    pub streak: u32,
    /// Longest streak this session.
    pub max_streak: u32,
}

impl Tally {
    /// Tally after a correct guess.
    pub fn record_correct(self) -> Self {
        let streak = self.streak + 1;
        Self {
            score: self.score + 1,
            streak,
            max_streak: self.max_streak.max(streak),
        }
    }

    /// Tally after a miss; only the streak changes.
    pub fn record_miss(self) -> Self {
        Self { streak: 0, ..self }
    }
}

/// Returns the stage's reward if `score` meets its threshold.
///
/// Callers guard against granting the same crossing twice.
#[instrument(skip(requirements))]
pub fn check_stage_completion(
    score: u32,
    stage: u32,
    requirements: &[StageRequirement],
) -> Option<RewardKind> {
    requirements
        .iter()
        .find(|r| *r.stage() == stage)
        .filter(|r| score >= *r.score_threshold())
        .map(|r| *r.reward())
}
