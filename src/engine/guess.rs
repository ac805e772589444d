//! Validated guess input.

use derive_more::Display;
use tracing::instrument;

/// Longest accepted guess, in characters.
pub const MAX_GUESS_CHARS: usize = 128;

/// Reasons raw input is rejected before it reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum GuessError {
    /// Nothing but whitespace.
    #[display("Guess is empty")]
    Empty,
    /// Longer than [`MAX_GUESS_CHARS`].
    #[display("Guess is longer than {} characters", MAX_GUESS_CHARS)]
    TooLong,
    /// Contains control characters.
    #[display("Guess contains control characters")]
    ControlCharacters,
}

impl std::error::Error for GuessError {}

/// A player's guess, trimmed and checked at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{}", _0)]
pub struct Guess(String);

impl Guess {
    /// Parses raw input into a guess.
    ///
    /// # Errors
    ///
    /// Returns [`GuessError`] if the input is blank, too long, or contains
    /// control characters.
    #[instrument]
    pub fn parse(raw: &str) -> Result<Self, GuessError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GuessError::Empty);
        }
        if trimmed.chars().count() > MAX_GUESS_CHARS {
            return Err(GuessError::TooLong);
        }
        if trimmed.chars().any(char::is_control) {
            return Err(GuessError::ControlCharacters);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The trimmed text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Guess {
    type Error = GuessError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}
