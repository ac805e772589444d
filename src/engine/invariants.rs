//! Transition invariants checked after every controller mutation.
//!
//! Each invariant relates the state before a transition to the state after
//! it. The controller checks the composed set in debug builds.

use crate::engine::{Phase, SessionState};

/// A property that must hold across a single state transition.
pub trait Invariant<S> {
    /// Checks the property for `before -> after`.
    fn holds(before: &S, after: &S) -> bool;

    /// Human-readable description of the invariant.
    fn description() -> &'static str;
}

/// Violation of an invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub description: String,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// A set of invariants checked together.
pub trait InvariantSet<S> {
    /// Checks every invariant in the set, collecting all violations.
    fn check_all(before: &S, after: &S) -> Result<(), Vec<InvariantViolation>>;
}

impl<S, I1, I2, I3, I4, I5> InvariantSet<S> for (I1, I2, I3, I4, I5)
where
    I1: Invariant<S>,
    I2: Invariant<S>,
    I3: Invariant<S>,
    I4: Invariant<S>,
    I5: Invariant<S>,
{
    fn check_all(before: &S, after: &S) -> Result<(), Vec<InvariantViolation>> {
        let checks = [
            (I1::holds(before, after), I1::description()),
            (I2::holds(before, after), I2::description()),
            (I3::holds(before, after), I3::description()),
            (I4::holds(before, after), I4::description()),
            (I5::holds(before, after), I5::description()),
        ];
        let violations: Vec<_> = checks
            .into_iter()
            .filter(|(held, _)| !held)
            .map(|(_, description)| InvariantViolation::new(description))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Score never goes down.
pub struct ScoreNeverDecreases;

impl Invariant<SessionState> for ScoreNeverDecreases {
    fn holds(before: &SessionState, after: &SessionState) -> bool {
        after.score >= before.score
    }

    fn description() -> &'static str {
        "score must be non-decreasing"
    }
}

/// Tries never go up.
pub struct TriesNeverIncrease;

impl Invariant<SessionState> for TriesNeverIncrease {
    fn holds(before: &SessionState, after: &SessionState) -> bool {
        after.tries_remaining <= before.tries_remaining
    }

    fn description() -> &'static str {
        "tries must be non-increasing"
    }
}

/// An item is on screen for the whole session between intro and game over.
pub struct ItemMatchesPhase;

impl Invariant<SessionState> for ItemMatchesPhase {
    fn holds(_before: &SessionState, after: &SessionState) -> bool {
        let expects_item = !matches!(after.phase, Phase::Intro | Phase::GameOver);
        expects_item == after.current_item.is_some()
    }

    fn description() -> &'static str {
        "current item must be present unless the phase is Intro or GameOver"
    }
}

/// The streak never exceeds the best streak.
pub struct StreakBounded;

impl Invariant<SessionState> for StreakBounded {
    fn holds(_before: &SessionState, after: &SessionState) -> bool {
        after.streak <= after.max_streak && after.max_streak <= after.score
    }

    fn description() -> &'static str {
        "streak must not exceed max streak, nor max streak the score"
    }
}

/// Nothing changes once the session is over.
pub struct GameOverIsTerminal;

impl Invariant<SessionState> for GameOverIsTerminal {
    fn holds(before: &SessionState, after: &SessionState) -> bool {
        before.phase != Phase::GameOver || before == after
    }

    fn description() -> &'static str {
        "GameOver must be terminal"
    }
}

/// Every invariant a session transition must satisfy.
pub type SessionInvariants = (
    ScoreNeverDecreases,
    TriesNeverIncrease,
    ItemMatchesPhase,
    StreakBounded,
    GameOverIsTerminal,
);
