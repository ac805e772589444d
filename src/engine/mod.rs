//! Game progression engine: scoring, countdown, stages, and the session
//! state machine.

mod controller;
mod events;
mod guess;
mod invariants;
mod progression;
mod runner;
mod scoring;
mod state;
mod timer;

pub use controller::{Collaborators, GuessResult, SessionController, SkipOutcome, StageCompletion};
pub use events::EngineEvent;
pub use guess::{Guess, GuessError, MAX_GUESS_CHARS};
pub use invariants::{Invariant, InvariantSet, InvariantViolation, SessionInvariants};
pub use progression::{NextStage, StageAdvance, StageProgression};
pub use runner::{SessionHandle, SessionRunner};
pub use scoring::{Tally, Verdict, check_stage_completion, evaluate_guess};
pub use state::{EndReason, Feedback, Phase, SessionState};
pub use timer::{Countdown, RoundTimer, RoundToken, TICK, TickOutcome, Tries, TriesOutcome};
