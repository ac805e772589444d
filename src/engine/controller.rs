//! Session lifecycle controller: the only owner and mutator of [`SessionState`].
//!
//! Intro -> Active -> (RoundTransition -> Active)* -> GameOver.
//!
//! Every public operation runs to completion on `&mut self`, so a guess and a
//! countdown expiry for the same round can never interleave. Ticks carry a
//! [`RoundToken`]; a tick for a superseded round is a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use derive_getters::Getters;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{
    IdentityProvider, OutboxReport, PersistRecord, PersistenceOutbox, RewardGrant, ScoreBackend,
    ScoreRecord, SessionId,
};
use crate::config::{ConfigError, EngineConfig, RewardKind};
use crate::content::{ContentPool, ContentStore, Item, ItemId, PoolExhausted};
use crate::engine::invariants::{InvariantSet, SessionInvariants};
use crate::engine::progression::{NextStage, StageAdvance, StageProgression};
use crate::engine::scoring::{Tally, Verdict, evaluate_guess};
use crate::engine::timer::{RoundTimer, RoundToken, TICK, TickOutcome, Tries, TriesOutcome};
use crate::engine::{EndReason, EngineEvent, Feedback, Guess, Phase, SessionState};
use crate::error::EngineError;

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 64;

/// External collaborators a session talks to.
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Source of items.
    pub content: Arc<dyn ContentStore>,
    /// Sink for scores and rewards.
    pub backend: Arc<dyn ScoreBackend>,
    /// Resolves player names to identities.
    pub identity: Arc<dyn IdentityProvider>,
}

/// A stage completion reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct StageCompletion {
    stage: u32,
    reward: RewardKind,
}

/// What a guess did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct GuessResult {
    verdict: Verdict,
    completed: Option<StageCompletion>,
    ended: Option<EndReason>,
}

/// What a skip did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    /// A new item is being presented.
    NextItem,
    /// The pool ran dry and the session ended.
    SessionEnded(EndReason),
}

/// Drives one session from intro to game over.
#[derive(Debug)]
pub struct SessionController {
    config: EngineConfig,
    state: SessionState,
    pool: ContentPool,
    timer: RoundTimer,
    tries: Tries,
    tally: Tally,
    progression: StageProgression,
    identity: Arc<dyn IdentityProvider>,
    outbox: PersistenceOutbox,
    events: broadcast::Sender<EngineEvent>,
    state_tx: watch::Sender<SessionState>,
    pending_stage: Option<u32>,
}

impl SessionController {
    /// Creates a controller in the `Intro` phase with a fresh session id.
    ///
    /// Countdown ticks are delivered on `ticks`; whoever owns the receiving end
    /// feeds them back through [`SessionController::on_tick`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails [`EngineConfig::validate`].
    #[instrument(skip(config, collaborators, ticks))]
    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        ticks: mpsc::UnboundedSender<RoundToken>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let session_id: SessionId = uuid::Uuid::new_v4().to_string();
        info!(session_id = %session_id, "Creating session controller");

        let state = SessionState::intro(session_id, *config.max_tries(), *config.hint_budget());
        let (state_tx, _) = watch::channel(state.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let outbox = PersistenceOutbox::spawn(
            collaborators.backend,
            Duration::from_secs(*config.persistence_retry_seconds()),
            *config.persistence_max_attempts(),
        );

        Ok(Self {
            pool: ContentPool::new(collaborators.content, *config.batch_size(), *config.rng_seed()),
            timer: RoundTimer::new(ticks, TICK),
            tries: Tries::new(*config.max_tries()),
            tally: Tally::default(),
            progression: StageProgression::new(&config),
            identity: collaborators.identity,
            outbox,
            events,
            state_tx,
            pending_stage: None,
            state,
            config,
        })
    }

    // ─────────────────────────────────────────────────────────────
    //  Observation
    // ─────────────────────────────────────────────────────────────

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Session identifier.
    pub fn session_id(&self) -> &SessionId {
        &self.state.session_id
    }

    /// Receiver that always holds the latest state snapshot.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Subscribes to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Sender for components that publish on the same event stream.
    pub fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events.clone()
    }

    /// Token of the countdown currently armed.
    pub fn round_token(&self) -> RoundToken {
        self.timer.token()
    }

    /// Items left in the active pool.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    // ─────────────────────────────────────────────────────────────
    //  Intro -> Active
    // ─────────────────────────────────────────────────────────────

    /// Resolves the player and loads the stage 1 pool.
    ///
    /// On failure the session stays in `Intro` with a message explaining why,
    /// and the call may be retried.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WrongPhase`] outside `Intro`,
    /// [`EngineError::InvalidIdentity`] for a blank or unresolvable name, and
    /// [`EngineError::ContentUnavailable`] if stage 1 cannot be loaded.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    pub async fn start_session(&mut self, player_name: &str) -> Result<(), EngineError> {
        self.require_phase(Phase::Intro)?;
        let before = self.state.clone();

        let name = player_name.trim();
        if name.is_empty() {
            return self.fail_intro(&before, EngineError::InvalidIdentity("player name is blank".to_string()));
        }

        let identity = match self.identity.resolve_identity(name).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Identity resolution failed");
                return self.fail_intro(&before, EngineError::InvalidIdentity(e.message));
            }
        };

        let items = match self.pool.load_pool(1).await {
            Ok(items) => items,
            Err(e) => return self.fail_intro(&before, e),
        };
        self.pool.install(1, items);

        info!(player_id = %identity.player_id(), "Session started");
        self.state.player = Some(identity);
        self.state.stage = 1;
        self.state.phase = Phase::Active;
        self.state.message = None;
        self.request_prefetch(1);
        let seconds = *self.config.round_seconds();
        self.next_round(seconds);
        self.commit(&before);
        Ok(())
    }

    fn fail_intro(&mut self, before: &SessionState, err: EngineError) -> Result<(), EngineError> {
        warn!(error = %err, "Session could not start");
        self.state.message = Some(err.to_string());
        self.commit(before);
        Err(err)
    }

    // ─────────────────────────────────────────────────────────────
    //  Guessing
    // ─────────────────────────────────────────────────────────────

    /// Applies a guess to the current item.
    ///
    /// # Errors
    ///
    /// Returns an error if no round is being played or the session is paused.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    pub async fn submit_guess(&mut self, guess: Guess) -> Result<GuessResult, EngineError> {
        let item = self.playable_item()?.clone();
        self.apply_guess(item, guess).await
    }

    /// Applies a guess only if `item_id` is still the current item.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StaleRound`] if the round already moved on, with
    /// no state change.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    pub async fn submit_guess_for(
        &mut self,
        item_id: &ItemId,
        guess: Guess,
    ) -> Result<GuessResult, EngineError> {
        let item = self.playable_item()?.clone();
        if item.id() != item_id {
            debug!(expected = %item_id, current = %item.id(), "Guess for stale item ignored");
            return Err(EngineError::StaleRound);
        }
        self.apply_guess(item, guess).await
    }

    async fn apply_guess(&mut self, item: Item, guess: Guess) -> Result<GuessResult, EngineError> {
        let before = self.state.clone();
        let verdict = evaluate_guess(&item, &guess);
        let result = match verdict {
            Verdict::Correct => self.on_correct(item).await,
            Verdict::Incorrect => self.on_incorrect(),
        };
        self.commit(&before);
        Ok(result)
    }

    async fn on_correct(&mut self, item: Item) -> GuessResult {
        self.pool.remove(item.id());
        self.tally = self.tally.record_correct();
        self.sync_tally();
        info!(
            item_id = %item.id(),
            score = self.tally.score,
            streak = self.tally.streak,
            "Correct guess"
        );

        match self.progression.on_score(self.tally.score, self.state.stage) {
            Some(advance) => {
                let completed = StageCompletion {
                    stage: *advance.completed_stage(),
                    reward: *advance.reward(),
                };
                self.advance_stage(advance).await;
                GuessResult {
                    verdict: Verdict::Correct,
                    completed: Some(completed),
                    ended: self.state.end_reason,
                }
            }
            None => {
                let seconds = *self.config.round_seconds();
                self.next_round(seconds);
                GuessResult {
                    verdict: Verdict::Correct,
                    completed: None,
                    ended: self.state.end_reason,
                }
            }
        }
    }

    fn on_incorrect(&mut self) -> GuessResult {
        self.tally = self.tally.record_miss();
        self.sync_tally();
        self.state.feedback = Some(Feedback::Incorrect);
        let outcome = self.tries.consume();
        self.state.tries_remaining = self.tries.remaining();
        debug!(tries_remaining = self.tries.remaining(), "Incorrect guess");
        if outcome == TriesOutcome::Exhausted {
            self.end_session(EndReason::TriesExhausted);
        }
        GuessResult {
            verdict: Verdict::Incorrect,
            completed: None,
            ended: self.state.end_reason,
        }
    }

    // ─────────────────────────────────────────────────────────────
    //  Stage progression
    // ─────────────────────────────────────────────────────────────

    /// Grants the reward, persists, swaps content, and starts the next round.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    async fn advance_stage(&mut self, advance: StageAdvance) {
        let stage = *advance.completed_stage();
        let reward = *advance.reward();

        self.emit(EngineEvent::StageCompleted { reward, stage });
        self.persist_reward(stage, reward);
        self.persist_score();

        match *advance.next() {
            NextStage::End => self.end_session(EndReason::FinalStageCleared),
            NextStage::Stay(_) => {
                let seconds = *self.config.round_seconds();
                self.next_round(seconds);
            }
            NextStage::Advance(next) | NextStage::Loop(next) => {
                // The cleared item stays on screen until the next one is
                // presented; input is gated on the phase.
                self.timer.cancel();
                self.state.stage = next;
                self.state.lap = self.progression.lap();
                self.state.phase = Phase::RoundTransition;
                self.state.seconds_remaining = 0;
                self.publish();
                self.install_stage(next).await;
            }
        }
    }

    /// Swaps in the pool for `stage` and presents an item.
    ///
    /// If content cannot be loaded the stage still counts as reached; play
    /// continues on leftover items when there are any, otherwise the session
    /// waits in `RoundTransition` for [`SessionController::retry_content`].
    async fn install_stage(&mut self, stage: u32) {
        let seconds = *self.config.round_seconds();
        match self.pool.swap_to_stage(stage).await {
            Ok(source) => {
                debug!(stage, source = ?source, "Stage pool installed");
                self.pending_stage = None;
                self.state.message = None;
                self.state.phase = Phase::Active;
                self.request_prefetch(stage);
                self.next_round(seconds);
            }
            Err(e) => {
                warn!(stage, error = %e, "Stage content unavailable");
                self.pending_stage = Some(stage);
                self.state.message = Some(e.to_string());
                if self.pool.is_empty() {
                    self.state.phase = Phase::RoundTransition;
                } else {
                    self.state.phase = Phase::Active;
                    self.next_round(seconds);
                }
            }
        }
    }

    /// Re-attempts a stage pool load that failed earlier.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SessionOver`] after game over and
    /// [`EngineError::ContentUnavailable`] if the load fails again.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    pub async fn retry_content(&mut self) -> Result<(), EngineError> {
        if self.state.is_over() {
            return Err(EngineError::SessionOver);
        }
        let Some(stage) = self.pending_stage else {
            debug!("No failed content load to retry");
            return Ok(());
        };
        let before = self.state.clone();

        match self.pool.swap_to_stage(stage).await {
            Ok(_) => {
                info!(stage, "Content retry succeeded");
                self.pending_stage = None;
                self.state.message = None;
                self.request_prefetch(stage);
                if self.state.phase == Phase::RoundTransition {
                    self.state.phase = Phase::Active;
                    let seconds = *self.config.round_seconds();
                    self.next_round(seconds);
                }
                self.commit(&before);
                Ok(())
            }
            Err(e) => {
                warn!(stage, error = %e, "Content retry failed");
                self.state.message = Some(e.to_string());
                self.commit(&before);
                Err(e)
            }
        }
    }

    fn request_prefetch(&mut self, stage: u32) {
        if let Some(target) = self.progression.prefetch_target(stage) {
            self.pool.prefetch_next(target);
        }
    }

    // ─────────────────────────────────────────────────────────────
    //  Countdown
    // ─────────────────────────────────────────────────────────────

    /// Applies one countdown tick.
    ///
    /// Ticks for a cancelled or superseded round are ignored.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    pub fn on_tick(&mut self, token: RoundToken) -> TickOutcome {
        if self.state.phase != Phase::Active {
            return TickOutcome::Stale;
        }
        let outcome = self.timer.tick(token);
        match outcome {
            TickOutcome::Stale => {}
            TickOutcome::Running(seconds) => {
                self.state.seconds_remaining = seconds;
                self.publish();
            }
            TickOutcome::Expired => {
                let before = self.state.clone();
                self.on_round_expired();
                self.commit(&before);
            }
        }
        outcome
    }

    fn on_round_expired(&mut self) {
        self.state.seconds_remaining = 0;
        if let Some(item) = self.state.current_item.take() {
            info!(item_id = %item.id(), "Round expired");
            self.pool.remove(item.id());
        }
        self.tally = self.tally.record_miss();
        self.sync_tally();

        match self.tries.consume() {
            TriesOutcome::Exhausted => {
                self.state.tries_remaining = 0;
                self.end_session(EndReason::TriesExhausted);
            }
            TriesOutcome::Remaining(left) => {
                self.state.tries_remaining = left;
                let seconds = *self.config.timeout_reset_seconds();
                self.next_round(seconds);
            }
        }
    }

    /// Stops the countdown, keeping the seconds left.
    ///
    /// # Errors
    ///
    /// Returns an error if no round is being played or it is already paused.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.playable_item()?;
        let before = self.state.clone();
        let remaining = self.timer.pause().unwrap_or(self.state.seconds_remaining);
        self.state.seconds_remaining = remaining;
        self.state.paused = true;
        info!(remaining, "Session paused");
        self.commit(&before);
        Ok(())
    }

    /// Restarts the countdown from where it was paused.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not in an active round.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.require_phase(Phase::Active)?;
        if !self.state.paused {
            return Ok(());
        }
        let before = self.state.clone();
        let seconds = self.state.seconds_remaining.max(1);
        self.timer.start(seconds);
        self.state.seconds_remaining = seconds;
        self.state.paused = false;
        info!(seconds, "Session resumed");
        self.commit(&before);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    //  Hints and skips
    // ─────────────────────────────────────────────────────────────

    /// Reveals one more leading character of the answer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::HintsExhausted`] when the budget is spent.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    pub fn request_hint(&mut self) -> Result<String, EngineError> {
        let item = self.playable_item()?.clone();
        if self.state.hint_budget == 0 {
            return Err(EngineError::HintsExhausted);
        }
        let before = self.state.clone();
        self.state.hint_budget -= 1;
        let used = self.config.hint_budget().saturating_sub(self.state.hint_budget);
        let hint = reveal(item.answer_text(), used as usize);
        debug!(hints_left = self.state.hint_budget, "Hint issued");
        self.state.active_hint = Some(hint.clone());
        self.commit(&before);
        Ok(hint)
    }

    /// Discards the current item and presents another.
    ///
    /// # Errors
    ///
    /// Returns an error if no round is being played or the session is paused.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    pub fn skip_item(&mut self) -> Result<SkipOutcome, EngineError> {
        let item = self.playable_item()?.clone();
        let before = self.state.clone();
        info!(item_id = %item.id(), "Item skipped");
        self.pool.remove(item.id());
        let seconds = *self.config.round_seconds();
        self.next_round(seconds);
        self.commit(&before);
        Ok(match self.state.end_reason {
            Some(reason) => SkipOutcome::SessionEnded(reason),
            None => SkipOutcome::NextItem,
        })
    }

    // ─────────────────────────────────────────────────────────────
    //  Ending
    // ─────────────────────────────────────────────────────────────

    /// Ends the session at the player's request.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    pub fn quit(&mut self) {
        if self.state.is_over() {
            return;
        }
        let before = self.state.clone();
        self.end_session(EndReason::Quit);
        self.commit(&before);
    }

    /// Flushes pending writes and stops background work.
    #[instrument(skip(self), fields(session_id = %self.state.session_id))]
    pub async fn shutdown(mut self) -> OutboxReport {
        self.timer.cancel();
        self.pool.cancel_prefetch();
        let Self { outbox, .. } = self;
        outbox.close().await
    }

    fn end_session(&mut self, reason: EndReason) {
        if self.state.is_over() {
            return;
        }
        self.timer.cancel();
        self.pool.cancel_prefetch();
        self.pending_stage = None;
        self.state.phase = Phase::GameOver;
        self.state.current_item = None;
        self.state.seconds_remaining = 0;
        self.state.paused = false;
        self.state.active_hint = None;
        self.state.end_reason = Some(reason);
        info!(
            score = self.state.score,
            stage = self.state.stage,
            max_streak = self.state.max_streak,
            %reason,
            "Session ended"
        );
        self.persist_score();
        self.emit(EngineEvent::SessionEnded {
            final_score: self.state.score,
            reason,
        });
    }

    // ─────────────────────────────────────────────────────────────
    //  Helpers
    // ─────────────────────────────────────────────────────────────

    /// Presents the next random item, or ends the session when none are left.
    fn next_round(&mut self, seconds: u32) {
        match self.pool.pick_random() {
            Ok(item) => self.present(item, seconds),
            Err(PoolExhausted) => self.end_session(EndReason::PoolExhausted),
        }
    }

    /// Makes `item` current with a fresh countdown and cleared round state.
    fn present(&mut self, item: Item, seconds: u32) {
        self.timer.start(seconds);
        debug!(item_id = %item.id(), seconds, "Presenting item");
        self.state.current_item = Some(item);
        self.state.seconds_remaining = seconds;
        self.state.hint_budget = *self.config.hint_budget();
        self.state.feedback = None;
        self.state.active_hint = None;
        self.state.paused = false;
    }

    fn playable_item(&self) -> Result<&Item, EngineError> {
        match self.state.phase {
            Phase::GameOver => return Err(EngineError::SessionOver),
            Phase::Active => {}
            actual => {
                return Err(EngineError::WrongPhase {
                    expected: Phase::Active,
                    actual,
                });
            }
        }
        if self.state.paused {
            return Err(EngineError::Paused);
        }
        self.state.current_item.as_ref().ok_or(EngineError::WrongPhase {
            expected: Phase::Active,
            actual: self.state.phase,
        })
    }

    fn require_phase(&self, expected: Phase) -> Result<(), EngineError> {
        match self.state.phase {
            actual if actual == expected => Ok(()),
            Phase::GameOver => Err(EngineError::SessionOver),
            actual => Err(EngineError::WrongPhase { expected, actual }),
        }
    }

    fn sync_tally(&mut self) {
        self.state.score = self.tally.score;
        self.state.streak = self.tally.streak;
        self.state.max_streak = self.tally.max_streak;
    }

    fn persist_score(&self) {
        let Some(player) = &self.state.player else {
            debug!("No player resolved; score not persisted");
            return;
        };
        self.outbox.submit(PersistRecord::Score(ScoreRecord::new(
            self.state.session_id.clone(),
            player.player_id().clone(),
            player.player_name().clone(),
            self.state.score,
            self.state.stage,
            self.state.streak,
            Utc::now(),
        )));
    }

    fn persist_reward(&self, stage: u32, reward: RewardKind) {
        let Some(player) = &self.state.player else {
            return;
        };
        self.outbox.submit(PersistRecord::Reward(RewardGrant::new(
            self.state.session_id.clone(),
            player.player_id().clone(),
            stage,
            reward,
            self.state.score,
            Utc::now(),
        )));
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("No event subscribers");
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    /// Checks transition invariants in debug builds and publishes the state.
    fn commit(&self, before: &SessionState) {
        let checked = SessionInvariants::check_all(before, &self.state);
        if let Err(violations) = &checked {
            error!(?violations, "Session invariant violated");
        }
        debug_assert!(checked.is_ok(), "Session invariant violated: {:?}", checked);
        self.publish();
    }
}

/// Masks an answer, revealing the first `shown` non-space characters.
fn reveal(answer: &str, shown: usize) -> String {
    let mut revealed = 0;
    answer
        .chars()
        .map(|c| {
            if c.is_whitespace() {
                c
            } else if revealed < shown {
                revealed += 1;
                c
            } else {
                '_'
            }
        })
        .collect()
}
