//! Round countdown and remaining-attempt bookkeeping.
//!
//! The countdown runs as a spawned task that only emits [`RoundToken`]s; the
//! owner applies each tick. Every restart or cancellation bumps the token
//! generation, so ticks still queued from an earlier round are recognized as
//! stale and ignored.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, instrument, trace};

/// Length of one countdown tick.
pub const TICK: Duration = Duration::from_secs(1);

/// Identifies one armed countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundToken {
    generation: u64,
}

/// Countdown state for the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    /// No countdown armed.
    Idle,
    /// Counting down.
    Running(u32),
    /// Reached zero.
    Expired,
}

/// Result of applying one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick belonged to a cancelled or superseded countdown.
    Stale,
    /// Still counting; seconds left.
    Running(u32),
    /// The round just expired.
    Expired,
}

/// Cancellable per-round countdown.
#[derive(Debug)]
pub struct RoundTimer {
    generation: u64,
    countdown: Countdown,
    period: Duration,
    ticks: mpsc::UnboundedSender<RoundToken>,
    task: Option<JoinHandle<()>>,
}

impl RoundTimer {
    /// Creates an idle timer that will deliver ticks on `ticks`.
    pub fn new(ticks: mpsc::UnboundedSender<RoundToken>, period: Duration) -> Self {
        Self {
            generation: 0,
            countdown: Countdown::Idle,
            period,
            ticks,
            task: None,
        }
    }

    /// Cancels any running countdown and arms a new one.
    #[instrument(skip(self))]
    pub fn start(&mut self, seconds: u32) -> RoundToken {
        self.cancel();
        self.countdown = Countdown::Running(seconds);
        let token = self.token();
        let ticks = self.ticks.clone();
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if ticks.send(token).is_err() {
                    break;
                }
            }
        }));
        debug!(generation = self.generation, seconds, "Countdown armed");
        token
    }

    /// Stops the countdown and invalidates its token.
    #[instrument(skip(self))]
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
        self.countdown = Countdown::Idle;
    }

    /// Cancels the countdown, returning the seconds it had left.
    #[instrument(skip(self))]
    pub fn pause(&mut self) -> Option<u32> {
        let remaining = match self.countdown {
            Countdown::Running(seconds) => Some(seconds),
            Countdown::Idle | Countdown::Expired => None,
        };
        self.cancel();
        remaining
    }

    /// Applies one tick delivered for `token`.
    #[instrument(skip(self))]
    pub fn tick(&mut self, token: RoundToken) -> TickOutcome {
        if token.generation != self.generation {
            trace!(current = self.generation, "Ignoring stale tick");
            return TickOutcome::Stale;
        }
        match self.countdown {
            Countdown::Running(seconds) if seconds > 1 => {
                self.countdown = Countdown::Running(seconds - 1);
                TickOutcome::Running(seconds - 1)
            }
            Countdown::Running(_) => {
                self.countdown = Countdown::Expired;
                if let Some(task) = self.task.take() {
                    task.abort();
                }
                // Anything still queued for this countdown is now stale.
                self.generation += 1;
                debug!("Countdown expired");
                TickOutcome::Expired
            }
            Countdown::Idle | Countdown::Expired => TickOutcome::Stale,
        }
    }

    /// Token of the countdown currently armed.
    pub fn token(&self) -> RoundToken {
        RoundToken {
            generation: self.generation,
        }
    }

    /// Current countdown state.
    pub fn countdown(&self) -> Countdown {
        self.countdown
    }

    /// Seconds left, or zero when not running.
    pub fn seconds_remaining(&self) -> u32 {
        match self.countdown {
            Countdown::Running(seconds) => seconds,
            Countdown::Idle | Countdown::Expired => 0,
        }
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Result of spending one try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriesOutcome {
    /// Tries left after spending one.
    Remaining(u32),
    /// None left; the session must end.
    Exhausted,
}

/// Remaining attempts. Only ever decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tries {
    remaining: u32,
}

impl Tries {
    /// Starts with `remaining` tries.
    pub fn new(remaining: u32) -> Self {
        Self { remaining }
    }

    /// Spends one try.
    pub fn consume(&mut self) -> TriesOutcome {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            TriesOutcome::Exhausted
        } else {
            TriesOutcome::Remaining(self.remaining)
        }
    }

    /// Tries left.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}
