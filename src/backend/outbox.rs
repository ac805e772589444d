//! Background writer that keeps persistence off the guess-handling path.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use derive_getters::Getters;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::backend::{RewardGrant, ScoreBackend, ScoreRecord};
use crate::error::BackendError;

/// A write queued for the persistence backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistRecord {
    /// Score snapshot.
    Score(ScoreRecord),
    /// Reward grant.
    Reward(RewardGrant),
}

impl PersistRecord {
    fn label(&self) -> &'static str {
        match self {
            Self::Score(_) => "score",
            Self::Reward(_) => "reward",
        }
    }
}

/// Delivery totals returned when the outbox is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Getters)]
pub struct OutboxReport {
    delivered: usize,
    dropped: usize,
}

#[derive(Debug)]
struct Pending {
    record: PersistRecord,
    attempts: u32,
}

/// Queue of score and reward writes drained by a background task.
///
/// Failed writes are retried on a fixed interval up to a maximum number of
/// attempts, then dropped with a warning.
#[derive(Debug)]
pub struct PersistenceOutbox {
    tx: mpsc::UnboundedSender<PersistRecord>,
    task: JoinHandle<OutboxReport>,
}

impl PersistenceOutbox {
    /// Spawns the writer task.
    ///
    /// A zero `retry_every` falls back to one second.
    #[instrument(skip(backend))]
    pub fn spawn(backend: Arc<dyn ScoreBackend>, retry_every: Duration, max_attempts: u32) -> Self {
        let retry_every = if retry_every.is_zero() {
            warn!("Zero retry interval; using one second");
            Duration::from_secs(1)
        } else {
            retry_every
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_writer(backend, rx, retry_every, max_attempts.max(1)));
        info!("Persistence outbox started");
        Self { tx, task }
    }

    /// Queues a record without waiting for it to be written.
    #[instrument(skip(self, record), fields(kind = record.label()))]
    pub fn submit(&self, record: PersistRecord) {
        if self.tx.send(record).is_err() {
            warn!("Persistence writer has stopped; record discarded");
        }
    }

    /// Stops accepting records, flushes what is queued, and reports totals.
    #[instrument(skip(self))]
    pub async fn close(self) -> OutboxReport {
        drop(self.tx);
        match self.task.await {
            Ok(report) => {
                info!(delivered = report.delivered, dropped = report.dropped, "Outbox closed");
                report
            }
            Err(e) => {
                warn!(error = %e, "Persistence writer task failed");
                OutboxReport::default()
            }
        }
    }
}

async fn run_writer(
    backend: Arc<dyn ScoreBackend>,
    mut rx: mpsc::UnboundedReceiver<PersistRecord>,
    retry_every: Duration,
    max_attempts: u32,
) -> OutboxReport {
    let mut pending: VecDeque<Pending> = VecDeque::new();
    let mut report = OutboxReport::default();
    let mut retry = tokio::time::interval_at(Instant::now() + retry_every, retry_every);
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(record) => {
                    let entry = Pending { record, attempts: 0 };
                    deliver(backend.as_ref(), entry, &mut pending, &mut report, max_attempts).await;
                }
                None => break,
            },
            _ = retry.tick(), if !pending.is_empty() => {
                debug!(count = pending.len(), "Retrying failed writes");
                let batch: Vec<Pending> = pending.drain(..).collect();
                for entry in batch {
                    deliver(backend.as_ref(), entry, &mut pending, &mut report, max_attempts).await;
                }
            }
        }
    }

    // Final flush: one more attempt for everything still queued.
    for mut entry in pending.drain(..) {
        entry.attempts += 1;
        match write(backend.as_ref(), &entry.record).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!(kind = entry.record.label(), attempts = entry.attempts, error = %e, "Dropping unsent record at shutdown");
                report.dropped += 1;
            }
        }
    }
    report
}

async fn deliver(
    backend: &dyn ScoreBackend,
    mut entry: Pending,
    pending: &mut VecDeque<Pending>,
    report: &mut OutboxReport,
    max_attempts: u32,
) {
    entry.attempts += 1;
    match write(backend, &entry.record).await {
        Ok(()) => {
            debug!(kind = entry.record.label(), attempts = entry.attempts, "Record persisted");
            report.delivered += 1;
        }
        Err(e) if entry.attempts >= max_attempts => {
            warn!(kind = entry.record.label(), attempts = entry.attempts, error = %e, "Giving up on record");
            report.dropped += 1;
        }
        Err(e) => {
            warn!(kind = entry.record.label(), attempts = entry.attempts, error = %e, "Write failed, will retry");
            pending.push_back(entry);
        }
    }
}

async fn write(backend: &dyn ScoreBackend, record: &PersistRecord) -> Result<(), BackendError> {
    match record {
        PersistRecord::Score(score) => backend.submit_score(score).await,
        PersistRecord::Reward(grant) => backend.submit_reward(grant).await,
    }
}
