//! Polls the leaderboard and turns rank movement into events.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use derive_getters::Getters;
use derive_new::new;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::backend::PlayerId;
use crate::engine::EngineEvent;
use crate::leaderboard::{LeaderboardService, LeaderboardSnapshot};

/// A strict rank improvement between two consecutive polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct RankUp {
    previous: usize,
    current: usize,
    delta: usize,
}

/// What one poll said about the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct RankObservation {
    /// 1-based rank, `None` when unranked.
    rank: Option<usize>,
    /// Leaderboard score, `None` when unranked.
    score: Option<u32>,
    /// Set when the rank strictly improved over a known previous rank.
    rank_up: Option<RankUp>,
    /// Set when the player sits inside the top tier.
    top_tier: bool,
}

/// Diffs the player's rank across consecutive snapshots.
#[derive(Debug, Clone)]
pub struct RankTracker {
    player_id: PlayerId,
    top_tier: usize,
    previous_rank: Option<usize>,
    latest: Option<LeaderboardSnapshot>,
}

impl RankTracker {
    /// Tracks `player_id`, treating ranks `1..=top_tier` as top tier.
    pub fn new(player_id: PlayerId, top_tier: usize) -> Self {
        Self {
            player_id,
            top_tier,
            previous_rank: None,
            latest: None,
        }
    }

    /// Folds in a new snapshot, replacing the previous one.
    #[instrument(skip(self, snapshot), fields(player_id = %self.player_id))]
    pub fn observe(&mut self, snapshot: LeaderboardSnapshot) -> RankObservation {
        let located = snapshot
            .locate(&self.player_id)
            .map(|(rank, entry)| (rank, *entry.total_score()));
        let rank = located.map(|(rank, _)| rank);
        let score = located.map(|(_, score)| score);

        let rank_up = match (self.previous_rank, rank) {
            (Some(previous), Some(current)) if current < previous => Some(RankUp {
                previous,
                current,
                delta: previous - current,
            }),
            _ => None,
        };
        let top_tier = rank.is_some_and(|r| r <= self.top_tier);

        debug!(rank = ?rank, previous = ?self.previous_rank, top_tier, "Rank observed");
        self.previous_rank = rank;
        self.latest = Some(snapshot);

        RankObservation {
            rank,
            score,
            rank_up,
            top_tier,
        }
    }

    /// Rank at the last successful poll.
    pub fn previous_rank(&self) -> Option<usize> {
        self.previous_rank
    }

    /// Last successfully fetched snapshot.
    pub fn latest(&self) -> Option<&LeaderboardSnapshot> {
        self.latest.as_ref()
    }
}

/// Polling parameters for [`LeaderboardMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, new)]
pub struct MonitorSettings {
    interval: Duration,
    size: usize,
    top_tier: usize,
}

/// Background poller. Polling stops when the monitor is stopped or dropped.
#[derive(Debug)]
pub struct LeaderboardMonitor {
    task: JoinHandle<()>,
    latest: watch::Receiver<Option<LeaderboardSnapshot>>,
}

impl LeaderboardMonitor {
    /// Starts polling immediately and then every `settings.interval`.
    ///
    /// A zero interval falls back to one second.
    #[instrument(skip(service, events))]
    pub fn spawn(
        service: Arc<dyn LeaderboardService>,
        player_id: PlayerId,
        settings: MonitorSettings,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        let period = if settings.interval.is_zero() {
            warn!("Zero poll interval; using one second");
            Duration::from_secs(1)
        } else {
            settings.interval
        };
        let (latest_tx, latest) = watch::channel(None);
        let task = tokio::spawn(async move {
            let mut tracker = RankTracker::new(player_id, settings.top_tier);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match service.fetch_top(settings.size).await {
                    Ok(entries) => {
                        let snapshot = LeaderboardSnapshot::new(entries, Utc::now());
                        let observation = tracker.observe(snapshot.clone());
                        latest_tx.send_replace(Some(snapshot));
                        publish(&events, observation);
                    }
                    Err(e) => {
                        warn!(error = %e, "Leaderboard poll failed; keeping previous snapshot");
                    }
                }
            }
        });
        info!("Leaderboard monitor started");
        Self { task, latest }
    }

    /// Last successfully fetched snapshot.
    pub fn latest(&self) -> Option<LeaderboardSnapshot> {
        self.latest.borrow().clone()
    }

    /// Stops polling.
    #[instrument(skip(self))]
    pub fn stop(self) {
        debug!("Stopping leaderboard monitor");
        // Drop aborts the task.
    }
}

impl Drop for LeaderboardMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn publish(events: &broadcast::Sender<EngineEvent>, observation: RankObservation) {
    if let Some(up) = observation.rank_up {
        info!(previous = up.previous, current = up.current, "Rank up");
        emit(
            events,
            EngineEvent::RankUp {
                previous: up.previous,
                current: up.current,
                delta: up.delta,
            },
        );
    }
    if let (true, Some(rank), Some(score)) = (observation.top_tier, observation.rank, observation.score) {
        emit(events, EngineEvent::RankChanged { rank, score });
    }
}

fn emit(events: &broadcast::Sender<EngineEvent>, event: EngineEvent) {
    if events.send(event).is_err() {
        debug!("No event subscribers");
    }
}
