//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use strictly_guess::{
    BackendError, Collaborators, ContentStore, Difficulty, EngineConfig, Guess, IdentityProvider,
    Item, LeaderboardEntry, LeaderboardService, PlayerIdentity, RewardGrant, RewardKind,
    ScoreBackend, ScoreRecord, SessionState, StageRequirement,
};

/// Builds an item whose answer equals its id.
pub fn item(id: &str, level: u8) -> Item {
    Item::new(
        id.to_string(),
        format!("What is {}?", id),
        "?".to_string(),
        id.to_string(),
        Difficulty::try_from(level).expect("valid difficulty"),
    )
}

/// `count` items at `level`, ids prefixed with `prefix`.
pub fn items(prefix: &str, level: u8, count: usize) -> Vec<Item> {
    (0..count)
        .map(|i| item(&format!("{}{}", prefix, i), level))
        .collect()
}

/// Two stages with small thresholds and a fixed seed.
pub fn small_config(stage1: u32, stage2: u32) -> EngineConfig {
    EngineConfig::default()
        .with_stages(vec![
            StageRequirement::new(1, stage1, RewardKind::Sticker),
            StageRequirement::new(2, stage2, RewardKind::Badge),
        ])
        .with_rng_seed(7)
}

/// The correct answer for whatever item is current.
pub fn answer(state: &SessionState) -> Guess {
    let item = state.current_item().as_ref().expect("an item is presented");
    Guess::parse(item.answer_text()).expect("answer is a valid guess")
}

/// A guess that never matches catalog answers.
pub fn wrong() -> Guess {
    Guess::parse("definitely not it").expect("valid guess")
}

/// Bundles fakes into [`Collaborators`].
pub fn collaborators(
    content: Arc<ScriptedContentStore>,
    backend: Arc<RecordingBackend>,
) -> Collaborators {
    Collaborators {
        content,
        backend,
        identity: Arc::new(FixedIdentity::default()),
    }
}

// ─────────────────────────────────────────────────────────────
//  Content
// ─────────────────────────────────────────────────────────────

/// Content store serving a fixed item list, optionally failing.
#[derive(Debug, Default)]
pub struct ScriptedContentStore {
    items: Vec<Item>,
    failing: AtomicBool,
    fail_above: AtomicU8,
    fetches: AtomicUsize,
}

impl ScriptedContentStore {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            failing: AtomicBool::new(false),
            fail_above: AtomicU8::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fails fetches whose band reaches above `level`; 0 turns this off.
    pub fn fail_above(&self, level: u8) {
        self.fail_above.store(level, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for ScriptedContentStore {
    async fn fetch_items(
        &self,
        min: Difficulty,
        max: Difficulty,
        limit: usize,
    ) -> Result<Vec<Item>, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::content("content service unreachable"));
        }
        let ceiling = self.fail_above.load(Ordering::SeqCst);
        if ceiling != 0 && max.level() > ceiling {
            return Err(BackendError::content("harder content unavailable"));
        }
        Ok(self
            .items
            .iter()
            .filter(|item| min <= *item.difficulty() && *item.difficulty() <= max)
            .take(limit)
            .cloned()
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────
//  Persistence
// ─────────────────────────────────────────────────────────────

/// Backend that records writes, failing the first `failures` calls.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    scores: Mutex<Vec<ScoreRecord>>,
    rewards: Mutex<Vec<RewardGrant>>,
    failures: AtomicU32,
    always_fail: AtomicBool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            always_fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn scores(&self) -> Vec<ScoreRecord> {
        self.scores.lock().expect("lock").clone()
    }

    pub fn rewards(&self) -> Vec<RewardGrant> {
        self.rewards.lock().expect("lock").clone()
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(BackendError::persistence("database is read-only"));
        }
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BackendError::persistence("transient write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ScoreBackend for RecordingBackend {
    async fn submit_score(&self, record: &ScoreRecord) -> Result<(), BackendError> {
        self.check()?;
        self.scores.lock().expect("lock").push(record.clone());
        Ok(())
    }

    async fn submit_reward(&self, grant: &RewardGrant) -> Result<(), BackendError> {
        self.check()?;
        self.rewards.lock().expect("lock").push(grant.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
//  Identity
// ─────────────────────────────────────────────────────────────

/// Identity provider that derives the id from the name.
#[derive(Debug, Default)]
pub struct FixedIdentity {
    pub failing: bool,
}

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn resolve_identity(&self, player_name: &str) -> Result<PlayerIdentity, BackendError> {
        if self.failing {
            return Err(BackendError::identity("identity service down"));
        }
        Ok(PlayerIdentity::new(
            format!("id-{}", player_name.to_lowercase()),
            player_name.to_string(),
        ))
    }
}

// ─────────────────────────────────────────────────────────────
//  Leaderboard
// ─────────────────────────────────────────────────────────────

/// Leaderboard that replays scripted responses, repeating the last one.
#[derive(Debug, Default)]
pub struct ScriptedLeaderboard {
    responses: Mutex<VecDeque<Option<Vec<LeaderboardEntry>>>>,
    last: Mutex<Option<Vec<LeaderboardEntry>>>,
    polls: AtomicUsize,
}

impl ScriptedLeaderboard {
    /// `None` entries make that poll fail.
    pub fn new(responses: Vec<Option<Vec<LeaderboardEntry>>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

/// Board where `player_id` sits at `rank` among filler players.
pub fn board_with(player_id: &str, rank: Option<usize>) -> Vec<LeaderboardEntry> {
    let mut ids: Vec<String> = (0..5).map(|i| format!("other-{}", i)).collect();
    if let Some(rank) = rank {
        ids.insert(rank - 1, player_id.to_string());
    }
    ids.into_iter()
        .enumerate()
        .map(|(i, id)| LeaderboardEntry::new(id.clone(), id, 100 - i as u32 * 10))
        .collect()
}

#[async_trait]
impl LeaderboardService for ScriptedLeaderboard {
    async fn fetch_top(&self, n: usize) -> Result<Vec<LeaderboardEntry>, BackendError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().expect("lock").pop_front();
        let response = match next {
            Some(response) => {
                if let Some(entries) = &response {
                    *self.last.lock().expect("lock") = Some(entries.clone());
                }
                response
            }
            None => self.last.lock().expect("lock").clone(),
        };
        match response {
            Some(mut entries) => {
                entries.truncate(n);
                Ok(entries)
            }
            None => Err(BackendError::leaderboard("leaderboard unavailable")),
        }
    }
}
