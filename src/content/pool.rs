//! Working set of playable items plus a prefetched next-stage buffer.

use std::collections::HashSet;
use std::sync::Arc;

use derive_more::{Display, Error};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::content::{ContentStore, DifficultyBand, Item, ItemId};
use crate::error::{BackendError, EngineError};

/// The active pool has no items left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
#[display("Content pool exhausted")]
pub struct PoolExhausted;

/// Where a freshly installed stage pool came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSource {
    /// The prefetch buffer was ready and replaced the pool.
    Prefetched,
    /// The pool was fetched on demand.
    Loaded,
}

#[derive(Debug)]
struct Prefetch {
    stage: u32,
    task: JoinHandle<Result<Vec<Item>, BackendError>>,
}

/// Owns the items still playable in the current stage.
///
/// Items handed out by [`ContentPool::pick_random`] are remembered so later
/// loads never bring them back.
#[derive(Debug)]
pub struct ContentPool {
    store: Arc<dyn ContentStore>,
    batch_size: usize,
    stage: u32,
    active: Vec<Item>,
    seen: HashSet<ItemId>,
    prefetch: Option<Prefetch>,
    rng: StdRng,
}

impl ContentPool {
    /// Creates an empty pool backed by `store`.
    #[instrument(skip(store))]
    pub fn new(store: Arc<dyn ContentStore>, batch_size: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            batch_size,
            stage: 0,
            active: Vec::new(),
            seen: HashSet::new(),
            prefetch: None,
            rng,
        }
    }

    /// Fetches a batch for `stage`'s difficulty band, excluding items already shown.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ContentUnavailable`] if the fetch fails or yields
    /// no unseen items.
    #[instrument(skip(self))]
    pub async fn load_pool(&self, stage: u32) -> Result<Vec<Item>, EngineError> {
        let band = DifficultyBand::for_stage(stage);
        let limit = self.batch_size + self.seen.len();
        let fetched = self
            .store
            .fetch_items(*band.min(), *band.max(), limit)
            .await
            .map_err(|e| {
                warn!(stage, error = %e, "Content fetch failed");
                EngineError::ContentUnavailable(format!("failed to load stage {}: {}", stage, e.message))
            })?;

        let items = self.unseen(fetched, band);
        if items.is_empty() {
            warn!(stage, "Content fetch returned no playable items");
            return Err(EngineError::ContentUnavailable(format!(
                "no items available for stage {}",
                stage
            )));
        }
        debug!(stage, count = items.len(), "Stage pool loaded");
        Ok(items)
    }

    /// Filters out seen and out-of-band items, capped at the batch size.
    fn unseen(&self, fetched: Vec<Item>, band: DifficultyBand) -> Vec<Item> {
        let mut ids = HashSet::new();
        fetched
            .into_iter()
            .filter(|item| band.contains(*item.difficulty()))
            .filter(|item| !self.seen.contains(item.id()))
            .filter(|item| ids.insert(item.id().clone()))
            .take(self.batch_size)
            .collect()
    }

    /// Replaces the active pool outright.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub fn install(&mut self, stage: u32, items: Vec<Item>) {
        if !self.active.is_empty() {
            debug!(
                dropped = self.active.len(),
                old_stage = self.stage,
                "Discarding leftover items from previous stage"
            );
        }
        self.stage = stage;
        self.active = items;
    }

    /// Starts priming the buffer for `stage` in the background.
    ///
    /// Any earlier prefetch is aborted.
    #[instrument(skip(self))]
    pub fn prefetch_next(&mut self, stage: u32) {
        self.cancel_prefetch();
        let store = Arc::clone(&self.store);
        let band = DifficultyBand::for_stage(stage);
        let limit = self.batch_size + self.seen.len();
        debug!(stage, limit, "Starting prefetch");
        let task =
            tokio::spawn(async move { store.fetch_items(*band.min(), *band.max(), limit).await });
        self.prefetch = Some(Prefetch { stage, task });
    }

    /// Aborts an outstanding prefetch.
    pub fn cancel_prefetch(&mut self) {
        if let Some(prefetch) = self.prefetch.take() {
            prefetch.task.abort();
        }
    }

    /// Installs the pool for `stage`, preferring a completed prefetch.
    ///
    /// Falls back to [`ContentPool::load_pool`] when no usable prefetch exists.
    /// On error the active pool is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ContentUnavailable`] if the fallback load fails.
    #[instrument(skip(self))]
    pub async fn swap_to_stage(&mut self, stage: u32) -> Result<PoolSource, EngineError> {
        if let Some(items) = self.take_prefetched(stage).await {
            info!(stage, count = items.len(), "Installing prefetched pool");
            self.install(stage, items);
            return Ok(PoolSource::Prefetched);
        }

        let items = self.load_pool(stage).await?;
        info!(stage, count = items.len(), "Installing freshly loaded pool");
        self.install(stage, items);
        Ok(PoolSource::Loaded)
    }

    /// Takes the prefetched items for `stage` if the prefetch already finished.
    async fn take_prefetched(&mut self, stage: u32) -> Option<Vec<Item>> {
        let prefetch = self.prefetch.take()?;
        if prefetch.stage != stage {
            debug!(wanted = stage, buffered = prefetch.stage, "Prefetch is for another stage");
            prefetch.task.abort();
            return None;
        }
        if !prefetch.task.is_finished() {
            debug!(stage, "Prefetch still in flight, loading synchronously");
            prefetch.task.abort();
            return None;
        }
        match prefetch.task.await {
            Ok(Ok(fetched)) => {
                let items = self.unseen(fetched, DifficultyBand::for_stage(stage));
                if items.is_empty() {
                    debug!(stage, "Prefetch yielded no unseen items");
                    None
                } else {
                    Some(items)
                }
            }
            Ok(Err(e)) => {
                warn!(stage, error = %e, "Prefetch failed");
                None
            }
            Err(e) => {
                warn!(stage, error = %e, "Prefetch task did not complete");
                None
            }
        }
    }

    /// Picks a uniformly random item from the active pool.
    ///
    /// The item stays in the pool until [`ContentPool::remove`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`PoolExhausted`] when the pool is empty.
    #[instrument(skip(self))]
    pub fn pick_random(&mut self) -> Result<Item, PoolExhausted> {
        if self.active.is_empty() {
            debug!(stage = self.stage, "Pool exhausted");
            return Err(PoolExhausted);
        }
        let index = self.rng.gen_range(0..self.active.len());
        let item = self.active[index].clone();
        self.seen.insert(item.id().clone());
        debug!(item_id = %item.id(), remaining = self.active.len(), "Item picked");
        Ok(item)
    }

    /// Removes an item from the active pool by identity.
    ///
    /// Returns `true` if the item was present.
    #[instrument(skip(self))]
    pub fn remove(&mut self, id: &ItemId) -> bool {
        let before = self.active.len();
        self.active.retain(|item| item.id() != id);
        let removed = self.active.len() < before;
        if !removed {
            debug!(item_id = %id, "Item not in active pool");
        }
        removed
    }

    /// Stage the active pool was loaded for.
    pub fn stage(&self) -> u32 {
        self.stage
    }

    /// Number of items left in the active pool.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Returns `true` if the active pool is empty.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Returns `true` if a prefetch for `stage` is buffered or in flight.
    pub fn has_prefetch_for(&self, stage: u32) -> bool {
        self.prefetch.as_ref().is_some_and(|p| p.stage == stage)
    }
}

impl Drop for ContentPool {
    fn drop(&mut self) {
        self.cancel_prefetch();
    }
}
