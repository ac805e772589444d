//! Content items, the Content Store seam, and the pool manager.

mod item;
mod pool;
mod store;

pub use item::{Difficulty, DifficultyBand, Item, ItemId};
pub use pool::{ContentPool, PoolExhausted, PoolSource};
pub use store::{CatalogContentStore, ContentStore};
