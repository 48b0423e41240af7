//! Local item cache
//!
//! In-memory mirror of the store's auction items for the lifetime of the
//! process. Items are only ever changed through [`ItemCache::upsert`] (and
//! replaced wholesale by a full reload), which keeps the bid floor enforced in
//! one place. No ordering is kept here; display order is the render step's job.
use crate::{
    auction::{AuctionItem, ItemChange, ItemIdRef},
    golf::GolfScore,
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Default)]
pub struct ItemCache {
    items: Mutex<Vec<AuctionItem>>,
}

pub type SharedItemCache = Arc<ItemCache>;

impl ItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedItemCache {
        Arc::new(Self::new())
    }

    /// Merge `change` over the item with the same id, or append it
    ///
    /// Returns the item as it is cached afterwards.
    pub fn upsert(&self, change: ItemChange) -> AuctionItem {
        let mut items = self.items.lock();
        match items.iter_mut().find(|item| item.id == change.id) {
            Some(existing) => {
                *existing = existing.merge(&change);
                existing.clone()
            }
            None => {
                let item = change.into_item();
                items.push(item.clone());
                item
            }
        }
    }

    pub fn get(&self, id: ItemIdRef) -> Option<AuctionItem> {
        self.items.lock().iter().find(|item| item.id == id).cloned()
    }

    pub fn all(&self) -> Vec<AuctionItem> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Swap in a freshly loaded set, forgetting anything the store no longer has
    pub(crate) fn replace_all(&self, items: Vec<AuctionItem>) {
        *self.items.lock() = items;
    }
}

/// Golf team scores, replaced wholesale on every reload
#[derive(Default)]
pub struct ScoreCache {
    scores: Mutex<Vec<GolfScore>>,
    generation: AtomicU64,
}

pub type SharedScoreCache = Arc<ScoreCache>;

impl ScoreCache {
    pub fn new_shared() -> SharedScoreCache {
        Arc::new(Self::default())
    }

    pub fn all(&self) -> Vec<GolfScore> {
        self.scores.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.scores.lock().len()
    }

    /// Number of reloads so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn replace_all(&self, scores: Vec<GolfScore>) {
        *self.scores.lock() = scores;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
