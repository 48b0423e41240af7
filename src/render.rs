//! Re-render signalling
//!
//! Business logic never renders anything; it only marks items as changed.
//! Whoever displays the board waits on the [`RenderSignal`] and recomputes the
//! [`leaderboard`] from the cache.
use crate::auction::{AuctionItem, ItemId, ItemIdRef};
use parking_lot::{Condvar, Mutex};
use std::{collections::BTreeSet, sync::Arc, time::Duration};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderRequest {
    /// Only these items changed
    Items(BTreeSet<ItemId>),
    /// The whole set was replaced
    Full,
}

#[derive(Default)]
struct Pending {
    items: BTreeSet<ItemId>,
    full: bool,
    generation: u64,
}

#[derive(Default)]
pub struct RenderSignal {
    pending: Mutex<Pending>,
    condvar: Condvar,
}

pub type SharedRenderSignal = Arc<RenderSignal>;

impl RenderSignal {
    pub fn new_shared() -> SharedRenderSignal {
        Arc::new(Self::default())
    }

    pub fn item_changed(&self, id: ItemIdRef) {
        let mut pending = self.pending.lock();
        pending.items.insert(id.to_owned());
        pending.generation += 1;
        self.condvar.notify_all();
    }

    pub fn full_refresh(&self) {
        let mut pending = self.pending.lock();
        pending.full = true;
        pending.generation += 1;
        self.condvar.notify_all();
    }

    /// Number of signals raised so far; lets pollers tell whether to refetch
    pub fn generation(&self) -> u64 {
        self.pending.lock().generation
    }

    /// Take whatever is pending without waiting
    pub fn take(&self) -> Option<RenderRequest> {
        Self::drain(&mut self.pending.lock())
    }

    /// Wait up to `timeout` for something to render
    pub fn wait(&self, timeout: Duration) -> Option<RenderRequest> {
        let mut pending = self.pending.lock();
        if !pending.full && pending.items.is_empty() {
            self.condvar.wait_for(&mut pending, timeout);
        }
        Self::drain(&mut pending)
    }

    fn drain(pending: &mut Pending) -> Option<RenderRequest> {
        if pending.full {
            pending.full = false;
            pending.items.clear();
            return Some(RenderRequest::Full);
        }
        if pending.items.is_empty() {
            return None;
        }
        Some(RenderRequest::Items(std::mem::take(&mut pending.items)))
    }
}

/// Items in display order: highest current bid first, ties keep cache order
pub fn leaderboard(mut items: Vec<AuctionItem>) -> Vec<AuctionItem> {
    items.sort_by(|a, b| b.current_bid.cmp(&a.current_bid));
    items
}
