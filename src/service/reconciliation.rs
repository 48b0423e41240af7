//! Reconciliation of authoritative item records into the local cache
use super::{LoopService, SharedConnectionMonitor, SharedSubscriptionSlot};
use crate::{
    auction::{
        normalize::{normalize_items, normalize_record},
        AuctionItem, ItemChange,
    },
    cache::SharedItemCache,
    render::SharedRenderSignal,
    store::{AuctionStore, ChangeEvent, ChangeKind, ItemQuery, StoreNotice, StoreResult, SubscriptionStatus},
};
use anyhow::Result;
use std::{thread, time::Duration};
use tracing::{debug, warn};

/// Merges records into the cache and tells the view about it
///
/// Applying the same record twice leaves the cache as applying it once, so
/// a bid we placed ourselves may safely come back through the change stream.
/// Records are applied in arrival order: an older record arriving late wins
/// over a newer one that was applied before it.
#[derive(Clone)]
pub struct Reconciler {
    cache: SharedItemCache,
    render: SharedRenderSignal,
    connection: SharedConnectionMonitor,
}

impl Reconciler {
    pub fn new(
        cache: SharedItemCache,
        render: SharedRenderSignal,
        connection: SharedConnectionMonitor,
    ) -> Self {
        Self {
            cache,
            render,
            connection,
        }
    }

    pub fn on_remote_change(&self, change: ItemChange) -> Option<AuctionItem> {
        let id = change.id.clone();
        self.cache.upsert(change);

        match self.cache.get(&id) {
            Some(item) => {
                self.render.item_changed(&id);
                Some(item)
            }
            None => {
                warn!(item_id = %id, "changed item missing from cache after upsert; requesting reload");
                self.connection.request_reload();
                None
            }
        }
    }

    /// Apply one event from the change stream
    pub fn on_store_event(&self, event: ChangeEvent) {
        if event.kind == ChangeKind::Delete {
            debug!("item deleted remotely; requesting reload");
            self.connection.request_reload();
            return;
        }

        match normalize_record(event.new_record) {
            Some(change) => {
                debug!(item_id = %change.id, kind = ?event.kind, "applying remote change");
                self.on_remote_change(change);
            }
            None => {
                warn!(kind = ?event.kind, "unusable change record; requesting reload");
                self.connection.request_reload();
            }
        }
    }

    /// Replace the cache with everything the store has now
    pub fn reload(&self, store: &dyn AuctionStore) -> StoreResult<usize> {
        let items = normalize_items(store.read(&ItemQuery::all())?);
        let count = items.len();
        self.cache.replace_all(items);
        self.render.full_refresh();
        debug!(items = count, "reloaded auction items");
        Ok(count)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

/// Feeds the change stream into the [`Reconciler`]
///
/// Any failure of the stream, or a status other than subscribed, drops the
/// subscription and marks the connection lost; resubscribing is up to the
/// [`super::Reconnector`].
pub struct ChangeFollower {
    reconciler: Reconciler,
    connection: SharedConnectionMonitor,
    subscription: SharedSubscriptionSlot,
    poll_timeout: Duration,
}

impl ChangeFollower {
    pub fn new(
        reconciler: Reconciler,
        connection: SharedConnectionMonitor,
        subscription: SharedSubscriptionSlot,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            reconciler,
            connection,
            subscription,
            poll_timeout,
        }
    }

    fn handle_notice(&self, notice: StoreNotice) {
        match notice {
            // the reconnector marks us connected once the reload is done
            StoreNotice::Status(SubscriptionStatus::Subscribed) => debug!("change stream subscribed"),
            StoreNotice::Status(status) => {
                self.subscription.clear();
                self.connection
                    .mark_disconnected(&format!("change stream status {status:?}"));
            }
            StoreNotice::Change(event) => self.reconciler.on_store_event(event),
        }
    }
}

impl LoopService for ChangeFollower {
    fn run_iteration(&mut self) -> Result<()> {
        match self.subscription.poll(self.poll_timeout) {
            None => thread::sleep(self.poll_timeout),
            Some(Ok(None)) => {}
            Some(Ok(Some(notice))) => self.handle_notice(notice),
            Some(Err(e)) => {
                self.subscription.clear();
                self.connection.mark_disconnected(&e);
            }
        }
        Ok(())
    }
}
