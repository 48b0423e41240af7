use super::*;
use crate::{
    auction::{normalize::RawItem, validate::Rejection, BidHistoryRecord},
    golf::{normalize::RawGolfScore, NewGolfScore},
    phase::AuctionPhase,
    service::{BidError, ConnectionState, LoopService},
    store::{
        AuctionStore, BidPatch, ChangeEvent, ChangeKind, ItemQuery, OwnedSubscription,
        ScorePatch, StoreError, StoreNotice, StoreResult, SubscriptionStatus,
    },
};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory store that lets other clients act at awkward moments
struct InterleavingStore {
    inner: Arc<InMemoryAuctionStore>,
    /// Written by "another client" as the next subscription is being set up
    write_on_subscribe: Mutex<Option<(String, BidPatch)>>,
    fail_score_reads: AtomicBool,
}

impl InterleavingStore {
    fn new(inner: Arc<InMemoryAuctionStore>) -> Self {
        Self {
            inner,
            write_on_subscribe: Mutex::new(None),
            fail_score_reads: AtomicBool::new(false),
        }
    }
}

impl AuctionStore for InterleavingStore {
    fn read(&self, query: &ItemQuery) -> StoreResult<Vec<RawItem>> {
        self.inner.read(query)
    }

    fn update(&self, id: &str, patch: &BidPatch) -> StoreResult<RawItem> {
        self.inner.update(id, patch)
    }

    fn subscribe(&self, table: &str, kinds: &[ChangeKind]) -> StoreResult<OwnedSubscription> {
        let pending = self.write_on_subscribe.lock().take();
        if let Some((id, patch)) = pending {
            self.inner.update(&id, &patch)?;
        }
        self.inner.subscribe(table, kinds)
    }

    fn insert_bid_history(&self, record: &BidHistoryRecord) -> StoreResult<()> {
        self.inner.insert_bid_history(record)
    }

    fn read_bid_history(&self, item_id: &str) -> StoreResult<Vec<BidHistoryRecord>> {
        self.inner.read_bid_history(item_id)
    }

    fn read_golf_scores(&self) -> StoreResult<Vec<RawGolfScore>> {
        if self.fail_score_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("connection reset".to_owned()));
        }
        self.inner.read_golf_scores()
    }

    fn update_golf_score(&self, id: &str, patch: &ScorePatch) -> StoreResult<RawGolfScore> {
        self.inner.update_golf_score(id, patch)
    }

    fn insert_golf_score(&self, score: &NewGolfScore) -> StoreResult<RawGolfScore> {
        self.inner.insert_golf_score(score)
    }
}

#[test]
fn bid_written_while_connecting_is_not_lost() -> Result<()> {
    let inner = Arc::new(InMemoryAuctionStore::new());
    inner.seed(&[item("A", 100, 50)]);
    let store = Arc::new(InterleavingStore::new(inner.clone()));
    *store.write_on_subscribe.lock() = Some((
        "A".to_owned(),
        BidPatch {
            current_bid: 500,
            high_bidder: "Erin".to_owned(),
            table_number: 2,
            updated_at: Utc::now(),
        },
    ));

    let ctx = AuctionContext::new(store, InMemoryPhaseStore::new_shared());
    ctx.init()?;
    ctx.phase.store(AuctionPhase::Active)?;
    assert_eq!(ctx.connection.state(), ConnectionState::Connected);
    assert_eq!(ctx.cache.get("A").map(|i| i.current_bid), Some(500));

    let mut follower = ctx.change_follower(POLL);
    for _ in 0..3 {
        follower.run_iteration()?;
    }
    assert_eq!(ctx.cache.get("A").map(|i| i.current_bid), Some(500));

    assert_eq!(
        ctx.bid_placement().place_bid(bid("A", 200.0)),
        Err(BidError::Rejected(Rejection::TooLow { current: 500 }))
    );
    assert_eq!(
        inner.read(&ItemQuery::all())?[0].current_bid,
        Some(json!(500))
    );
    Ok(())
}

#[test]
fn failed_reload_after_subscribing_stays_disconnected() -> Result<()> {
    let inner = Arc::new(InMemoryAuctionStore::new());
    inner.seed(&[item("A", 100, 50)]);
    let store = Arc::new(InterleavingStore::new(inner.clone()));
    store.fail_score_reads.store(true, Ordering::SeqCst);

    let ctx = AuctionContext::new(store.clone(), InMemoryPhaseStore::new_shared());
    ctx.init()?;

    assert_eq!(inner.subscribe_calls(), 2);
    assert_eq!(ctx.connection.state(), ConnectionState::Disconnected);
    assert!(!ctx.subscription.is_installed());
    assert!(!ctx.score_subscription.is_installed());

    store.fail_score_reads.store(false, Ordering::SeqCst);
    ctx.reconnector(Duration::ZERO, POLL).run_iteration()?;
    assert_eq!(ctx.connection.state(), ConnectionState::Connected);
    assert!(ctx.score_subscription.is_installed());
    Ok(())
}

#[test]
fn init_against_offline_store_stays_disconnected() -> Result<()> {
    let store = Arc::new(InMemoryAuctionStore::new());
    store.seed(&[item("A", 100, 50)]);
    store.set_offline(true);
    let ctx = AuctionContext::new(store.clone(), InMemoryPhaseStore::new_shared());

    assert_eq!(ctx.init()?, AuctionPhase::Paused);
    assert_eq!(ctx.connection.state(), ConnectionState::Disconnected);
    assert_eq!(ctx.cache.len(), 0);
    assert!(!ctx.subscription.is_installed());
    Ok(())
}

#[test]
fn reconnect_reloads_and_resubscribes() -> Result<()> {
    let h = Harness::new(&[item("A", 100, 50), item("B", 10, 10)])?;
    // items and golf scores each get a stream
    assert_eq!(h.store.subscribe_calls(), 2);

    h.store.set_offline(true);
    let mut follower = h.ctx.change_follower(POLL);
    follower.run_iteration()?; // subscribed
    follower.run_iteration()?; // closed
    assert_eq!(h.ctx.connection.state(), ConnectionState::Disconnected);

    // while we were away: B went and C arrived
    h.store.remove("B");
    h.store.seed(&[item("C", 40, 40)]);
    h.store.set_offline(false);

    let reconnector = h.ctx.reconnector(Duration::ZERO, POLL);
    reconnector.reconnect()?;

    assert_eq!(h.ctx.connection.state(), ConnectionState::Connected);
    assert_eq!(h.store.subscribe_calls(), 4);
    assert!(h.ctx.subscription.is_installed());
    assert!(h.ctx.score_subscription.is_installed());
    let mut ids: Vec<_> = h.ctx.cache.all().into_iter().map(|i| i.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["A".to_owned(), "C".to_owned()]);
    Ok(())
}

#[test]
fn failed_attempt_keeps_waiting_the_full_interval() -> Result<()> {
    let h = Harness::new(&[item("A", 100, 50)])?;
    h.store.set_offline(true);
    h.ctx.connection.mark_disconnected(&"test");

    let mut reconnector = h.ctx.reconnector(Duration::from_secs(3600), POLL);
    assert!(!reconnector.attempt_due());

    let reads = h.store.read_calls();
    reconnector.run_iteration()?;
    assert_eq!(h.store.read_calls(), reads);
    assert_eq!(h.ctx.connection.state(), ConnectionState::Disconnected);
    Ok(())
}

#[test]
fn loop_reconnects_once_due() -> Result<()> {
    let h = Harness::new(&[item("A", 100, 50)])?;
    h.ctx.connection.mark_disconnected(&"test");
    h.store.set_offline(true);

    let mut reconnector = h.ctx.reconnector(Duration::ZERO, POLL);
    reconnector.run_iteration()?;
    assert_eq!(h.ctx.connection.state(), ConnectionState::Disconnected);

    h.store.set_offline(false);
    reconnector.run_iteration()?;
    assert_eq!(h.ctx.connection.state(), ConnectionState::Connected);
    Ok(())
}

#[test]
fn reload_request_is_served_while_connected() -> Result<()> {
    let h = Harness::new(&[item("A", 100, 50)])?;
    h.store.seed(&[item("B", 20, 20)]);

    h.ctx.reconciler().on_store_event(ChangeEvent {
        kind: ChangeKind::Delete,
        new_record: json!({ "id": "X" }),
    });

    let mut reconnector = h.ctx.reconnector(Duration::from_secs(30), POLL);
    reconnector.run_iteration()?;

    assert_eq!(h.ctx.cache.len(), 2);
    assert!(!h.ctx.connection.take_reload_request());
    Ok(())
}

#[test]
fn teardown_drops_the_subscription() -> Result<()> {
    let h = Harness::new(&[item("A", 100, 50)])?;
    assert!(h.ctx.subscription.is_installed());

    h.ctx.teardown();

    assert!(!h.ctx.subscription.is_installed());
    assert!(!h.ctx.score_subscription.is_installed());
    assert_eq!(h.ctx.connection.state(), ConnectionState::Disconnected);
    // nothing left to deliver notices to
    h.store.broadcast(StoreNotice::Status(SubscriptionStatus::Closed));
    Ok(())
}
