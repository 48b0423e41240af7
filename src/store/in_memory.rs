use super::*;
use parking_lot::{Condvar, Mutex};
use serde_json::Map;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Weak,
    },
};

type Row = Map<String, Value>;

/// Fake in-memory store.
///
/// Rows are kept as loose JSON objects, the way the hosted store returns them,
/// so the normalization boundary gets exercised. Supports switching the store
/// "offline" and failing particular calls, and counts calls, which is what
/// unit-tests need.
#[derive(Default)]
pub struct InMemoryAuctionStore {
    rows: Mutex<Vec<Row>>,
    golf_rows: Mutex<Vec<Row>>,
    next_golf_id: AtomicUsize,
    history: Mutex<Vec<BidHistoryRecord>>,
    subscribers: Mutex<Vec<Weak<Channel>>>,
    offline: AtomicBool,
    fail_next_update: Mutex<Option<StoreError>>,
    fail_history: AtomicBool,
    read_calls: AtomicUsize,
    update_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
}

impl InMemoryAuctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedAuctionStore {
        Arc::new(Self::new())
    }

    /// Add items as well-formed rows
    pub fn seed(&self, items: &[crate::auction::AuctionItem]) {
        let mut rows = self.rows.lock();
        for item in items {
            if let Ok(Value::Object(row)) = serde_json::to_value(RawItem::from(item)) {
                rows.push(row);
            }
        }
    }

    /// Add a row as-is, however malformed
    pub fn insert_raw(&self, row: Value) {
        if let Value::Object(row) = row {
            self.rows.lock().push(row);
        }
    }

    /// Add golf team rows; derived columns are left for the reader to compute
    pub fn seed_golf(&self, scores: &[crate::golf::GolfScore]) {
        let mut rows = self.golf_rows.lock();
        for score in scores {
            let raw = RawGolfScore {
                net_score: None,
                ..RawGolfScore::from(score)
            };
            if let Ok(Value::Object(row)) = serde_json::to_value(raw) {
                rows.push(row);
            }
        }
    }

    /// Drop a row without telling subscribers
    pub fn remove(&self, id: ItemIdRef) {
        self.rows.lock().retain(|row| row_id(row).as_deref() != Some(id));
    }

    /// Deliver a notice to every live subscriber, as the real change stream would
    pub fn broadcast(&self, notice: StoreNotice) {
        for channel in self.live_channels() {
            channel.push(notice.clone());
        }
    }

    fn broadcast_change(&self, table: &str, event: ChangeEvent) {
        for channel in self.live_channels() {
            if channel.table == table {
                channel.push(StoreNotice::Change(event.clone()));
            }
        }
    }

    fn live_channels(&self) -> Vec<Arc<Channel>> {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|channel| channel.strong_count() > 0);
        subscribers.iter().filter_map(Weak::upgrade).collect()
    }

    /// Lose (or regain) the connection; live subscriptions are told they closed
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        if offline {
            self.broadcast(StoreNotice::Status(SubscriptionStatus::Closed));
        }
    }

    pub fn fail_next_update(&self, error: StoreError) {
        *self.fail_next_update.lock() = Some(error);
    }

    pub fn fail_history_inserts(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn history(&self) -> Vec<BidHistoryRecord> {
        self.history.lock().clone()
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("in-memory store is offline".to_owned()));
        }
        Ok(())
    }
}

fn row_id(row: &Row) -> Option<String> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn row_bid(row: &Row) -> f64 {
    match row.get("current_bid") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn to_raw<T: for<'de> serde::Deserialize<'de>>(row: &Row) -> StoreResult<T> {
    serde_json::from_value(Value::Object(row.clone()))
        .map_err(|e| StoreError::Malformed(e.to_string()))
}

impl AuctionStore for InMemoryAuctionStore {
    fn read(&self, query: &ItemQuery) -> StoreResult<Vec<RawItem>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        let mut rows = self.rows.lock().clone();
        if query.order == ItemOrder::CurrentBidDesc {
            rows.sort_by(|a, b| row_bid(b).total_cmp(&row_bid(a)));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows.iter().map(to_raw).collect()
    }

    fn update(&self, id: ItemIdRef, patch: &BidPatch) -> StoreResult<RawItem> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        if let Some(e) = self.fail_next_update.lock().take() {
            return Err(e);
        }

        let row = {
            let mut rows = self.rows.lock();
            let row = rows
                .iter_mut()
                .find(|row| row_id(row).as_deref() == Some(id))
                .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;

            row.insert("current_bid".into(), Value::from(patch.current_bid));
            row.insert("high_bidder".into(), Value::from(patch.high_bidder.clone()));
            row.insert("table_number".into(), Value::from(patch.table_number));
            row.insert("updated_at".into(), Value::from(patch.updated_at.to_rfc3339()));
            row.clone()
        };

        self.broadcast_change(
            AUCTION_ITEMS_TABLE,
            ChangeEvent {
                kind: ChangeKind::Update,
                new_record: Value::Object(row.clone()),
            },
        );
        to_raw(&row)
    }

    fn subscribe(&self, table: &str, kinds: &[ChangeKind]) -> StoreResult<OwnedSubscription> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;

        let channel = Arc::new(Channel {
            table: table.to_owned(),
            kinds: kinds.to_vec(),
            ..Default::default()
        });
        channel.push(StoreNotice::Status(SubscriptionStatus::Subscribed));
        self.subscribers.lock().push(Arc::downgrade(&channel));
        Ok(Box::new(InMemorySubscription { channel }))
    }

    fn insert_bid_history(&self, record: &BidHistoryRecord) -> StoreResult<()> {
        self.ensure_online()?;
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(StoreError::Other(format!(
                "permission denied for table {BID_HISTORY_TABLE}"
            )));
        }
        self.history.lock().push(record.clone());
        Ok(())
    }

    fn read_bid_history(&self, item_id: ItemIdRef) -> StoreResult<Vec<BidHistoryRecord>> {
        self.ensure_online()?;
        let mut records: Vec<_> = self
            .history
            .lock()
            .iter()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect();
        records.reverse();
        Ok(records)
    }

    fn read_golf_scores(&self) -> StoreResult<Vec<RawGolfScore>> {
        self.ensure_online()?;
        self.golf_rows.lock().iter().map(to_raw).collect()
    }

    fn update_golf_score(&self, id: ScoreIdRef, patch: &ScorePatch) -> StoreResult<RawGolfScore> {
        self.ensure_online()?;

        let row = {
            let mut rows = self.golf_rows.lock();
            let row = rows
                .iter_mut()
                .find(|row| row_id(row).as_deref() == Some(id))
                .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;

            row.insert("gross_score".into(), Value::from(patch.gross_score));
            if let Some(handicap) = patch.handicap {
                row.insert("handicap".into(), Value::from(handicap));
            }
            row.clone()
        };

        self.broadcast_change(
            GOLF_SCORES_TABLE,
            ChangeEvent {
                kind: ChangeKind::Update,
                new_record: Value::Object(row.clone()),
            },
        );
        to_raw(&row)
    }

    fn insert_golf_score(&self, score: &NewGolfScore) -> StoreResult<RawGolfScore> {
        self.ensure_online()?;

        let id = self.next_golf_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut row = Row::new();
        row.insert("id".into(), Value::from(format!("team-{id}")));
        row.insert("team_name".into(), Value::from(score.team_name.clone()));
        row.insert("gross_score".into(), Value::from(score.gross_score));
        row.insert("handicap".into(), Value::from(score.handicap));
        self.golf_rows.lock().push(row.clone());

        self.broadcast_change(
            GOLF_SCORES_TABLE,
            ChangeEvent {
                kind: ChangeKind::Insert,
                new_record: Value::Object(row.clone()),
            },
        );
        to_raw(&row)
    }
}

#[derive(Default)]
struct Channel {
    table: String,
    kinds: Vec<ChangeKind>,
    queue: Mutex<VecDeque<StoreNotice>>,
    condvar: Condvar,
}

impl Channel {
    fn push(&self, notice: StoreNotice) {
        if let StoreNotice::Change(ref event) = notice {
            if !self.kinds.contains(&event.kind) {
                return;
            }
        }
        self.queue.lock().push_back(notice);
        self.condvar.notify_all();
    }
}

pub struct InMemorySubscription {
    channel: Arc<Channel>,
}

impl Subscription for InMemorySubscription {
    fn poll(&mut self, timeout: Option<Duration>) -> StoreResult<Option<StoreNotice>> {
        let mut queue = self.channel.queue.lock();
        if queue.is_empty() {
            match timeout {
                Some(timeout) => {
                    self.channel.condvar.wait_for(&mut queue, timeout);
                }
                None => self.channel.condvar.wait(&mut queue),
            }
        }
        Ok(queue.pop_front())
    }
}
