//! Bid history audit trail
//!
//! Accepted bids are queued here and written to the store's history table in
//! the background. A failed write is logged and dropped: the bid itself
//! already stands and is never reverted because of it.
use super::LoopService;
use crate::{auction::BidHistoryRecord, store::SharedAuctionStore};
use anyhow::Result;
use parking_lot::{Condvar, Mutex};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tracing::{debug, warn};

#[derive(Default)]
pub struct HistoryQueue {
    pending: Mutex<VecDeque<BidHistoryRecord>>,
    condvar: Condvar,
}

pub type SharedHistoryQueue = Arc<HistoryQueue>;

impl HistoryQueue {
    pub fn new_shared() -> SharedHistoryQueue {
        Arc::new(Self::default())
    }

    pub fn enqueue(&self, record: BidHistoryRecord) {
        self.pending.lock().push_back(record);
        self.condvar.notify_one();
    }

    /// Next record to write, waiting up to `timeout` for one
    pub fn next(&self, timeout: Duration) -> Option<BidHistoryRecord> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            self.condvar.wait_for(&mut pending, timeout);
        }
        pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

pub struct BidHistoryWriter {
    store: SharedAuctionStore,
    queue: SharedHistoryQueue,
    poll_timeout: Duration,
}

impl BidHistoryWriter {
    pub fn new(store: SharedAuctionStore, queue: SharedHistoryQueue, poll_timeout: Duration) -> Self {
        Self {
            store,
            queue,
            poll_timeout,
        }
    }
}

impl LoopService for BidHistoryWriter {
    fn run_iteration(&mut self) -> Result<()> {
        let Some(record) = self.queue.next(self.poll_timeout) else {
            return Ok(());
        };

        match self.store.insert_bid_history(&record) {
            Ok(()) => debug!(item_id = %record.item_id, amount = record.bid_amount, "bid logged to history"),
            Err(e) => warn!(
                error = %e,
                item_id = %record.item_id,
                amount = record.bid_amount,
                "failed to log bid to history; the bid stands"
            ),
        }
        Ok(())
    }
}
