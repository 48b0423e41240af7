//! Bid placement
//!
//! Takes one bid attempt from the user through local validation, the store
//! write, and reconciliation of the result. Nothing here guards against two
//! clients bidding concurrently: the store orders the writes and every client
//! converges on whatever the change stream reports.
use super::{Reconciler, SharedConnectionMonitor, SharedHistoryQueue};
use crate::{
    auction::{
        normalize::normalize_change,
        validate::{validate, validate_bidder, Rejection},
        AuctionItem, BidAttempt, BidHistoryRecord,
    },
    cache::SharedItemCache,
    phase::{current_phase, SharedPhaseStore},
    store::{BidPatch, SharedAuctionStore, StoreError},
};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BidError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BidError {
    /// What to tell the bidder
    ///
    /// Rejections explain themselves; store failures all collapse into one
    /// message, the details are only logged.
    pub fn user_message(&self) -> String {
        match self {
            BidError::Rejected(rejection) => rejection.to_string(),
            BidError::Store(StoreError::NotFound(_)) => {
                "This item is no longer available.".to_owned()
            }
            BidError::Store(_) => {
                "Failed to place bid: the auction database could not be reached. \
                 Please try again."
                    .to_owned()
            }
        }
    }
}

pub type BidOutcome = Result<AuctionItem, BidError>;

pub struct BidPlacement {
    store: SharedAuctionStore,
    cache: SharedItemCache,
    phase: SharedPhaseStore,
    reconciler: Reconciler,
    connection: SharedConnectionMonitor,
    history: SharedHistoryQueue,
}

impl BidPlacement {
    pub fn new(
        store: SharedAuctionStore,
        cache: SharedItemCache,
        phase: SharedPhaseStore,
        reconciler: Reconciler,
        connection: SharedConnectionMonitor,
        history: SharedHistoryQueue,
    ) -> Self {
        Self {
            store,
            cache,
            phase,
            reconciler,
            connection,
            history,
        }
    }

    pub fn place_bid(&self, attempt: BidAttempt) -> BidOutcome {
        // a stale id is rejected without a round-trip
        let item = self
            .cache
            .get(&attempt.item_id)
            .ok_or_else(|| Rejection::ItemNotFound(attempt.item_id.clone()))?;

        let phase = current_phase(&*self.phase);
        let amount = validate(&item, attempt.proposed_amount, phase)?;
        validate_bidder(&attempt.bidder)?;

        let patch = BidPatch {
            current_bid: amount,
            high_bidder: attempt.bidder.name.trim().to_owned(),
            table_number: attempt.bidder.table_number,
            updated_at: Utc::now(),
        };

        let stored = self.store.update(&item.id, &patch).map_err(|e| {
            warn!(error = %e, item_id = %item.id, amount, "bid placement failed");
            if e.is_connectivity() {
                self.connection.mark_disconnected(&e);
            }
            e
        })?;

        let change = normalize_change(stored).unwrap_or_else(|| {
            warn!(item_id = %item.id, "store returned an unusable record; applying our own patch");
            patch.as_change(&item.id)
        });
        let updated = self
            .reconciler
            .on_remote_change(change)
            .unwrap_or_else(|| item.merge(&patch.as_change(&item.id)));

        self.history.enqueue(BidHistoryRecord {
            item_id: item.id.clone(),
            item_title: item.title.clone(),
            previous_bid: item.current_bid,
            bid_amount: amount,
            bidder_name: patch.high_bidder.clone(),
            table_number: patch.table_number,
            created_at: patch.updated_at,
        });

        info!(
            item_id = %item.id,
            amount,
            table = patch.table_number,
            "bid placed"
        );
        Ok(updated)
    }
}
