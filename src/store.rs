//! Remote auction store
//!
//! The hosted database holding the authoritative auction items. It is the
//! single serialization point for bids: concurrent updates from different
//! clients each succeed, and whatever the store accepted last is the value
//! every client converges to through the change stream.
mod in_memory;
mod postgres;

pub use self::{in_memory::*, postgres::*};

use crate::{
    auction::{
        normalize::RawItem, Amount, BidHistoryRecord, ItemChange, ItemId, ItemIdRef, TableNumber,
    },
    golf::{normalize::RawGolfScore, GrossScore, NewGolfScore, ScoreIdRef},
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use thiserror::Error;

pub const AUCTION_ITEMS_TABLE: &str = "auction_items";
pub const BID_HISTORY_TABLE: &str = "bid_history";
pub const GOLF_SCORES_TABLE: &str = "golf_scores";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),
    #[error("store rejected our credentials: {0}")]
    Unauthorized(String),
    #[error("no item with id {0}")]
    NotFound(ItemId),
    #[error("malformed store record: {0}")]
    Malformed(String),
    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Whether this failure means we lost the store, as opposed to the store
    /// refusing one particular request
    pub fn is_connectivity(&self) -> bool {
        matches!(self, StoreError::Unreachable(_) | StoreError::Unauthorized(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ItemOrder {
    #[default]
    CurrentBidDesc,
    Unordered,
}

/// Filter/order of an item read
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemQuery {
    pub order: ItemOrder,
    pub limit: Option<usize>,
}

impl ItemQuery {
    /// Everything, highest bids first
    pub fn all() -> Self {
        Self::default()
    }

    /// Cheapest read that still proves the store answers
    pub fn single() -> Self {
        Self {
            order: ItemOrder::Unordered,
            limit: Some(1),
        }
    }
}

/// The fields a bid writes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidPatch {
    pub current_bid: Amount,
    pub high_bidder: String,
    pub table_number: TableNumber,
    pub updated_at: DateTime<Utc>,
}

impl BidPatch {
    /// The patch as a change to item `id`
    pub fn as_change(&self, id: ItemIdRef) -> ItemChange {
        ItemChange {
            id: id.to_owned(),
            current_bid: Some(self.current_bid),
            high_bidder: Some(self.high_bidder.clone()),
            table_number: Some(self.table_number),
            updated_at: Some(self.updated_at),
            ..Default::default()
        }
    }
}

/// What a score submission writes over an existing team row
#[derive(Clone, Debug, PartialEq)]
pub struct ScorePatch {
    pub gross_score: GrossScore,
    /// Left as stored when `None`
    pub handicap: Option<f64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn from_operation(op: &str) -> Option<Self> {
        match op.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Subscribed,
    Closed,
    ChannelError,
}

/// One row change; the record is as loose as the table it came from
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub new_record: Value,
}

/// Something the change stream told us
#[derive(Clone, Debug, PartialEq)]
pub enum StoreNotice {
    Status(SubscriptionStatus),
    Change(ChangeEvent),
}

/// A live change-stream subscription
pub trait Subscription: Send {
    /// Wait up to `timeout` (forever on `None`) for the next notice
    fn poll(&mut self, timeout: Option<Duration>) -> StoreResult<Option<StoreNotice>>;
}

pub type OwnedSubscription = Box<dyn Subscription + 'static>;

pub trait AuctionStore {
    fn read(&self, query: &ItemQuery) -> StoreResult<Vec<RawItem>>;

    /// Write `patch` to item `id`, returning the record as stored
    fn update(&self, id: ItemIdRef, patch: &BidPatch) -> StoreResult<RawItem>;

    fn subscribe(&self, table: &str, kinds: &[ChangeKind]) -> StoreResult<OwnedSubscription>;

    fn insert_bid_history(&self, record: &BidHistoryRecord) -> StoreResult<()>;

    /// Bid history of one item, newest first
    fn read_bid_history(&self, item_id: ItemIdRef) -> StoreResult<Vec<BidHistoryRecord>>;

    fn read_golf_scores(&self) -> StoreResult<Vec<RawGolfScore>>;

    /// Overwrite the score of team row `id`, returning the row as stored
    fn update_golf_score(&self, id: ScoreIdRef, patch: &ScorePatch) -> StoreResult<RawGolfScore>;

    fn insert_golf_score(&self, score: &NewGolfScore) -> StoreResult<RawGolfScore>;

    fn test_connection(&self) -> StoreResult<()> {
        self.read(&ItemQuery::single()).map(|_| ())
    }
}

pub type SharedAuctionStore = Arc<dyn AuctionStore + Send + Sync + 'static>;
