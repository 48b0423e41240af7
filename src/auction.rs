use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod normalize;
pub mod validate;

pub type ItemId = String;
pub type ItemIdRef<'s> = &'s str;
pub type Amount = u64;
pub type TableNumber = u32;

pub const DEFAULT_TITLE: &str = "Unnamed Item";
pub const DEFAULT_DESCRIPTION: &str = "No description available";
pub const DEFAULT_CATEGORY: &str = "Uncategorized";
pub const NO_BIDDER: &str = "-";

/// An auction item in its canonical shape
///
/// Only ever produced by [`normalize`] (from store records) or by merging an
/// [`ItemChange`] into an existing item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionItem {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub starting_price: Amount,
    pub current_bid: Amount,
    pub high_bidder: String,
    pub table_number: Option<TableNumber>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AuctionItem {
    /// Apply `change` over `self`: every field present in the change wins
    pub fn merge(&self, change: &ItemChange) -> Self {
        Self {
            id: self.id.clone(),
            title: change.title.clone().unwrap_or_else(|| self.title.clone()),
            description: change
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            category: change
                .category
                .clone()
                .unwrap_or_else(|| self.category.clone()),
            starting_price: change.starting_price.unwrap_or(self.starting_price),
            current_bid: change.current_bid.unwrap_or(self.current_bid),
            high_bidder: change
                .high_bidder
                .clone()
                .unwrap_or_else(|| self.high_bidder.clone()),
            table_number: change.table_number.or(self.table_number),
            updated_at: change.updated_at.or(self.updated_at),
        }
        .settled()
    }

    /// Label of whoever leads the bidding, for display
    pub fn leading_label(&self) -> String {
        match self.table_number {
            Some(table) if self.high_bidder != NO_BIDDER => format!("Table {table}"),
            _ => self.high_bidder.clone(),
        }
    }

    // current bid never drops under the floor
    fn settled(mut self) -> Self {
        if self.current_bid < self.starting_price {
            self.current_bid = self.starting_price;
        }
        self
    }
}

/// A (possibly partial) normalized record about one item
///
/// `None` fields mean "not reported", so merging leaves them alone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemChange {
    pub id: ItemId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub starting_price: Option<Amount>,
    pub current_bid: Option<Amount>,
    pub high_bidder: Option<String>,
    pub table_number: Option<TableNumber>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ItemChange {
    /// Materialize a full item, filling in the display defaults
    pub fn into_item(self) -> AuctionItem {
        let starting_price = self.starting_price.unwrap_or(0);
        AuctionItem {
            id: self.id,
            title: self.title.unwrap_or_else(|| DEFAULT_TITLE.to_owned()),
            description: self
                .description
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_owned()),
            category: self.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_owned()),
            starting_price,
            current_bid: self.current_bid.unwrap_or(starting_price),
            high_bidder: self.high_bidder.unwrap_or_else(|| NO_BIDDER.to_owned()),
            table_number: self.table_number,
            updated_at: self.updated_at,
        }
        .settled()
    }
}

impl From<AuctionItem> for ItemChange {
    fn from(item: AuctionItem) -> Self {
        Self {
            id: item.id,
            title: Some(item.title),
            description: Some(item.description),
            category: Some(item.category),
            starting_price: Some(item.starting_price),
            current_bid: Some(item.current_bid),
            high_bidder: Some(item.high_bidder),
            table_number: item.table_number,
            updated_at: item.updated_at,
        }
    }
}

/// Who is bidding
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidderContext {
    pub name: String,
    pub table_number: TableNumber,
}

/// A single user bid submission; consumed by the bid placement service
#[derive(Clone, Debug, PartialEq)]
pub struct BidAttempt {
    pub item_id: ItemId,
    pub proposed_amount: f64,
    pub bidder: BidderContext,
}

/// One line of the append-only bid history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidHistoryRecord {
    pub item_id: ItemId,
    pub item_title: String,
    pub previous_bid: Amount,
    pub bid_amount: Amount,
    pub bidder_name: String,
    pub table_number: TableNumber,
    pub created_at: DateTime<Utc>,
}
