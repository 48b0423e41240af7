mod golf;
mod phase;
mod reconnect;

use crate::{
    auction::{AuctionItem, BidAttempt, BidderContext, ItemChange, NO_BIDDER},
    context::{AuctionContext, SharedContext},
    phase::{AuctionPhase, InMemoryPhaseStore, PhaseStore},
    store::InMemoryAuctionStore,
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};

pub const POLL: Duration = Duration::from_millis(10);

pub fn item(id: &str, current_bid: u64, starting_price: u64) -> AuctionItem {
    AuctionItem {
        id: id.to_owned(),
        title: format!("Item {id}"),
        description: "A fine donated item".to_owned(),
        category: "Experiences".to_owned(),
        starting_price,
        current_bid,
        high_bidder: NO_BIDDER.to_owned(),
        table_number: None,
        updated_at: None,
    }
}

pub fn bid(id: &str, amount: f64) -> BidAttempt {
    BidAttempt {
        item_id: id.to_owned(),
        proposed_amount: amount,
        bidder: BidderContext {
            name: "Alice".to_owned(),
            table_number: 4,
        },
    }
}

pub fn bid_change(id: &str, current_bid: u64) -> ItemChange {
    ItemChange {
        id: id.to_owned(),
        current_bid: Some(current_bid),
        ..Default::default()
    }
}

/// An initialised context over an in-memory store
pub struct Harness {
    pub store: Arc<InMemoryAuctionStore>,
    pub ctx: SharedContext,
}

impl Harness {
    /// Items seeded, context initialised, auction left paused
    pub fn new(items: &[AuctionItem]) -> Result<Self> {
        let store = Arc::new(InMemoryAuctionStore::new());
        store.seed(items);
        let ctx = AuctionContext::new(store.clone(), InMemoryPhaseStore::new_shared());
        ctx.init()?;
        Ok(Self { store, ctx })
    }

    pub fn active(items: &[AuctionItem]) -> Result<Self> {
        let harness = Self::new(items)?;
        harness.ctx.phase.store(AuctionPhase::Active)?;
        Ok(harness)
    }
}
