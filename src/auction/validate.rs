//! Bid validation
//!
//! Pure checks run against the cached item snapshot before anything is sent
//! to the store.
use super::*;
use crate::phase::AuctionPhase;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("auction paused")]
    AuctionPaused,
    #[error("auction not started")]
    AuctionNotStarted,
    #[error("invalid amount")]
    InvalidAmount,
    #[error("bid too low: your bid must be higher than the current bid of €{current}")]
    TooLow { current: Amount },
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),
    #[error("missing bidder name")]
    MissingBidder,
    #[error("invalid table number")]
    InvalidTableNumber,
}

/// Amounts at or above this don't fit the store's signed 64-bit columns
const AMOUNT_CEILING: f64 = i64::MAX as f64;

/// Decide whether `proposed` is an acceptable bid on `item` during `phase`
///
/// Checks run in a fixed order: phase, amount sanity, then amount against the
/// current bid. On success returns the amount rounded to whole units, which is
/// what gets written to the store.
pub fn validate(item: &AuctionItem, proposed: f64, phase: AuctionPhase) -> Result<Amount, Rejection> {
    match phase {
        AuctionPhase::Paused => return Err(Rejection::AuctionPaused),
        AuctionPhase::NotStarted => return Err(Rejection::AuctionNotStarted),
        AuctionPhase::Active => {}
    }

    if !proposed.is_finite() || proposed <= 0.0 {
        return Err(Rejection::InvalidAmount);
    }
    let rounded = proposed.round();
    if rounded < 1.0 || rounded >= AMOUNT_CEILING {
        return Err(Rejection::InvalidAmount);
    }
    let amount = rounded as Amount;

    if amount <= item.current_bid {
        return Err(Rejection::TooLow {
            current: item.current_bid,
        });
    }

    Ok(amount)
}

/// Check that the bidder can be identified
pub fn validate_bidder(bidder: &BidderContext) -> Result<(), Rejection> {
    if bidder.name.trim().is_empty() {
        return Err(Rejection::MissingBidder);
    }
    if bidder.table_number == 0 {
        return Err(Rejection::InvalidTableNumber);
    }
    Ok(())
}
