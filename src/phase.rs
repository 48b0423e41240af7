//! Auction phase
//!
//! The operator-controlled flag deciding whether bids are accepted at all.
//! It is persisted outside the process, and read fresh for every bid.
mod file;
mod in_memory;

pub use self::{file::*, in_memory::*};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::{info, warn};

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_PAUSED: &str = "paused";
pub const STATUS_NOT_STARTED: &str = "not-started";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuctionPhase {
    NotStarted,
    Active,
    #[default]
    Paused,
}

impl AuctionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            AuctionPhase::NotStarted => STATUS_NOT_STARTED,
            AuctionPhase::Active => STATUS_ACTIVE,
            AuctionPhase::Paused => STATUS_PAUSED,
        }
    }

    /// Interpret a persisted status value
    ///
    /// Anything that is neither `active` nor `paused` means the auction
    /// hasn't been started.
    pub fn from_stored(value: &str) -> Self {
        match value.trim() {
            STATUS_ACTIVE => AuctionPhase::Active,
            STATUS_PAUSED => AuctionPhase::Paused,
            _ => AuctionPhase::NotStarted,
        }
    }
}

impl fmt::Display for AuctionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the raw `auctionStatus` value lives
pub trait PhaseStore {
    fn load_raw(&self) -> Result<Option<String>>;
    fn store_raw(&self, value: &str) -> Result<()>;

    fn load(&self) -> Result<Option<AuctionPhase>> {
        Ok(self.load_raw()?.as_deref().map(AuctionPhase::from_stored))
    }

    fn store(&self, phase: AuctionPhase) -> Result<()> {
        self.store_raw(phase.as_str())?;
        info!(%phase, "auction status changed");
        Ok(())
    }
}

pub type SharedPhaseStore = Arc<dyn PhaseStore + Send + Sync + 'static>;

/// Phase to gate a bid with, read right now
///
/// An unset phase reads as paused, and so does a store we can't read.
pub fn current_phase(store: &dyn PhaseStore) -> AuctionPhase {
    match store.load() {
        Ok(phase) => phase.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "failed to read auction status; treating auction as paused");
            AuctionPhase::Paused
        }
    }
}

/// Make sure a phase is persisted, writing `paused` on first run
pub fn init_phase(store: &dyn PhaseStore) -> Result<AuctionPhase> {
    Ok(match store.load()? {
        Some(phase) => phase,
        None => {
            store.store(AuctionPhase::Paused)?;
            AuctionPhase::Paused
        }
    })
}
