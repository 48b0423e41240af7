//! Process-wide auction state
//!
//! Everything the bidding components share lives in one [`AuctionContext`];
//! components get the pieces they need injected when they are built.
use crate::{
    cache::{ItemCache, ScoreCache, SharedItemCache, SharedScoreCache},
    phase::{init_phase, AuctionPhase, SharedPhaseStore},
    render::{RenderSignal, SharedRenderSignal},
    service::{
        BidHistoryWriter, BidPlacement, BoardRenderer, ChangeFollower, ConnectionMonitor,
        GolfFollower, HistoryQueue, Reconciler, Reconnector, ScoreKeeper, ScoreReloader,
        SharedConnectionMonitor, SharedHistoryQueue, SharedSubscriptionSlot, SubscriptionSlot,
    },
    store::SharedAuctionStore,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub struct AuctionContext {
    pub store: SharedAuctionStore,
    pub phase: SharedPhaseStore,
    pub cache: SharedItemCache,
    pub render: SharedRenderSignal,
    pub connection: SharedConnectionMonitor,
    pub subscription: SharedSubscriptionSlot,
    pub history: SharedHistoryQueue,
    pub scores: SharedScoreCache,
    pub score_subscription: SharedSubscriptionSlot,
}

pub type SharedContext = Arc<AuctionContext>;

impl AuctionContext {
    pub fn new(store: SharedAuctionStore, phase: SharedPhaseStore) -> SharedContext {
        Arc::new(Self {
            store,
            phase,
            cache: ItemCache::new_shared(),
            render: RenderSignal::new_shared(),
            connection: ConnectionMonitor::new_shared(),
            subscription: SubscriptionSlot::new_shared(),
            history: HistoryQueue::new_shared(),
            scores: ScoreCache::new_shared(),
            score_subscription: SubscriptionSlot::new_shared(),
        })
    }

    /// Initialise the phase flag and make the first connection attempt
    ///
    /// Failing to reach the store is not an error here: the context is left
    /// disconnected and the reconnection loop takes over.
    pub fn init(&self) -> Result<AuctionPhase> {
        let phase = init_phase(&*self.phase).context("initialising auction status")?;
        info!(%phase, "current auction status");

        let reconnector = self.reconnector(Duration::ZERO, Duration::ZERO);
        match reconnector.reconnect() {
            Ok(()) => info!(
                items = self.cache.len(),
                teams = self.scores.len(),
                "auction items loaded"
            ),
            Err(e) => {
                reconnector.abandon(&e);
                warn!(error = %e, "unable to connect to the auction store; will keep retrying");
            }
        }
        Ok(phase)
    }

    /// Drop the subscriptions and forget the connection
    pub fn teardown(&self) {
        self.subscription.clear();
        self.score_subscription.clear();
        self.connection.mark_disconnected(&"shutting down");
        info!("auction context torn down");
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.cache.clone(), self.render.clone(), self.connection.clone())
    }

    pub fn bid_placement(&self) -> BidPlacement {
        BidPlacement::new(
            self.store.clone(),
            self.cache.clone(),
            self.phase.clone(),
            self.reconciler(),
            self.connection.clone(),
            self.history.clone(),
        )
    }

    pub fn reconnector(&self, interval: Duration, tick: Duration) -> Reconnector {
        Reconnector::new(
            self.store.clone(),
            self.reconciler(),
            self.score_reloader(),
            self.connection.clone(),
            self.subscription.clone(),
            self.score_subscription.clone(),
            interval,
            tick,
        )
    }

    pub fn change_follower(&self, poll_timeout: Duration) -> ChangeFollower {
        ChangeFollower::new(
            self.reconciler(),
            self.connection.clone(),
            self.subscription.clone(),
            poll_timeout,
        )
    }

    pub fn history_writer(&self, poll_timeout: Duration) -> BidHistoryWriter {
        BidHistoryWriter::new(self.store.clone(), self.history.clone(), poll_timeout)
    }

    pub fn board_renderer(&self, poll_timeout: Duration) -> BoardRenderer {
        BoardRenderer::new(self.cache.clone(), self.render.clone(), poll_timeout)
    }

    pub fn score_reloader(&self) -> ScoreReloader {
        ScoreReloader::new(self.scores.clone())
    }

    pub fn score_keeper(&self) -> ScoreKeeper {
        ScoreKeeper::new(self.store.clone(), self.score_reloader(), self.connection.clone())
    }

    pub fn golf_follower(&self, poll_timeout: Duration) -> GolfFollower {
        GolfFollower::new(
            self.store.clone(),
            self.score_reloader(),
            self.connection.clone(),
            self.score_subscription.clone(),
            poll_timeout,
        )
    }
}
