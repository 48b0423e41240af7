//! Store connection tracking and the reconnection loop
use super::{LoopService, Reconciler, ScoreReloader};
use crate::store::{
    ChangeKind, OwnedSubscription, SharedAuctionStore, StoreNotice, StoreResult,
    AUCTION_ITEMS_TABLE, GOLF_SCORES_TABLE,
};
use anyhow::Result;
use parking_lot::Mutex;
use std::{
    fmt,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// Change kinds the subscriptions ask for
pub const SUBSCRIBED_CHANGES: &[ChangeKind] =
    &[ChangeKind::Update, ChangeKind::Insert, ChangeKind::Delete];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

struct MonitorState {
    state: ConnectionState,
    since: Instant,
    reload_requested: bool,
}

/// Where we stand with the store
///
/// Starts out disconnected; only a completed (re)connection flips it.
pub struct ConnectionMonitor {
    inner: Mutex<MonitorState>,
}

pub type SharedConnectionMonitor = Arc<ConnectionMonitor>;

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self {
            inner: Mutex::new(MonitorState {
                state: ConnectionState::Disconnected,
                since: Instant::now(),
                reload_requested: false,
            }),
        }
    }
}

impl ConnectionMonitor {
    pub fn new_shared() -> SharedConnectionMonitor {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// How long we've been in the current state
    pub fn state_age(&self) -> Duration {
        self.inner.lock().since.elapsed()
    }

    pub fn mark_connected(&self) {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connected {
            info!("connected to the auction store");
            inner.state = ConnectionState::Connected;
            inner.since = Instant::now();
        }
    }

    pub fn mark_disconnected(&self, reason: &dyn fmt::Display) {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Disconnected {
            warn!(%reason, "lost connection to the auction store");
            inner.state = ConnectionState::Disconnected;
            inner.since = Instant::now();
        }
    }

    /// Ask for the cache to be reloaded from the store
    pub fn request_reload(&self) {
        self.inner.lock().reload_requested = true;
    }

    pub fn take_reload_request(&self) -> bool {
        std::mem::take(&mut self.inner.lock().reload_requested)
    }
}

/// Holds the live change-stream subscription, if any
///
/// Filled by (re)connection, drained by the change follower.
#[derive(Default)]
pub struct SubscriptionSlot {
    subscription: Mutex<Option<OwnedSubscription>>,
}

pub type SharedSubscriptionSlot = Arc<SubscriptionSlot>;

impl SubscriptionSlot {
    pub fn new_shared() -> SharedSubscriptionSlot {
        Arc::new(Self::default())
    }

    pub fn install(&self, subscription: OwnedSubscription) {
        *self.subscription.lock() = Some(subscription);
    }

    pub fn clear(&self) {
        *self.subscription.lock() = None;
    }

    pub fn is_installed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Poll the installed subscription; `None` when there is none
    pub fn poll(&self, timeout: Duration) -> Option<StoreResult<Option<StoreNotice>>> {
        self.subscription
            .lock()
            .as_mut()
            .map(|subscription| subscription.poll(Some(timeout)))
    }
}

/// Re-establishes the store connection after it was lost
///
/// While disconnected, tries again every `interval` (one fixed value for the
/// whole process lifetime). A successful attempt resubscribes to the change
/// streams and reloads the items and golf scores. While connected it also
/// serves pending full-reload requests.
pub struct Reconnector {
    store: SharedAuctionStore,
    reconciler: Reconciler,
    scores: ScoreReloader,
    connection: SharedConnectionMonitor,
    subscription: SharedSubscriptionSlot,
    score_subscription: SharedSubscriptionSlot,
    interval: Duration,
    tick: Duration,
    last_attempt: Option<Instant>,
}

impl Reconnector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: SharedAuctionStore,
        reconciler: Reconciler,
        scores: ScoreReloader,
        connection: SharedConnectionMonitor,
        subscription: SharedSubscriptionSlot,
        score_subscription: SharedSubscriptionSlot,
        interval: Duration,
        tick: Duration,
    ) -> Self {
        Self {
            store,
            reconciler,
            scores,
            connection,
            subscription,
            score_subscription,
            interval,
            tick,
            last_attempt: None,
        }
    }

    /// One connection attempt: check, resubscribe, reload
    ///
    /// Subscribing comes first: a write landing between the two is then
    /// either in the reload or delivered by the stream, never lost.
    pub fn reconnect(&self) -> StoreResult<()> {
        self.store.test_connection()?;
        let items = self.store.subscribe(AUCTION_ITEMS_TABLE, SUBSCRIBED_CHANGES)?;
        self.subscription.install(items);
        let scores = self.store.subscribe(GOLF_SCORES_TABLE, SUBSCRIBED_CHANGES)?;
        self.score_subscription.install(scores);

        let loaded = self.reconciler.reload(&*self.store)?;
        let teams = self.scores.reload(&*self.store)?;
        self.connection.mark_connected();
        debug!(items = loaded, teams, "store connection established");
        Ok(())
    }

    /// Undo a failed attempt
    pub fn abandon(&self, reason: &dyn fmt::Display) {
        self.subscription.clear();
        self.score_subscription.clear();
        self.connection.mark_disconnected(reason);
    }

    /// Whether the fixed retry interval has passed
    pub fn attempt_due(&self) -> bool {
        let since_disconnect = self.connection.state_age();
        let since_attempt = self
            .last_attempt
            .map(|t| t.elapsed())
            .unwrap_or(Duration::MAX);
        since_disconnect >= self.interval && since_attempt >= self.interval
    }

    fn serve_reload_request(&self) {
        if !self.connection.take_reload_request() {
            return;
        }
        if let Err(e) = self.reconciler.reload(&*self.store) {
            warn!(error = %e, "requested reload failed");
            if e.is_connectivity() {
                self.connection.mark_disconnected(&e);
            }
        }
    }
}

impl LoopService for Reconnector {
    fn run_iteration(&mut self) -> Result<()> {
        if self.connection.is_connected() {
            self.serve_reload_request();
            thread::sleep(self.tick);
            return Ok(());
        }

        if !self.attempt_due() {
            thread::sleep(self.tick);
            return Ok(());
        }

        self.last_attempt = Some(Instant::now());
        info!("attempting to reconnect to the auction store");
        match self.reconnect() {
            Ok(()) => info!(items = self.reconciler.cached_len(), "reconnected to the auction store"),
            Err(e) => {
                self.abandon(&e);
                warn!(error = %e, retry_in = ?self.interval, "reconnect failed");
            }
        }
        Ok(())
    }
}
