//! Golf score board
//!
//! Scores are few and change rarely, so there is no merging here: any change
//! on the table reloads the whole board.
use super::{LoopService, SharedConnectionMonitor, SharedSubscriptionSlot};
use crate::{
    cache::SharedScoreCache,
    golf::{
        find_team,
        normalize::{normalize_score, normalize_scores},
        team_names, validate_submission, GolfScore, NewGolfScore, ScoreRejection,
        ScoreSubmission,
    },
    store::{
        AuctionStore, ScorePatch, SharedAuctionStore, StoreError, StoreNotice, StoreResult,
        SubscriptionStatus,
    },
};
use anyhow::Result;
use std::{thread, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ScoreReloader {
    cache: SharedScoreCache,
}

impl ScoreReloader {
    pub fn new(cache: SharedScoreCache) -> Self {
        Self { cache }
    }

    pub fn reload(&self, store: &dyn AuctionStore) -> StoreResult<usize> {
        let scores = normalize_scores(store.read_golf_scores()?);
        let count = scores.len();
        self.cache.replace_all(scores);
        debug!(teams = count, "reloaded golf scores");
        Ok(count)
    }
}

/// Reloads the board on every change notice from the golf table
pub struct GolfFollower {
    store: SharedAuctionStore,
    reloader: ScoreReloader,
    connection: SharedConnectionMonitor,
    subscription: SharedSubscriptionSlot,
    poll_timeout: Duration,
}

impl GolfFollower {
    pub fn new(
        store: SharedAuctionStore,
        reloader: ScoreReloader,
        connection: SharedConnectionMonitor,
        subscription: SharedSubscriptionSlot,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            store,
            reloader,
            connection,
            subscription,
            poll_timeout,
        }
    }

    fn lose_stream(&self, reason: &dyn std::fmt::Display) {
        self.subscription.clear();
        self.connection.mark_disconnected(reason);
    }
}

impl LoopService for GolfFollower {
    fn run_iteration(&mut self) -> Result<()> {
        match self.subscription.poll(self.poll_timeout) {
            None => thread::sleep(self.poll_timeout),
            Some(Ok(None)) => {}
            Some(Ok(Some(StoreNotice::Status(SubscriptionStatus::Subscribed)))) => {
                debug!("golf score stream subscribed");
            }
            Some(Ok(Some(StoreNotice::Status(status)))) => {
                self.lose_stream(&format!("golf score stream status {status:?}"));
            }
            Some(Ok(Some(StoreNotice::Change(event)))) => {
                debug!(kind = ?event.kind, "golf scores changed");
                if let Err(e) = self.reloader.reload(&*self.store) {
                    warn!(error = %e, "failed to reload golf scores");
                    if e.is_connectivity() {
                        self.lose_stream(&e);
                    }
                }
            }
            Some(Err(e)) => self.lose_stream(&e),
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    #[error(transparent)]
    Rejected(#[from] ScoreRejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScoreError {
    pub fn user_message(&self) -> String {
        match self {
            ScoreError::Rejected(rejection) => rejection.to_string(),
            ScoreError::Store(StoreError::NotFound(_)) => {
                "This team is no longer on the board.".to_owned()
            }
            ScoreError::Store(_) => "Failed to save score to database. Please try again.".to_owned(),
        }
    }
}

/// Takes score cards in and writes them to the team's row
///
/// A team the store doesn't know yet gets a new row, provided a handicap
/// came with the card.
pub struct ScoreKeeper {
    store: SharedAuctionStore,
    reloader: ScoreReloader,
    connection: SharedConnectionMonitor,
}

impl ScoreKeeper {
    pub fn new(
        store: SharedAuctionStore,
        reloader: ScoreReloader,
        connection: SharedConnectionMonitor,
    ) -> Self {
        Self {
            store,
            reloader,
            connection,
        }
    }

    fn store_failed(&self, e: StoreError) -> StoreError {
        warn!(error = %e, "golf score store call failed");
        if e.is_connectivity() {
            self.connection.mark_disconnected(&e);
        }
        e
    }

    pub fn submit(&self, submission: ScoreSubmission) -> Result<GolfScore, ScoreError> {
        validate_submission(&submission)?;

        // resolve the team against the store, not the possibly stale board
        let scores = normalize_scores(
            self.store
                .read_golf_scores()
                .map_err(|e| self.store_failed(e))?,
        );

        let stored = match (find_team(&scores, &submission.team_name), submission.handicap) {
            (Some(team), handicap) => self.store.update_golf_score(
                &team.id,
                &ScorePatch {
                    gross_score: submission.gross_score,
                    handicap,
                },
            ),
            (None, Some(handicap)) => self.store.insert_golf_score(&NewGolfScore {
                team_name: submission.team_name.trim().to_owned(),
                gross_score: submission.gross_score,
                handicap,
            }),
            (None, None) => {
                return Err(ScoreRejection::UnknownTeam {
                    team: submission.team_name.trim().to_owned(),
                    available: team_names(&scores).join(", "),
                }
                .into())
            }
        }
        .map_err(|e| self.store_failed(e))?;

        let score = normalize_score(stored).ok_or_else(|| {
            StoreError::Malformed("stored golf score has no id or team".to_owned())
        })?;

        if let Err(e) = self.reloader.reload(&*self.store) {
            warn!(error = %e, "score saved but the board could not be reloaded");
        }
        info!(team = %score.team_name, gross = ?score.gross_score, "golf score saved");
        Ok(score)
    }
}
