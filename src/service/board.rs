use super::LoopService;
use crate::{
    cache::SharedItemCache,
    render::{leaderboard, RenderRequest, SharedRenderSignal},
};
use anyhow::Result;
use std::time::Duration;
use tracing::debug;

/// Recomputes the ordered board whenever the cache signals a change
///
/// Stands in for the page's rendering; the HTTP surface serves the same
/// ordering on demand.
pub struct BoardRenderer {
    cache: SharedItemCache,
    render: SharedRenderSignal,
    poll_timeout: Duration,
}

impl BoardRenderer {
    pub fn new(cache: SharedItemCache, render: SharedRenderSignal, poll_timeout: Duration) -> Self {
        Self {
            cache,
            render,
            poll_timeout,
        }
    }
}

impl LoopService for BoardRenderer {
    fn run_iteration(&mut self) -> Result<()> {
        let Some(request) = self.render.wait(self.poll_timeout) else {
            return Ok(());
        };

        let board = leaderboard(self.cache.all());
        match request {
            RenderRequest::Full => debug!(items = board.len(), "board re-rendered"),
            RenderRequest::Items(changed) => {
                for id in &changed {
                    if let Some((rank, item)) = board.iter().enumerate().find(|(_, item)| &item.id == id) {
                        debug!(
                            item_id = %id,
                            rank = rank + 1,
                            current_bid = item.current_bid,
                            leader = %item.leading_label(),
                            "bid updated"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}
