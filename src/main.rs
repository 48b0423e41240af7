mod auction;
mod cache;
mod config;
mod context;
mod golf;
mod phase;
mod render;
mod service;
mod store;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::parse();

    let store: store::SharedAuctionStore = match &config.database_url {
        Some(url) => Arc::new(store::PostgresAuctionStore::connect(
            url,
            config.pool_size,
            config.connect_timeout(),
        )?),
        None => {
            warn!("no database configured; using an empty in-memory store");
            store::InMemoryAuctionStore::new_shared()
        }
    };
    let phase_store = phase::FilePhaseStore::new_shared(&config.status_file);

    let ctx = context::AuctionContext::new(store, phase_store);
    ctx.init()?;

    let svc_ctr = service::ServiceControl::new();

    ctrlc::set_handler({
        let svc_ctr = svc_ctr.clone();
        move || {
            eprintln!("Stopping all services...");
            svc_ctr.stop_all();
        }
    })?;

    let poll = config.poll_timeout();
    for handle in vec![
        svc_ctr.spawn_loop(
            "reconnect",
            ctx.reconnector(config.reconnect_interval(), poll),
        ),
        svc_ctr.spawn_loop("change-follower", ctx.change_follower(poll)),
        svc_ctr.spawn_loop("golf-follower", ctx.golf_follower(poll)),
        svc_ctr.spawn_loop("bid-history", ctx.history_writer(poll)),
        svc_ctr.spawn_loop("board", ctx.board_renderer(poll)),
        svc_ctr.spawn_loop("ui", service::Ui::new(ctx.clone(), config.listen)?),
    ] {
        handle.join()?
    }

    ctx.teardown();

    Ok(())
}

#[cfg(test)]
mod tests;
