use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Charity auction bidding board")]
pub struct Config {
    /// PostgreSQL connection string of the auction database.
    /// Without it an empty in-memory store is used.
    #[arg(long, env = "AUCTION_DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "AUCTION_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// JSON file holding the operator-controlled auction status
    #[arg(long, env = "AUCTION_STATUS_FILE", default_value = "auction-status.json")]
    pub status_file: PathBuf,

    /// Seconds between reconnection attempts while the store is unreachable
    #[arg(
        long,
        env = "AUCTION_RECONNECT_INTERVAL_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(10..=30)
    )]
    pub reconnect_interval_secs: u64,

    #[arg(long, env = "AUCTION_POOL_SIZE", default_value_t = 4)]
    pub pool_size: u32,

    #[arg(long, env = "AUCTION_CONNECT_TIMEOUT_SECS", default_value_t = 5)]
    pub connect_timeout_secs: u64,

    /// How long background loops block waiting for work
    #[arg(long, env = "AUCTION_POLL_TIMEOUT_MS", default_value_t = 1000)]
    pub poll_timeout_ms: u64,
}

impl Config {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
