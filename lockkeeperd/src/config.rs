use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

/// Startup parameters for `lockkeeperd` (not part of the core's data
/// model — the core itself only ever sees shard counts and durations).
#[derive(Debug, Parser)]
#[command(name = "lockkeeperd", about = "Named-lock coordination daemon")]
pub struct Config {
    /// Address the HTTP listener binds to.
    #[arg(long, env = "LOCKKEEPERD_LISTEN_ADDR", default_value = "127.0.0.1:7656")]
    pub listen_addr: SocketAddr,

    /// Number of shards in the flat-key locker group.
    #[arg(long, env = "LOCKKEEPERD_KEY_SHARDS", default_value_t = 1024)]
    pub key_shards: usize,

    /// Number of shards in the hierarchical-path locker group.
    #[arg(long, env = "LOCKKEEPERD_PATH_SHARDS", default_value_t = 4096)]
    pub path_shards: usize,

    /// Upper bound a per-request timeout is clamped to.
    #[arg(long, env = "LOCKKEEPERD_MAX_TIMEOUT_SECS", default_value_t = 60)]
    pub max_timeout_secs: u64,

    /// Log output format.
    #[arg(long, env = "LOCKKEEPERD_LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Config {
    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}
