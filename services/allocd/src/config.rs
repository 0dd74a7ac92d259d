use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use containerops_alloc::AllocatorConfig;

/// Service configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API listens on.
    pub listen_addr: SocketAddr,

    /// State directory; allocation tables live under `networks/`.
    pub state_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Lock behavior for every table.
    pub allocator: AllocatorConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("ALLOCD_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8600".to_string())
            .parse()
            .context("ALLOCD_LISTEN_ADDR must be a socket address (host:port).")?;

        let state_dir = std::env::var("ALLOCD_STATE_DIR")
            .map(PathBuf::from)
            .context("Missing state directory. Set ALLOCD_STATE_DIR.")?;

        let log_level = std::env::var("ALLOCD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let allocator = AllocatorConfig::from_env()?;

        Ok(Self {
            listen_addr,
            state_dir,
            log_level,
            allocator,
        })
    }

    /// Base directory of all allocation tables.
    pub fn networks_dir(&self) -> PathBuf {
        self.state_dir.join("networks")
    }
}
