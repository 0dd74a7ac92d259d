//! Allocator configuration.

use std::time::Duration;

use thiserror::Error;

/// Default bound on waiting for a namespace lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay between lock attempts.
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

const LOCK_TIMEOUT_VAR: &str = "CONTAINEROPS_LOCK_TIMEOUT_MS";
const LOCK_POLL_VAR: &str = "CONTAINEROPS_LOCK_POLL_MS";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be an integer (milliseconds), got {value:?}")]
    InvalidMillis { var: &'static str, value: String },
}

/// Lock behavior shared by every table of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// How long a caller waits for a namespace lock before giving up.
    pub lock_timeout: Duration,

    /// Delay between non-blocking lock attempts.
    pub lock_poll_interval: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
        }
    }
}

impl AllocatorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lock_timeout = millis(&lookup, LOCK_TIMEOUT_VAR)?.unwrap_or(DEFAULT_LOCK_TIMEOUT);
        let lock_poll_interval = millis(&lookup, LOCK_POLL_VAR)?
            .unwrap_or(DEFAULT_LOCK_POLL_INTERVAL)
            .max(Duration::from_millis(1));

        Ok(Self {
            lock_timeout,
            lock_poll_interval,
        })
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

fn millis<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidMillis { var, value })
        })
        .transpose()
}
