//! Allocation errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by the allocation table and the allocators built on it.
///
/// Every variant is surfaced to the caller unmodified. Only
/// [`AllocError::LockTimeout`] is safe to retry automatically: it is raised
/// before the table is read, so no mutation can have happened.
#[derive(Debug, Error)]
pub enum AllocError {
    /// Explicit address is unparseable, outside the CIDR, or a network or
    /// broadcast address.
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Explicit address is already bound to a different key.
    #[error("address {address} in {namespace} is already held by {holder}")]
    AddressConflict {
        namespace: String,
        address: String,
        holder: String,
    },

    /// No free value left in the pool.
    #[error("pool {pool} of {namespace} is exhausted")]
    PoolExhausted { namespace: String, pool: String },

    /// The namespace lock could not be acquired in time.
    #[error("timed out after {waited:?} waiting for the lock on {namespace}")]
    LockTimeout { namespace: String, waited: Duration },

    /// The persisted table cannot be trusted. Never repaired automatically.
    #[error("allocation table {} is corrupt: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    /// The backing store is unreachable or unwritable.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CIDR or port range.
    #[error("invalid pool: {0}")]
    InvalidPool(String),

    /// Network or machine name that cannot be used as a path component.
    #[error("invalid namespace component {0:?}")]
    InvalidNamespace(String),

    /// Empty allocation key.
    #[error("invalid allocation key {0:?}")]
    InvalidKey(String),

    /// Endpoint hostname outside the network's DNS domain.
    #[error("hostname {hostname} does not belong to network DNS domain {domain}")]
    InvalidHostname { hostname: String, domain: String },

    /// A key holds a value that the requested pool no longer contains.
    #[error("{key} holds {value} in {namespace}, which is outside pool {pool}")]
    OutOfPool {
        namespace: String,
        key: String,
        value: String,
        pool: String,
    },
}

impl AllocError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the whole request may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAddress { .. } => "invalid_address",
            Self::AddressConflict { .. } => "address_conflict",
            Self::PoolExhausted { .. } => "pool_exhausted",
            Self::LockTimeout { .. } => "lock_timeout",
            Self::CorruptState { .. } => "corrupt_state",
            Self::Storage { .. } => "storage_error",
            Self::InvalidPool(_) => "invalid_pool",
            Self::InvalidNamespace(_) => "invalid_namespace",
            Self::InvalidKey(_) => "invalid_key",
            Self::InvalidHostname { .. } => "invalid_hostname",
            Self::OutOfPool { .. } => "out_of_pool",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_lock_timeout_is_retryable() {
        let timeout = AllocError::LockTimeout {
            namespace: "mesh".to_string(),
            waited: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());

        let exhausted = AllocError::PoolExhausted {
            namespace: "mesh".to_string(),
            pool: "10.0.0.0/30".to_string(),
        };
        assert!(!exhausted.is_retryable());

        let corrupt = AllocError::CorruptState {
            path: PathBuf::from("/tmp/ipam.json"),
            reason: "bad json".to_string(),
        };
        assert!(!corrupt.is_retryable());
    }

    #[test]
    fn test_exhausted_message_names_namespace_and_pool() {
        let err = AllocError::PoolExhausted {
            namespace: "mesh/m1".to_string(),
            pool: "12500-12502".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("mesh/m1"));
        assert!(message.contains("12500-12502"));
        assert_eq!(err.code(), "pool_exhausted");
    }
}
