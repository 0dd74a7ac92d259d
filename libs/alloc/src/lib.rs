//! Resource allocation for overlay network endpoints.
//!
//! This library assigns:
//! - Overlay IPv4 addresses per `(network, hostname)` ([`Ipam`])
//! - Underlay UDP ports per `(network, machine, hostname)` ([`PortAllocator`])
//!
//! Both are built on one primitive, a per-namespace [`AllocationTable`]
//! persisted as JSON and only reachable through [`TableHandle::with_lock`]
//! (or [`TableHandle::read`] for lookups).
//!
//! # Invariants
//!
//! - Within a namespace, keys and values are bound one-to-one
//! - Re-allocating an allocated key returns the same value
//! - Values always come from the requested pool
//! - A crash mid-write never leaves a partial table behind
//!
//! Callers may be separate processes sharing the state directory; the
//! namespace lock is the only serialization point.

mod assign;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod ipam;
mod lock;
pub mod namespace;
pub mod pool;
pub mod ports;
pub mod table;

pub use config::{AllocatorConfig, ConfigError};
pub use endpoint::{
    EndpointAllocation, EndpointAllocator, EndpointRequest, NetworkSpec,
    DEFAULT_UNDERLAY_PORT_RANGE,
};
pub use error::AllocError;
pub use ipam::Ipam;
pub use namespace::Namespace;
pub use pool::{Ipv4Prefix, Pool, PortRange};
pub use ports::PortAllocator;
pub use table::{Allocation, AllocationTable, TableHandle, TableStore, TableValue};
