//! IPAM (IP Address Management) for overlay endpoints.
//!
//! Maps `(network, hostname)` to a unique IPv4 address inside the network's
//! CIDR. One table per network, since overlay addresses are network-global.

use std::net::Ipv4Addr;
use std::str::FromStr;

use tracing::{info, warn};

use crate::assign::{assign, release, validate_key};
use crate::error::AllocError;
use crate::namespace::Namespace;
use crate::pool::Ipv4Prefix;
use crate::table::{Allocation, AllocationTable, TableStore};

/// Overlay IP allocator.
#[derive(Debug, Clone)]
pub struct Ipam {
    store: TableStore,
}

impl Ipam {
    pub fn new(store: TableStore) -> Self {
        Self { store }
    }

    /// Ensure `hostname` has an address in `network`, or release it.
    ///
    /// - `present == false`: releases any address held by `hostname`.
    /// - `explicit_ip` set: binds exactly that address, which must be a host
    ///   address of `cidr` not held by another hostname.
    /// - otherwise: returns the existing address, or the lowest free one.
    pub fn allocate(
        &self,
        network: &str,
        hostname: &str,
        cidr: &str,
        explicit_ip: Option<&str>,
        present: bool,
    ) -> Result<Option<Ipv4Addr>, AllocError> {
        let namespace = Namespace::network(network)?;
        validate_key(hostname)?;
        let handle = self.store.open::<Ipv4Addr>(&namespace)?;

        if !present {
            release(&handle, hostname)?;
            return Ok(None);
        }

        let prefix = Ipv4Prefix::from_cidr(cidr)?;
        let explicit = explicit_ip
            .map(|ip| parse_explicit(ip, &prefix))
            .transpose()?;

        let ip = handle.with_lock(|table| match explicit {
            Some(ip) => bind_explicit(table, &namespace, hostname, ip),
            None => assign(table, &namespace, hostname, &prefix),
        })?;
        Ok(Some(ip))
    }

    /// Release the address held by `hostname`, returning it.
    pub fn release(&self, network: &str, hostname: &str) -> Result<Option<Ipv4Addr>, AllocError> {
        validate_key(hostname)?;
        let handle = self.store.open::<Ipv4Addr>(&Namespace::network(network)?)?;
        release(&handle, hostname)
    }

    /// Address currently bound to `hostname`, without allocating.
    pub fn lookup(&self, network: &str, hostname: &str) -> Result<Option<Ipv4Addr>, AllocError> {
        let handle = self.store.open::<Ipv4Addr>(&Namespace::network(network)?)?;
        handle.read(|table| table.get(hostname))
    }

    /// All bindings of a network, ordered by hostname.
    pub fn list(&self, network: &str) -> Result<Vec<(String, Allocation<Ipv4Addr>)>, AllocError> {
        self.store
            .open::<Ipv4Addr>(&Namespace::network(network)?)?
            .entries()
    }
}

fn parse_explicit(ip: &str, prefix: &Ipv4Prefix) -> Result<Ipv4Addr, AllocError> {
    let addr = Ipv4Addr::from_str(ip.trim()).map_err(|_| AllocError::InvalidAddress {
        address: ip.to_string(),
        reason: "not a dotted-quad IPv4 address".to_string(),
    })?;
    prefix.check_host(addr)?;
    Ok(addr)
}

fn bind_explicit(
    table: &mut AllocationTable<Ipv4Addr>,
    namespace: &Namespace,
    hostname: &str,
    ip: Ipv4Addr,
) -> Result<Ipv4Addr, AllocError> {
    if let Some(holder) = table.holder_of(ip) {
        if holder != hostname {
            warn!(
                namespace = %namespace,
                hostname,
                ip = %ip,
                holder,
                "Explicit address already in use"
            );
            return Err(AllocError::AddressConflict {
                namespace: namespace.to_string(),
                address: ip.to_string(),
                holder: holder.to_string(),
            });
        }
        return Ok(ip);
    }

    let previous = table.set(hostname, ip);
    info!(
        namespace = %namespace,
        hostname,
        ip = %ip,
        previous = ?previous,
        "Bound explicit address"
    );
    Ok(ip)
}
