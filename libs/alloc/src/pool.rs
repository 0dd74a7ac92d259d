//! Pools of assignable values.
//!
//! The IP and port allocators differ only in their pool: an IPv4 prefix
//! (minus network and broadcast addresses) or an inclusive port range.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::AllocError;
use crate::table::TableValue;

/// A finite, ordered set of assignable values.
pub trait Pool: fmt::Display {
    type Value: TableValue;

    /// Whether `value` may be assigned from this pool.
    fn contains(&self, value: Self::Value) -> bool;

    /// Every assignable value in ascending order.
    fn values(&self) -> impl Iterator<Item = Self::Value> + '_;

    /// Number of assignable values.
    fn size(&self) -> u64;
}

/// IPv4 prefix for IPAM allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Prefix {
    /// Base (network) address of the prefix.
    pub address: Ipv4Addr,

    /// Prefix length (e.g., 24 for /24).
    pub prefix_len: u8,
}

impl Ipv4Prefix {
    /// Create a new prefix.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, AllocError> {
        if prefix_len > 32 {
            return Err(AllocError::InvalidPool(format!(
                "prefix length {} exceeds 32",
                prefix_len
            )));
        }

        Ok(Self {
            address: mask_ipv4(address, prefix_len),
            prefix_len,
        })
    }

    /// Parse from CIDR notation (e.g., "10.2.57.0/24").
    pub fn from_cidr(s: &str) -> Result<Self, AllocError> {
        let Some((addr_str, prefix_str)) = s.split_once('/') else {
            return Err(AllocError::InvalidPool(format!(
                "missing '/' in CIDR: {}",
                s
            )));
        };

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| AllocError::InvalidPool(format!("invalid network address: {}", addr_str)))?;

        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| AllocError::InvalidPool(format!("invalid prefix length: {}", prefix_str)))?;

        Self::new(address, prefix_len)
    }

    /// Check if an address is within this prefix.
    pub fn contains_addr(&self, addr: Ipv4Addr) -> bool {
        mask_ipv4(addr, self.prefix_len) == self.address
    }

    /// Network address (all host bits zero).
    pub fn network(&self) -> Ipv4Addr {
        self.address
    }

    /// Broadcast address (all host bits one).
    pub fn broadcast(&self) -> Ipv4Addr {
        let span = (self.block_size() - 1) as u32;
        Ipv4Addr::from(u32::from(self.address) | span)
    }

    /// Number of addresses in the prefix, including network and broadcast.
    pub fn block_size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }

    /// First and last host addresses, if the prefix has any.
    fn host_bounds(&self) -> Option<(u32, u32)> {
        if self.block_size() <= 2 {
            return None;
        }
        Some((
            u32::from(self.network()) + 1,
            u32::from(self.broadcast()) - 1,
        ))
    }

    /// Validate an explicitly requested host address.
    pub fn check_host(&self, addr: Ipv4Addr) -> Result<(), AllocError> {
        let reason = if !self.contains_addr(addr) {
            Some(format!("not in {}", self))
        } else if addr == self.network() {
            Some(format!("network address of {}", self))
        } else if addr == self.broadcast() {
            Some(format!("broadcast address of {}", self))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(AllocError::InvalidAddress {
                address: addr.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl Pool for Ipv4Prefix {
    type Value = Ipv4Addr;

    fn contains(&self, value: Ipv4Addr) -> bool {
        self.check_host(value).is_ok()
    }

    fn values(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.host_bounds()
            .into_iter()
            .flat_map(|(first, last)| (first..=last).map(Ipv4Addr::from))
    }

    fn size(&self) -> u64 {
        self.block_size().saturating_sub(2)
    }
}

/// Mask an IPv4 address to a prefix length.
fn mask_ipv4(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let bits = u32::from(addr);
    let mask = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len.min(32)))
    };
    Ipv4Addr::from(bits & mask)
}

/// Inclusive UDP port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    low: u16,
    high: u16,
}

impl PortRange {
    /// Create a range. Port 0 is reserved for kernel-assigned ports.
    pub fn new(low: u16, high: u16) -> Result<Self, AllocError> {
        if low == 0 {
            return Err(AllocError::InvalidPool(
                "port range must not include port 0".to_string(),
            ));
        }
        if low > high {
            return Err(AllocError::InvalidPool(format!(
                "port range {}-{} is inverted",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> u16 {
        self.low
    }

    pub fn high(&self) -> u16 {
        self.high
    }
}

impl TryFrom<(u16, u16)> for PortRange {
    type Error = AllocError;

    fn try_from((low, high): (u16, u16)) -> Result<Self, Self::Error> {
        Self::new(low, high)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

impl Pool for PortRange {
    type Value = u16;

    fn contains(&self, value: u16) -> bool {
        (self.low..=self.high).contains(&value)
    }

    fn values(&self) -> impl Iterator<Item = u16> + '_ {
        self.low..=self.high
    }

    fn size(&self) -> u64 {
        u64::from(self.high - self.low) + 1
    }
}
