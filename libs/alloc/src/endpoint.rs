//! Resource allocation for Nebula endpoints.
//!
//! An endpoint needs an overlay IP (always managed by IPAM, even when set
//! explicitly, so that uniqueness holds) and an underlay UDP port (managed
//! only when the caller does not supply one).

use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AllocatorConfig;
use crate::error::AllocError;
use crate::ipam::Ipam;
use crate::ports::PortAllocator;
use crate::table::TableStore;

/// Default underlay port range for encrypted UDP traffic.
pub const DEFAULT_UNDERLAY_PORT_RANGE: (u16, u16) = (12500, 13000);

fn default_underlay_port_range() -> (u16, u16) {
    DEFAULT_UNDERLAY_PORT_RANGE
}

/// Network settings relevant to allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Name of the network.
    pub name: String,

    /// Directory holding network state; tables live under `networks/`.
    pub state_dir: PathBuf,

    /// DNS domain every endpoint hostname must belong to.
    pub dns_domain: String,

    /// Overlay range in CIDR notation.
    pub cidr: String,

    /// Port range for endpoints that do not set their own underlay port.
    #[serde(default = "default_underlay_port_range")]
    pub underlay_port_range: (u16, u16),
}

impl NetworkSpec {
    /// Base directory of this network's allocation tables.
    pub fn networks_dir(&self) -> PathBuf {
        self.state_dir.join("networks")
    }
}

/// One endpoint allocation request.
#[derive(Debug, Clone, Copy)]
pub struct EndpointRequest<'a> {
    /// Endpoint hostname (DNS name within the network).
    pub hostname: &'a str,

    /// Machine the endpoint is deployed to.
    pub machine_id: &'a str,

    /// Explicit overlay IP.
    pub ip: Option<&'a str>,

    /// Caller-managed underlay port. `Some(0)` lets the kernel pick.
    pub underlay_port: Option<u16>,

    /// `false` tears the endpoint down and releases its resources.
    pub present: bool,
}

impl<'a> EndpointRequest<'a> {
    pub fn new(hostname: &'a str, machine_id: &'a str) -> Self {
        Self {
            hostname,
            machine_id,
            ip: None,
            underlay_port: None,
            present: true,
        }
    }

    pub fn with_ip(mut self, ip: &'a str) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_underlay_port(mut self, port: u16) -> Self {
        self.underlay_port = Some(port);
        self
    }

    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }
}

/// Resources assigned to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAllocation {
    pub ip: Ipv4Addr,
    pub underlay_port: u16,
}

/// Allocates IP and underlay port for endpoints of any network.
#[derive(Debug, Clone, Default)]
pub struct EndpointAllocator {
    config: AllocatorConfig,
}

impl EndpointAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    /// Allocate (or, with `present == false`, release) an endpoint's resources.
    pub fn allocate_endpoint(
        &self,
        network: &NetworkSpec,
        request: &EndpointRequest<'_>,
    ) -> Result<Option<EndpointAllocation>, AllocError> {
        if !request.hostname.ends_with(&network.dns_domain) {
            return Err(AllocError::InvalidHostname {
                hostname: request.hostname.to_string(),
                domain: network.dns_domain.clone(),
            });
        }

        let store = TableStore::new(network.networks_dir(), self.config);
        let ip = Ipam::new(store.clone()).allocate(
            &network.name,
            request.hostname,
            &network.cidr,
            request.ip,
            request.present,
        )?;

        let port = match request.underlay_port {
            Some(port) => Some(port),
            None => PortAllocator::new(store).allocate(
                &network.name,
                request.machine_id,
                request.hostname,
                network.underlay_port_range,
                request.present,
            )?,
        };

        let allocation = match (ip, port) {
            (Some(ip), Some(underlay_port)) if request.present => {
                Some(EndpointAllocation { ip, underlay_port })
            }
            _ => None,
        };

        debug!(
            network = %network.name,
            hostname = request.hostname,
            machine_id = request.machine_id,
            present = request.present,
            allocation = ?allocation,
            "Endpoint allocation complete"
        );
        Ok(allocation)
    }
}
