//! Allocation namespaces and their on-disk layout.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::AllocError;

/// IP tables live at `{network}/ipam.json`.
const IPAM_FILE: &str = "ipam.json";

/// Port tables live at `{network}/ports/{machine}.json`.
const PORTS_DIR: &str = "ports";

/// Scope within which key -> value uniqueness is enforced.
///
/// IP addresses are network-global, so an IP namespace is just the network.
/// Ports are machine-local, so a port namespace is a network + machine pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    network: String,
    machine: Option<String>,
}

impl Namespace {
    /// Namespace for overlay IP addresses of a network.
    pub fn network(network: &str) -> Result<Self, AllocError> {
        validate_component(network)?;
        Ok(Self {
            network: network.to_string(),
            machine: None,
        })
    }

    /// Namespace for underlay ports of one machine in a network.
    pub fn machine(network: &str, machine: &str) -> Result<Self, AllocError> {
        validate_component(network)?;
        validate_component(machine)?;
        Ok(Self {
            network: network.to_string(),
            machine: Some(machine.to_string()),
        })
    }

    pub fn network_name(&self) -> &str {
        &self.network
    }

    pub fn machine_id(&self) -> Option<&str> {
        self.machine.as_deref()
    }

    /// Path of the table file below a base directory.
    pub(crate) fn table_path(&self, base_dir: &Path) -> PathBuf {
        let network_dir = base_dir.join(&self.network);
        match &self.machine {
            None => network_dir.join(IPAM_FILE),
            Some(machine) => network_dir.join(PORTS_DIR).join(format!("{machine}.json")),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.machine {
            None => write!(f, "{}", self.network),
            Some(machine) => write!(f, "{}/{}", self.network, machine),
        }
    }
}

/// Names become path components, so they must not escape the base directory.
fn validate_component(name: &str) -> Result<(), AllocError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(AllocError::InvalidNamespace(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_paths() {
        let base = Path::new("/var/lib/containerops/networks");

        let ip = Namespace::network("mesh").unwrap();
        assert_eq!(
            ip.table_path(base),
            PathBuf::from("/var/lib/containerops/networks/mesh/ipam.json")
        );

        let port = Namespace::machine("mesh", "edge-1.example.com").unwrap();
        assert_eq!(
            port.table_path(base),
            PathBuf::from("/var/lib/containerops/networks/mesh/ports/edge-1.example.com.json")
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Namespace::network("mesh").unwrap().to_string(), "mesh");
        assert_eq!(
            Namespace::machine("mesh", "m1").unwrap().to_string(),
            "mesh/m1"
        );
    }

    #[test]
    fn test_rejects_path_escapes() {
        for bad in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
            assert!(
                matches!(Namespace::network(bad), Err(AllocError::InvalidNamespace(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(Namespace::machine("mesh", "../etc").is_err());
        assert!(Namespace::network("mesh-1.internal").is_ok());
    }
}
