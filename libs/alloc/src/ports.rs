//! Underlay UDP port allocation.
//!
//! Ports are a machine-local resource, so each `(network, machine)` pair has
//! its own table and the same port may be handed out on different machines.
//! There is no explicit-port path: callers that want a fixed port bypass the
//! allocator entirely.

use crate::assign::{assign, release, validate_key};
use crate::error::AllocError;
use crate::namespace::Namespace;
use crate::pool::PortRange;
use crate::table::{Allocation, TableStore};

/// Underlay port allocator.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    store: TableStore,
}

impl PortAllocator {
    pub fn new(store: TableStore) -> Self {
        Self { store }
    }

    /// Ensure `hostname` on `machine_id` has a port in `port_range`, or
    /// release it when `present` is false.
    pub fn allocate(
        &self,
        network: &str,
        machine_id: &str,
        hostname: &str,
        port_range: (u16, u16),
        present: bool,
    ) -> Result<Option<u16>, AllocError> {
        let namespace = Namespace::machine(network, machine_id)?;
        validate_key(hostname)?;
        let handle = self.store.open::<u16>(&namespace)?;

        if !present {
            release(&handle, hostname)?;
            return Ok(None);
        }

        let range = PortRange::try_from(port_range)?;
        let port = handle.with_lock(|table| assign(table, &namespace, hostname, &range))?;
        Ok(Some(port))
    }

    /// Port currently bound to `hostname` on `machine_id`, without allocating.
    pub fn lookup(
        &self,
        network: &str,
        machine_id: &str,
        hostname: &str,
    ) -> Result<Option<u16>, AllocError> {
        let handle = self
            .store
            .open::<u16>(&Namespace::machine(network, machine_id)?)?;
        handle.read(|table| table.get(hostname))
    }

    /// Release the port held by `hostname` on `machine_id`, returning it.
    pub fn release(
        &self,
        network: &str,
        machine_id: &str,
        hostname: &str,
    ) -> Result<Option<u16>, AllocError> {
        validate_key(hostname)?;
        let handle = self
            .store
            .open::<u16>(&Namespace::machine(network, machine_id)?)?;
        release(&handle, hostname)
    }

    /// All bindings on one machine, ordered by hostname.
    pub fn list(
        &self,
        network: &str,
        machine_id: &str,
    ) -> Result<Vec<(String, Allocation<u16>)>, AllocError> {
        self.store
            .open::<u16>(&Namespace::machine(network, machine_id)?)?
            .entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocatorConfig;
    use tempfile::{tempdir, TempDir};

    fn ports() -> (TempDir, PortAllocator) {
        let dir = tempdir().unwrap();
        let store = TableStore::new(dir.path(), AllocatorConfig::default());
        (dir, PortAllocator::new(store))
    }

    #[test]
    fn test_same_host_same_port() {
        let (_dir, ports) = ports();
        let first = ports.allocate("mesh", "m1", "h1", (12500, 13000), true).unwrap();
        let second = ports.allocate("mesh", "m1", "h1", (12500, 13000), true).unwrap();
        assert_eq!(first, Some(12500));
        assert_eq!(first, second);
    }

    #[test]
    fn test_release_frees_port() {
        let (_dir, ports) = ports();
        ports.allocate("mesh", "m1", "h1", (12500, 12501), true).unwrap();
        ports.allocate("mesh", "m1", "h2", (12500, 12501), true).unwrap();

        assert_eq!(ports.allocate("mesh", "m1", "h1", (12500, 12501), false).unwrap(), None);
        assert_eq!(ports.lookup("mesh", "m1", "h1").unwrap(), None);

        let h3 = ports.allocate("mesh", "m1", "h3", (12500, 12501), true).unwrap();
        assert_eq!(h3, Some(12500));
    }

    #[test]
    fn test_release_returns_held_port() {
        let (dir, ports) = ports();
        ports.allocate("mesh", "m1", "h1", (12500, 12501), true).unwrap();

        assert_eq!(ports.release("mesh", "m1", "h1").unwrap(), Some(12500));
        assert_eq!(ports.release("mesh", "m1", "h1").unwrap(), None);

        // Looking up an unused machine leaves no trace on disk.
        assert_eq!(ports.lookup("mesh", "m9", "h1").unwrap(), None);
        assert!(!dir.path().join("mesh/ports/m9.json.lock").exists());
    }

    #[test]
    fn test_invalid_range() {
        let (_dir, ports) = ports();
        let err = ports
            .allocate("mesh", "m1", "h1", (13000, 12500), true)
            .unwrap_err();
        assert!(matches!(err, AllocError::InvalidPool(_)));
    }

    #[test]
    fn test_invalid_machine_id() {
        let (_dir, ports) = ports();
        let err = ports
            .allocate("mesh", "../m1", "h1", (12500, 13000), true)
            .unwrap_err();
        assert!(matches!(err, AllocError::InvalidNamespace(_)));
    }

    #[test]
    fn test_list_is_per_machine() {
        let (_dir, ports) = ports();
        ports.allocate("mesh", "m1", "h1", (12500, 13000), true).unwrap();
        ports.allocate("mesh", "m2", "h2", (12500, 13000), true).unwrap();

        let m1 = ports.list("mesh", "m1").unwrap();
        assert_eq!(m1.len(), 1);
        assert_eq!(m1[0].0, "h1");
        assert_eq!(m1[0].1.value, 12500);
    }
}
