//! End-to-end allocation scenarios against a real state directory.

use std::fs;
use std::net::Ipv4Addr;

use containerops_alloc::{AllocError, AllocatorConfig, Ipam, PortAllocator, TableStore};
use tempfile::TempDir;

fn store(dir: &TempDir) -> TableStore {
    TableStore::new(dir.path().join("networks"), AllocatorConfig::default())
}

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

#[test]
fn test_ip_conflict_release_and_reuse() {
    let dir = TempDir::new().unwrap();
    let ipam = Ipam::new(store(&dir));
    let cidr = "10.2.57.0/24";

    let a = ipam.allocate("mesh", "hostA", cidr, None, true).unwrap();
    assert_eq!(a, Some(ip("10.2.57.1")));

    let err = ipam
        .allocate("mesh", "hostB", cidr, Some("10.2.57.1"), true)
        .unwrap_err();
    assert!(matches!(err, AllocError::AddressConflict { .. }));

    assert_eq!(ipam.allocate("mesh", "hostA", cidr, None, false).unwrap(), None);

    let b = ipam.allocate("mesh", "hostB", cidr, None, true).unwrap();
    assert_eq!(b, Some(ip("10.2.57.1")));

    let c = ipam.allocate("mesh", "hostC", cidr, None, true).unwrap();
    assert_eq!(c, Some(ip("10.2.57.2")));

    // hostA's old slot now belongs to hostB.
    let a_again = ipam.allocate("mesh", "hostA", cidr, None, true).unwrap();
    assert_eq!(a_again, Some(ip("10.2.57.3")));
}

#[test]
fn test_port_exhaustion_is_per_machine() {
    let dir = TempDir::new().unwrap();
    let ports = PortAllocator::new(store(&dir));
    let range = (12500, 12502);

    let assigned: Vec<_> = ["h1", "h2", "h3"]
        .iter()
        .map(|h| ports.allocate("mesh", "m1", h, range, true).unwrap())
        .collect();
    assert_eq!(assigned, vec![Some(12500), Some(12501), Some(12502)]);

    let err = ports.allocate("mesh", "m1", "h4", range, true).unwrap_err();
    match err {
        AllocError::PoolExhausted { namespace, pool } => {
            assert_eq!(namespace, "mesh/m1");
            assert_eq!(pool, "12500-12502");
        }
        other => panic!("expected PoolExhausted, got {other:?}"),
    }

    let other_machine = ports.allocate("mesh", "m2", "h1", range, true).unwrap();
    assert_eq!(other_machine, Some(12500));
}

#[test]
fn test_ip_exhaustion_after_pool_size_keys() {
    let dir = TempDir::new().unwrap();
    let ipam = Ipam::new(store(&dir));
    let cidr = "10.0.0.0/29"; // 6 hosts

    for i in 0..6 {
        let got = ipam
            .allocate("small", &format!("h{i}"), cidr, None, true)
            .unwrap();
        assert!(got.is_some());
    }

    let err = ipam.allocate("small", "h6", cidr, None, true).unwrap_err();
    assert!(matches!(err, AllocError::PoolExhausted { .. }));
    assert_eq!(ipam.list("small").unwrap().len(), 6);
}

#[test]
fn test_repeat_allocation_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let ipam = Ipam::new(store(&dir));
    let table = dir.path().join("networks/mesh/ipam.json");

    ipam.allocate("mesh", "hostA", "10.2.57.0/24", None, true)
        .unwrap();
    let before = fs::read(&table).unwrap();
    let modified = fs::metadata(&table).unwrap().modified().unwrap();

    let again = ipam
        .allocate("mesh", "hostA", "10.2.57.0/24", None, true)
        .unwrap();
    assert_eq!(again, Some(ip("10.2.57.1")));
    assert_eq!(fs::read(&table).unwrap(), before);
    assert_eq!(fs::metadata(&table).unwrap().modified().unwrap(), modified);
}

#[test]
fn test_table_file_schema() {
    let dir = TempDir::new().unwrap();
    let ports = PortAllocator::new(store(&dir));
    ports
        .allocate("mesh", "m1", "h1.mesh.internal", (12500, 13000), true)
        .unwrap();

    let raw = fs::read_to_string(dir.path().join("networks/mesh/ports/m1.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["version"], 1);
    assert_eq!(json["namespace"], "mesh/m1");
    assert_eq!(json["entries"]["h1.mesh.internal"]["value"], 12500);
    assert!(json["entries"]["h1.mesh.internal"]["allocated_at"].is_string());
}

#[test]
fn test_corrupt_table_blocks_namespace_only() {
    let dir = TempDir::new().unwrap();
    let ipam = Ipam::new(store(&dir));
    ipam.allocate("mesh", "hostA", "10.2.57.0/24", None, true)
        .unwrap();

    let table = dir.path().join("networks/mesh/ipam.json");
    fs::write(&table, "truncated {").unwrap();

    let err = ipam
        .allocate("mesh", "hostB", "10.2.57.0/24", None, true)
        .unwrap_err();
    assert!(matches!(err, AllocError::CorruptState { .. }));
    assert!(!err.is_retryable());
    assert_eq!(fs::read_to_string(&table).unwrap(), "truncated {");

    // Other networks are unaffected.
    let other = ipam
        .allocate("other", "hostB", "10.3.0.0/24", None, true)
        .unwrap();
    assert_eq!(other, Some(ip("10.3.0.1")));
}
