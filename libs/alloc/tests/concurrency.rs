//! Concurrent callers sharing one state directory.
//!
//! Every thread builds its own allocator, so each lock attempt uses its own
//! file descriptor, the same as independent processes would.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use containerops_alloc::{
    AllocError, AllocatorConfig, Ipam, Namespace, PortAllocator, TableStore,
};
use tempfile::TempDir;

#[test]
fn test_distinct_keys_get_distinct_ips() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().to_path_buf();
    let cidr = "10.7.0.0/27"; // 30 hosts
    let callers = 30;
    let barrier = Arc::new(Barrier::new(callers));

    let handles: Vec<_> = (0..callers)
        .map(|i| {
            let base = base.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let ipam = Ipam::new(TableStore::new(base, AllocatorConfig::default()));
                barrier.wait();
                ipam.allocate("mesh", &format!("host-{i}"), cidr, None, true)
                    .unwrap()
                    .unwrap()
            })
        })
        .collect();

    let ips: Vec<Ipv4Addr> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let unique: HashSet<_> = ips.iter().collect();
    assert_eq!(unique.len(), callers, "duplicate address handed out: {ips:?}");

    let ipam = Ipam::new(TableStore::new(&base, AllocatorConfig::default()));
    assert_eq!(ipam.list("mesh").unwrap().len(), callers);
}

#[test]
fn test_same_key_concurrently_gets_one_port() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().to_path_buf();
    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));

    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let base = base.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let ports = PortAllocator::new(TableStore::new(base, AllocatorConfig::default()));
                barrier.wait();
                ports
                    .allocate("mesh", "m1", "retry-me", (12500, 13000), true)
                    .unwrap()
            })
        })
        .collect();

    let ports: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ports.len(), 1);

    let allocator = PortAllocator::new(TableStore::new(&base, AllocatorConfig::default()));
    assert_eq!(allocator.list("mesh", "m1").unwrap().len(), 1);
}

#[test]
fn test_lock_timeout_does_not_mutate() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().to_path_buf();
    let namespace = Namespace::network("mesh").unwrap();

    let holder_store = TableStore::new(&base, AllocatorConfig::default());
    let handle = holder_store.open::<Ipv4Addr>(&namespace).unwrap();

    let impatient = Ipam::new(TableStore::new(
        &base,
        AllocatorConfig::default().with_lock_timeout(Duration::from_millis(50)),
    ));

    let err = handle
        .with_lock(|_| {
            Ok(impatient
                .allocate("mesh", "hostA", "10.2.57.0/24", None, true)
                .unwrap_err())
        })
        .unwrap();
    assert!(matches!(err, AllocError::LockTimeout { .. }));
    assert!(err.is_retryable());

    assert!(impatient.list("mesh").unwrap().is_empty());
    // Once the lock is free the retry succeeds.
    let retried = impatient
        .allocate("mesh", "hostA", "10.2.57.0/24", None, true)
        .unwrap();
    assert_eq!(retried, Some(Ipv4Addr::new(10, 2, 57, 1)));
}

#[test]
fn test_different_namespaces_do_not_contend() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().to_path_buf();

    let holder = TableStore::new(&base, AllocatorConfig::default())
        .open::<u16>(&Namespace::machine("mesh", "m1").unwrap())
        .unwrap();
    let other = PortAllocator::new(TableStore::new(
        &base,
        AllocatorConfig::default().with_lock_timeout(Duration::ZERO),
    ));

    let port = holder
        .with_lock(|_| {
            Ok(other
                .allocate("mesh", "m2", "h1", (12500, 12502), true)
                .unwrap())
        })
        .unwrap();
    assert_eq!(port, Some(12500));
}
