//! Pool-agnostic assignment on a locked table.

use tracing::info;

use crate::error::AllocError;
use crate::namespace::Namespace;
use crate::pool::Pool;
use crate::table::{AllocationTable, TableHandle, TableValue};

/// Lowest pool value not bound to any key.
pub(crate) fn first_free<P: Pool>(table: &AllocationTable<P::Value>, pool: &P) -> Option<P::Value> {
    let taken = table.values();
    pool.values().find(|v| !taken.contains(v))
}

/// Return the value bound to `key`, binding the first free one if absent.
pub(crate) fn assign<P: Pool>(
    table: &mut AllocationTable<P::Value>,
    namespace: &Namespace,
    key: &str,
    pool: &P,
) -> Result<P::Value, AllocError> {
    if let Some(existing) = table.get(key) {
        if !pool.contains(existing) {
            return Err(AllocError::OutOfPool {
                namespace: namespace.to_string(),
                key: key.to_string(),
                value: existing.to_string(),
                pool: pool.to_string(),
            });
        }
        return Ok(existing);
    }

    let value = first_free(table, pool).ok_or_else(|| AllocError::PoolExhausted {
        namespace: namespace.to_string(),
        pool: pool.to_string(),
    })?;
    table.set(key, value);

    info!(
        namespace = %namespace,
        key,
        value = %value,
        allocated = table.len(),
        pool_size = pool.size(),
        "Allocated from pool"
    );
    Ok(value)
}

/// Unbind `key` under the namespace lock. Releasing an unbound key is a no-op.
pub(crate) fn release<V: TableValue>(
    handle: &TableHandle<V>,
    key: &str,
) -> Result<Option<V>, AllocError> {
    let released = handle.with_lock(|table| Ok(table.remove(key)))?;
    if let Some(value) = released {
        info!(namespace = %handle.namespace(), key, value = %value, "Released allocation");
    }
    Ok(released)
}

pub(crate) fn validate_key(key: &str) -> Result<(), AllocError> {
    if key.trim().is_empty() {
        return Err(AllocError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocatorConfig;
    use crate::pool::PortRange;
    use crate::table::TableStore;
    use tempfile::tempdir;

    #[test]
    fn test_assign_fills_gaps_in_ascending_order() {
        let dir = tempdir().unwrap();
        let ns = Namespace::machine("mesh", "m1").unwrap();
        let handle = TableStore::new(dir.path(), AllocatorConfig::default())
            .open::<u16>(&ns)
            .unwrap();
        let range = PortRange::new(100, 104).unwrap();

        let ports = handle
            .with_lock(|table| {
                table.set("manual", 101);
                let a = assign(table, &ns, "a", &range)?;
                let b = assign(table, &ns, "b", &range)?;
                Ok((a, b))
            })
            .unwrap();
        assert_eq!(ports, (100, 102));
    }

    #[test]
    fn test_assign_rejects_value_outside_shrunk_pool() {
        let dir = tempdir().unwrap();
        let ns = Namespace::machine("mesh", "m1").unwrap();
        let handle = TableStore::new(dir.path(), AllocatorConfig::default())
            .open::<u16>(&ns)
            .unwrap();

        handle
            .with_lock(|table| assign(table, &ns, "a", &PortRange::new(200, 210).unwrap()))
            .unwrap();

        let err = handle
            .with_lock(|table| assign(table, &ns, "a", &PortRange::new(100, 110).unwrap()))
            .unwrap_err();
        assert!(matches!(err, AllocError::OutOfPool { .. }));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("host.mesh.internal").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("   ").is_err());
    }
}
