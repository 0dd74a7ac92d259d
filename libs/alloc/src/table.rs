//! Persistent, lock-protected allocation tables.
//!
//! One JSON file per namespace maps keys to assigned values. All access goes
//! through [`TableHandle::with_lock`], which:
//! - Takes the namespace's exclusive lock (a sibling `.lock` file)
//! - Loads the table, runs the caller's closure on it
//! - Persists mutations atomically (write to temp, fsync, rename)
//! - Releases the lock on every exit path

use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::fs::{self, File};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AllocatorConfig;
use crate::error::AllocError;
use crate::lock::LockGuard;
use crate::namespace::Namespace;

/// Persisted table file format version.
const TABLE_VERSION: u32 = 1;

/// Values that can be stored in an allocation table.
pub trait TableValue:
    Copy + Ord + Debug + std::fmt::Display + Serialize + DeserializeOwned
{
}

impl<T> TableValue for T where
    T: Copy + Ord + Debug + std::fmt::Display + Serialize + DeserializeOwned
{
}

/// A value bound to a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation<V> {
    pub value: V,
    pub allocated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedTable<V> {
    version: u32,
    namespace: String,
    entries: BTreeMap<String, Allocation<V>>,
}

/// In-memory view of one namespace's table.
///
/// Only reachable inside [`TableHandle::with_lock`].
#[derive(Debug, Clone)]
pub struct AllocationTable<V> {
    entries: BTreeMap<String, Allocation<V>>,
    dirty: bool,
}

impl<V: TableValue> AllocationTable<V> {
    fn new(entries: BTreeMap<String, Allocation<V>>) -> Self {
        Self {
            entries,
            dirty: false,
        }
    }

    /// Value bound to `key`, if any.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|a| a.value)
    }

    pub fn allocation(&self, key: &str) -> Option<&Allocation<V>> {
        self.entries.get(key)
    }

    /// Bind `key` to `value`, returning the previous value.
    ///
    /// Rebinding a key to the value it already holds is a no-op and keeps the
    /// original `allocated_at`.
    pub fn set(&mut self, key: &str, value: V) -> Option<V> {
        if let Some(existing) = self.entries.get(key) {
            if existing.value == value {
                return Some(value);
            }
        }

        self.dirty = true;
        self.entries
            .insert(
                key.to_string(),
                Allocation {
                    value,
                    allocated_at: Utc::now(),
                },
            )
            .map(|a| a.value)
    }

    /// Unbind `key`, returning the value it held.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let removed = self.entries.remove(key).map(|a| a.value);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Key currently holding `value`, if any.
    pub fn holder_of(&self, value: V) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, a)| a.value == value)
            .map(|(k, _)| k.as_str())
    }

    /// All bound values.
    pub fn values(&self) -> BTreeSet<V> {
        self.entries.values().map(|a| a.value).collect()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Allocation<V>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Root of all namespace tables.
#[derive(Debug, Clone)]
pub struct TableStore {
    base_dir: PathBuf,
    config: AllocatorConfig,
}

impl TableStore {
    pub fn new(base_dir: impl Into<PathBuf>, config: AllocatorConfig) -> Self {
        Self {
            base_dir: base_dir.into(),
            config,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Locate the table of a namespace. Nothing is created on disk until
    /// the first [`TableHandle::with_lock`].
    pub fn open<V: TableValue>(&self, namespace: &Namespace) -> Result<TableHandle<V>, AllocError> {
        let path = namespace.table_path(&self.base_dir);
        Ok(TableHandle {
            namespace: namespace.clone(),
            lock_path: sibling(&path, "lock"),
            tmp_path: sibling(&path, "tmp"),
            path,
            config: self.config,
            _value: PhantomData,
        })
    }
}

/// First value bound to two keys, as `(first key, second key, value)`.
fn duplicate_binding<V: TableValue>(
    entries: &BTreeMap<String, Allocation<V>>,
) -> Option<(&str, &str, V)> {
    let mut holders = BTreeMap::new();
    for (key, allocation) in entries {
        if let Some(first) = holders.insert(allocation.value, key.as_str()) {
            return Some((first, key.as_str(), allocation.value));
        }
    }
    None
}

/// `ipam.json` -> `ipam.json.{suffix}`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Handle to one namespace's table.
#[derive(Debug)]
pub struct TableHandle<V> {
    namespace: Namespace,
    path: PathBuf,
    lock_path: PathBuf,
    tmp_path: PathBuf,
    config: AllocatorConfig,
    _value: PhantomData<fn() -> V>,
}

impl<V: TableValue> TableHandle<V> {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on the table while holding the namespace lock.
    ///
    /// Mutations are persisted only if `f` succeeds. The closure is never
    /// invoked unless the lock is held.
    pub fn with_lock<T, F>(&self, f: F) -> Result<T, AllocError>
    where
        F: FnOnce(&mut AllocationTable<V>) -> Result<T, AllocError>,
    {
        self.ensure_dir()?;
        let _guard = self.lock()?;
        let mut table = self.load()?;
        let out = f(&mut table)?;
        if table.is_dirty() {
            if let Some((holder, key, value)) = duplicate_binding(&table.entries) {
                warn!(
                    namespace = %self.namespace,
                    value = %value,
                    holder,
                    key,
                    "Refusing to save a value bound to two keys"
                );
                return Err(AllocError::AddressConflict {
                    namespace: self.namespace.to_string(),
                    address: value.to_string(),
                    holder: holder.to_string(),
                });
            }
            self.save(&table)?;
        }
        Ok(out)
    }

    /// Run a read-only `f` on the table.
    ///
    /// A namespace without a table file reads as empty and is left
    /// untouched on disk; otherwise the table is read under the lock.
    pub fn read<T, F>(&self, f: F) -> Result<T, AllocError>
    where
        F: FnOnce(&AllocationTable<V>) -> T,
    {
        if !self.path.exists() {
            return Ok(f(&AllocationTable::new(BTreeMap::new())));
        }

        let _guard = self.lock()?;
        let table = self.load()?;
        Ok(f(&table))
    }

    /// Snapshot of all entries, ordered by key.
    pub fn entries(&self) -> Result<Vec<(String, Allocation<V>)>, AllocError> {
        self.read(|table| {
            table
                .iter()
                .map(|(k, a)| (k.clone(), a.clone()))
                .collect()
        })
    }

    fn ensure_dir(&self) -> Result<(), AllocError> {
        match self.path.parent() {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|e| AllocError::storage(parent, e))
            }
            None => Ok(()),
        }
    }

    fn lock(&self) -> Result<LockGuard, AllocError> {
        let guard = LockGuard::acquire(
            &self.lock_path,
            self.config.lock_timeout,
            self.config.lock_poll_interval,
        )
        .map_err(|e| AllocError::storage(&self.lock_path, e))?;

        guard.ok_or_else(|| AllocError::LockTimeout {
            namespace: self.namespace.to_string(),
            waited: self.config.lock_timeout,
        })
    }

    /// Load the table. A missing file is an empty table.
    fn load(&self) -> Result<AllocationTable<V>, AllocError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No table file, starting empty");
                return Ok(AllocationTable::new(BTreeMap::new()));
            }
            Err(e) => return Err(AllocError::storage(&self.path, e)),
        };

        let persisted: PersistedTable<V> =
            serde_json::from_str(&content).map_err(|e| self.corrupt(e.to_string()))?;

        if persisted.version != TABLE_VERSION {
            return Err(self.corrupt(format!(
                "unsupported format version {} (expected {})",
                persisted.version, TABLE_VERSION
            )));
        }

        if let Some((_, key, value)) = duplicate_binding(&persisted.entries) {
            return Err(self.corrupt(format!(
                "value {value} is bound more than once (again by {key})"
            )));
        }

        debug!(
            path = %self.path.display(),
            entry_count = persisted.entries.len(),
            "Loaded allocation table"
        );
        Ok(AllocationTable::new(persisted.entries))
    }

    /// Save the table atomically.
    fn save(&self, table: &AllocationTable<V>) -> Result<(), AllocError> {
        let persisted = PersistedTable {
            version: TABLE_VERSION,
            namespace: self.namespace.to_string(),
            entries: table.entries.clone(),
        };
        let content = serde_json::to_string_pretty(&persisted)
            .map_err(|e| AllocError::storage(&self.tmp_path, io::Error::other(e)))?;

        let mut file =
            File::create(&self.tmp_path).map_err(|e| AllocError::storage(&self.tmp_path, e))?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| AllocError::storage(&self.tmp_path, e))?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path).map_err(|e| AllocError::storage(&self.path, e))?;

        // Make the rename itself durable.
        if let Some(parent) = self.path.parent() {
            File::open(parent)
                .and_then(|dir| dir.sync_all())
                .map_err(|e| AllocError::storage(parent, e))?;
        }

        debug!(
            path = %self.path.display(),
            entry_count = table.len(),
            "Saved allocation table"
        );
        Ok(())
    }

    fn corrupt(&self, reason: String) -> AllocError {
        AllocError::CorruptState {
            path: self.path.clone(),
            reason,
        }
    }
}
