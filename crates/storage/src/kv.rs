//! The ordered key/value collaborator
//!
//! The engine stores everything in a handful of named, ordered KV tables
//! with ACID write scopes. The tables themselves are an external
//! collaborator as far as the filesystem semantics are concerned; this
//! module supplies the in-memory rendition: a `BTreeMap` behind
//! `parking_lot::RwLock`, with buffered write scopes that apply atomically
//! on success and vanish on error.
//!
//! Writers are serialized by the write lock for the duration of their
//! scope, so a scope either commits completely or not at all. The retry
//! loop in [`with_retry`] re-runs scopes that fail with a *transient*
//! error, which an ordered-KV backend under real contention would report.

use chronofs_core::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// The named tables of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// Opaque byte blobs, append-extendable
    Strings,
    /// Representation records
    Representations,
    /// Node-revision records, keyed by id wire form
    NodeRevisions,
    /// Revision records, keyed by padded decimal revision number
    Revisions,
    /// Transaction records, keyed by transaction name
    Transactions,
    /// Copy-origin metadata, keyed by copy id
    Copies,
    /// Per-change-set path change lists
    Changes,
    /// Lock digest records, keyed by path digest
    LockDigests,
    /// Key-allocation counters
    NextKeys,
}

type MapKey = (Table, String);

/// Read access to the store
///
/// Implemented by plain read views and by write scopes (which observe
/// their own pending writes).
pub trait KvRead {
    /// Fetch one value
    fn get(&self, table: Table, key: &str) -> Option<Vec<u8>>;

    /// All live `(key, value)` pairs of a table whose key starts with
    /// `prefix`, in key order
    fn scan_prefix(&self, table: Table, prefix: &str) -> Vec<(String, Vec<u8>)>;
}

/// A consistent read view over the store
pub struct ReadView<'a> {
    data: &'a BTreeMap<MapKey, Vec<u8>>,
}

impl KvRead for ReadView<'_> {
    fn get(&self, table: Table, key: &str) -> Option<Vec<u8>> {
        self.data.get(&(table, key.to_string())).cloned()
    }

    fn scan_prefix(&self, table: Table, prefix: &str) -> Vec<(String, Vec<u8>)> {
        self.data
            .range((table, prefix.to_string())..)
            .take_while(|((t, k), _)| *t == table && k.starts_with(prefix))
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// A buffered ACID write scope
///
/// Reads observe pending writes; nothing reaches the base map until the
/// scope closure returns success.
pub struct WriteScope<'a> {
    base: &'a BTreeMap<MapKey, Vec<u8>>,
    pending: BTreeMap<MapKey, Option<Vec<u8>>>,
}

impl WriteScope<'_> {
    /// Stage a write
    pub fn put(&mut self, table: Table, key: impl Into<String>, value: Vec<u8>) {
        self.pending.insert((table, key.into()), Some(value));
    }

    /// Stage a deletion
    pub fn delete(&mut self, table: Table, key: &str) {
        self.pending.insert((table, key.to_string()), None);
    }
}

impl KvRead for WriteScope<'_> {
    fn get(&self, table: Table, key: &str) -> Option<Vec<u8>> {
        let map_key = (table, key.to_string());
        match self.pending.get(&map_key) {
            Some(staged) => staged.clone(),
            None => self.base.get(&map_key).cloned(),
        }
    }

    fn scan_prefix(&self, table: Table, prefix: &str) -> Vec<(String, Vec<u8>)> {
        let start = (table, prefix.to_string());
        let mut merged: BTreeMap<String, Option<Vec<u8>>> = self
            .base
            .range(start.clone()..)
            .take_while(|((t, k), _)| *t == table && k.starts_with(prefix))
            .map(|((_, k), v)| (k.clone(), Some(v.clone())))
            .collect();
        for ((t, k), staged) in self.pending.range(start..) {
            if *t != table || !k.starts_with(prefix) {
                break;
            }
            merged.insert(k.clone(), staged.clone());
        }
        merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect()
    }
}

/// The in-memory ordered KV store
#[derive(Debug, Default)]
pub struct Kv {
    data: RwLock<BTreeMap<MapKey, Vec<u8>>>,
}

impl Kv {
    /// An empty store
    pub fn new() -> Self {
        Kv::default()
    }

    /// Run a closure against a consistent read view
    pub fn with_read<T>(&self, f: impl FnOnce(&ReadView<'_>) -> Result<T>) -> Result<T> {
        let guard = self.data.read();
        f(&ReadView { data: &guard })
    }

    /// Run a closure inside an ACID write scope
    ///
    /// On success the staged writes are applied atomically; on error the
    /// scope is discarded and the store is untouched.
    pub fn with_write<T>(&self, f: impl FnOnce(&mut WriteScope<'_>) -> Result<T>) -> Result<T> {
        let mut guard = self.data.write();
        let (result, pending) = {
            let mut scope = WriteScope {
                base: &guard,
                pending: BTreeMap::new(),
            };
            let result = f(&mut scope);
            (result, scope.pending)
        };
        let value = result?;
        for (key, staged) in pending {
            match staged {
                Some(bytes) => {
                    guard.insert(key, bytes);
                }
                None => {
                    guard.remove(&key);
                }
            }
        }
        Ok(value)
    }
}

/// Re-run `f` while it fails with a transient error, up to `max_attempts`
pub fn with_retry<T>(max_attempts: u32, mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match f() {
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                attempt += 1;
                tracing::warn!(attempt, error = %e, "retrying transient storage condition");
            }
            other => return other,
        }
    }
}
