//! The string store
//!
//! Opaque-keyed, append-extendable byte blobs. Values have no internal
//! structure; every higher-level byte stream (file fulltexts, serialized
//! directory entries, property lists, svndiff windows) bottoms out here.

use crate::keys::{self, COUNTER_STRING};
use crate::kv::{KvRead, Table, WriteScope};
use chronofs_core::{FsError, Result, StringKey};

fn fetch(view: &impl KvRead, key: &StringKey) -> Result<Vec<u8>> {
    view.get(Table::Strings, key.as_str())
        .ok_or_else(|| FsError::NoSuchString {
            key: key.to_string(),
        })
}

/// Append bytes to a string, allocating a fresh key when none is given
pub fn append(
    scope: &mut WriteScope<'_>,
    key: Option<&StringKey>,
    bytes: &[u8],
) -> Result<StringKey> {
    match key {
        Some(key) => {
            let mut value = fetch(scope, key)?;
            value.extend_from_slice(bytes);
            scope.put(Table::Strings, key.as_str(), value);
            Ok(key.clone())
        }
        None => {
            let key = StringKey::new(keys::allocate(scope, COUNTER_STRING)?);
            scope.put(Table::Strings, key.as_str(), bytes.to_vec());
            Ok(key)
        }
    }
}

/// Read up to `max_len` bytes starting at `offset`
///
/// A read past the end returns the available suffix and a short count.
pub fn read(view: &impl KvRead, key: &StringKey, offset: u64, max_len: usize) -> Result<Vec<u8>> {
    let value = fetch(view, key)?;
    let start = (offset as usize).min(value.len());
    let end = start.saturating_add(max_len).min(value.len());
    Ok(value[start..end].to_vec())
}

/// The full length of a string
pub fn size(view: &impl KvRead, key: &StringKey) -> Result<u64> {
    Ok(fetch(view, key)?.len() as u64)
}

/// Copy a string under a fresh key
pub fn copy(scope: &mut WriteScope<'_>, key: &StringKey) -> Result<StringKey> {
    let value = fetch(scope, key)?;
    let new_key = StringKey::new(keys::allocate(scope, COUNTER_STRING)?);
    scope.put(Table::Strings, new_key.as_str(), value);
    Ok(new_key)
}

/// Delete a string
pub fn delete(scope: &mut WriteScope<'_>, key: &StringKey) -> Result<()> {
    fetch(scope, key)?;
    scope.delete(Table::Strings, key.as_str());
    Ok(())
}

/// Truncate a string to zero length, keeping the key
pub fn clear(scope: &mut WriteScope<'_>, key: &StringKey) -> Result<()> {
    fetch(scope, key)?;
    scope.put(Table::Strings, key.as_str(), Vec::new());
    Ok(())
}
