//! Key allocation
//!
//! Every table that needs fresh opaque keys draws them from a named
//! counter in the `NextKeys` table. Keys are handed out as lower-case
//! base36 strings: `0`, `1`, …, `z`, `10`, …

use crate::kv::{KvRead, Table, WriteScope};
use chronofs_core::{base36_decode, base36_encode, Result};

/// Counter for node ids
pub const COUNTER_NODE: &str = "node";
/// Counter for copy ids; starts at 1 so `0` stays the default line
pub const COUNTER_COPY: &str = "copy";
/// Counter for string keys
pub const COUNTER_STRING: &str = "string";
/// Counter for representation keys
pub const COUNTER_REP: &str = "rep";
/// Counter for transaction names
pub const COUNTER_TXN: &str = "txn";
/// Counter for revision numbers
pub const COUNTER_REV: &str = "rev";

/// Read a counter without consuming it
pub fn peek(view: &impl KvRead, counter: &str) -> Result<u64> {
    match view.get(Table::NextKeys, counter) {
        Some(bytes) => {
            let s = String::from_utf8(bytes)
                .map_err(|_| chronofs_core::FsError::corrupt("next-key row is not UTF-8"))?;
            base36_decode(&s)
        }
        None => Ok(initial(counter)),
    }
}

/// Allocate the next key from the named counter
pub fn allocate(scope: &mut WriteScope<'_>, counter: &str) -> Result<String> {
    let next = peek(scope, counter)?;
    scope.put(
        Table::NextKeys,
        counter,
        base36_encode(next + 1).into_bytes(),
    );
    Ok(base36_encode(next))
}

/// Allocate the next revision number
pub fn allocate_revnum(scope: &mut WriteScope<'_>) -> Result<u64> {
    let next = peek(scope, COUNTER_REV)?;
    scope.put(
        Table::NextKeys,
        COUNTER_REV,
        base36_encode(next + 1).into_bytes(),
    );
    Ok(next)
}

fn initial(counter: &str) -> u64 {
    // Copy id 0 is the default line of history; allocation starts past it.
    if counter == COUNTER_COPY {
        1
    } else {
        0
    }
}
