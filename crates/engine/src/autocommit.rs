//! Auto-versioning
//!
//! Simple write-shaped requests (put a file, make a collection, delete,
//! copy, move) each acquire a throwaway transaction against the current
//! head, perform the one change, and commit. A conflict from a racing
//! commit surfaces unchanged; the throwaway transaction is aborted.

use crate::fs::Filesystem;
use chronofs_core::{Result, Revnum};
use chronofs_storage::revisions;

fn one_shot(
    fs: &Filesystem,
    log_message: &str,
    apply: impl FnOnce(&crate::txn::Transaction) -> Result<()>,
) -> Result<Revnum> {
    let head = fs.store().read(|view| revisions::youngest(view))?;
    let txn = fs.begin_txn(head)?;
    txn.set_prop("svn:log", Some(log_message.as_bytes()))?;
    if let Err(error) = apply(&txn) {
        txn.abort()?;
        return Err(error);
    }
    match txn.commit() {
        Ok(rev) => Ok(rev),
        Err(error) => {
            // Commit failures leave the txn open; a throwaway txn has
            // nobody to come back for it.
            let _ = txn.abort();
            Err(error)
        }
    }
}

/// Create or replace a file with the given bytes in one step
pub fn put_file(fs: &Filesystem, target: &str, bytes: &[u8]) -> Result<Revnum> {
    one_shot(fs, "autoversioning put", |txn| {
        if txn.check_path(target)?.is_none() {
            txn.make_file(target)?;
        }
        txn.write_file(target, bytes)
    })
}

/// Create a directory in one step
pub fn make_collection(fs: &Filesystem, target: &str) -> Result<Revnum> {
    one_shot(fs, "autoversioning mkcol", |txn| txn.make_dir(target))
}

/// Delete a path in one step
pub fn delete_path(fs: &Filesystem, target: &str) -> Result<Revnum> {
    one_shot(fs, "autoversioning delete", |txn| txn.delete(target))
}

/// Copy a live path in one step, preserving history
pub fn copy_path(fs: &Filesystem, from: &str, to: &str) -> Result<Revnum> {
    let head = fs.youngest_rev()?;
    one_shot(fs, "autoversioning copy", |txn| txn.copy(head, from, to))
}

/// Move a live path in one step
///
/// A rename: the node keeps its identity, only the entries move.
pub fn move_path(fs: &Filesystem, from: &str, to: &str) -> Result<Revnum> {
    one_shot(fs, "autoversioning move", |txn| txn.rename(from, to))
}
