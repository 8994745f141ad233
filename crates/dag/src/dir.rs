//! Directory contents
//!
//! A directory's entries are its data representation: a name-ordered map
//! serialized with bincode, read and written through the same
//! representation machinery as file contents. An absent data
//! representation is an empty directory.

use crate::node::DagNode;
use chronofs_core::{Cancel, DirEntries, FsConfig, FsError, Result, TxnId};
use chronofs_storage::{nodes, reps, KvRead, WriteScope};

/// The entry list of a directory node
pub fn entries(
    view: &impl KvRead,
    config: &FsConfig,
    cancel: &Cancel,
    dir: &DagNode,
) -> Result<DirEntries> {
    if !dir.is_dir() {
        return Err(FsError::NotDirectory {
            path: dir.created_path.clone(),
        });
    }
    let record = dir.record(view)?;
    match &record.data_rep {
        Some(key) => {
            let bytes = reps::rep_contents(view, config, cancel, key)?;
            Ok(bincode::deserialize(&bytes)?)
        }
        None => Ok(DirEntries::new()),
    }
}

/// Replace the entry list of a mutable directory node
pub fn set_entries(
    scope: &mut WriteScope<'_>,
    config: &FsConfig,
    cancel: &Cancel,
    dir: &DagNode,
    txn_id: &TxnId,
    entries: &DirEntries,
) -> Result<()> {
    if !dir.is_dir() {
        return Err(FsError::NotDirectory {
            path: dir.created_path.clone(),
        });
    }
    if !dir.is_mutable(txn_id) {
        return Err(FsError::not_mutable(format!(
            "directory '{}'",
            dir.created_path
        )));
    }
    let mut record = dir.record(scope)?;
    let rep_key = reps::get_mutable_rep(scope, config, cancel, record.data_rep.as_ref(), txn_id)?;
    reps::rep_contents_clear(scope, &rep_key, txn_id)?;
    reps::rep_append(scope, &rep_key, &bincode::serialize(entries)?, txn_id)?;
    if record.data_rep.as_ref() != Some(&rep_key) {
        record.data_rep = Some(rep_key);
        nodes::put_node_rev(scope, &dir.id, &record)?;
    }
    Ok(())
}
