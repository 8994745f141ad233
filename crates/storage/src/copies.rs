//! The copies table
//!
//! One record per allocated copy id, remembering where the copy came from
//! and which node-revision it produced.

use crate::keys::{self, COUNTER_COPY};
use crate::kv::{KvRead, Table, WriteScope};
use chronofs_core::{CopyId, FsError, NodeRevisionId, Result, Revnum};
use serde::{Deserialize, Serialize};

/// Copy-origin metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRecord {
    /// Canonical source path
    pub src_path: String,
    /// Source revision
    pub src_rev: Revnum,
    /// The node-revision the copy created
    pub dst_id: NodeRevisionId,
}

/// Allocate a fresh copy id
pub fn reserve_copy_id(scope: &mut WriteScope<'_>) -> Result<CopyId> {
    Ok(CopyId::new(keys::allocate(scope, COUNTER_COPY)?))
}

/// Store the record for a copy id
pub fn put_copy(scope: &mut WriteScope<'_>, copy_id: &CopyId, record: &CopyRecord) -> Result<()> {
    scope.put(Table::Copies, copy_id.as_str(), bincode::serialize(record)?);
    Ok(())
}

/// Load the record for a copy id
pub fn get_copy(view: &impl KvRead, copy_id: &CopyId) -> Result<CopyRecord> {
    let bytes = view
        .get(Table::Copies, copy_id.as_str())
        .ok_or_else(|| FsError::corrupt(format!("no copy record for copy id '{}'", copy_id)))?;
    Ok(bincode::deserialize(&bytes)?)
}
