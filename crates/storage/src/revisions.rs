//! The revision index
//!
//! Monotone numbered records mapping a revision to its root
//! node-revision id and its property list. Revision properties are
//! unversioned: they may be changed after commit and take no part in
//! merges.

use crate::keys::{self, COUNTER_REV};
use crate::kv::{KvRead, Table, WriteScope};
use chronofs_core::{FsError, NodeRevisionId, PropList, Result, Revnum};
use serde::{Deserialize, Serialize};

/// One revision record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Root node-revision id of the revision's tree
    pub root_id: NodeRevisionId,
    /// Unversioned revision properties
    pub props: PropList,
}

fn table_key(rev: Revnum) -> String {
    // Zero-padded so the table sorts numerically.
    format!("{:020}", rev)
}

/// The youngest committed revision number
pub fn youngest(view: &impl KvRead) -> Result<Revnum> {
    let next = keys::peek(view, COUNTER_REV)?;
    next.checked_sub(1)
        .ok_or_else(|| FsError::corrupt("revision counter is zero; filesystem not initialized"))
}

/// Load a revision record
pub fn get_revision(view: &impl KvRead, rev: Revnum) -> Result<Revision> {
    let bytes = view
        .get(Table::Revisions, &table_key(rev))
        .ok_or(FsError::NoSuchRevision { revision: rev })?;
    Ok(bincode::deserialize(&bytes)?)
}

/// The root node-revision id of a revision
pub fn root_of(view: &impl KvRead, rev: Revnum) -> Result<NodeRevisionId> {
    Ok(get_revision(view, rev)?.root_id)
}

/// Allocate the next revision number and store its record
pub fn put_next_revision(scope: &mut WriteScope<'_>, record: &Revision) -> Result<Revnum> {
    let rev = keys::allocate_revnum(scope)?;
    scope.put(Table::Revisions, table_key(rev), bincode::serialize(record)?);
    Ok(rev)
}

/// Fetch one revision property
pub fn get_property(view: &impl KvRead, rev: Revnum, name: &str) -> Result<Option<Vec<u8>>> {
    Ok(get_revision(view, rev)?.props.get(name).cloned())
}

/// Set or delete one revision property
pub fn set_property(
    scope: &mut WriteScope<'_>,
    rev: Revnum,
    name: &str,
    value: Option<Vec<u8>>,
) -> Result<()> {
    let mut record = get_revision(scope, rev)?;
    match value {
        Some(v) => {
            record.props.insert(name.to_string(), v);
        }
        None => {
            record.props.remove(name);
        }
    }
    scope.put(Table::Revisions, table_key(rev), bincode::serialize(&record)?);
    Ok(())
}

/// The full property list of a revision
pub fn proplist(view: &impl KvRead, rev: Revnum) -> Result<PropList> {
    Ok(get_revision(view, rev)?.props)
}
