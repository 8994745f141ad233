//! The node-revision store
//!
//! An append-only map from node-revision id to node-revision record.
//! `create_node` introduces a brand-new node (fresh node id);
//! `create_successor` appends the next revision of an existing node:
//! same node id, new change-set tag, predecessor count bumped when known.

use crate::keys::{self, COUNTER_NODE};
use crate::kv::{KvRead, Table, WriteScope};
use chronofs_core::{
    ChangeSetId, CopyId, FsError, NodeId, NodeRevision, NodeRevisionId, Result, TxnId,
};

/// Load a node-revision record
pub fn get_node_rev(view: &impl KvRead, id: &NodeRevisionId) -> Result<NodeRevision> {
    let bytes = view
        .get(Table::NodeRevisions, &id.to_string())
        .ok_or_else(|| FsError::NoSuchNodeRevision { id: id.to_string() })?;
    Ok(bincode::deserialize(&bytes)?)
}

/// Store a node-revision record under the given id
pub fn put_node_rev(
    scope: &mut WriteScope<'_>,
    id: &NodeRevisionId,
    record: &NodeRevision,
) -> Result<()> {
    scope.put(
        Table::NodeRevisions,
        id.to_string(),
        bincode::serialize(record)?,
    );
    Ok(())
}

/// Delete a node-revision record
pub fn delete_node_rev(scope: &mut WriteScope<'_>, id: &NodeRevisionId) -> Result<()> {
    scope.delete(Table::NodeRevisions, &id.to_string());
    Ok(())
}

/// Introduce a completely new node within `txn_id`
///
/// Allocates a fresh node id and stores the record under
/// `(node, copy, t<txn>)`.
pub fn create_node(
    scope: &mut WriteScope<'_>,
    record: &NodeRevision,
    copy_id: &CopyId,
    txn_id: &TxnId,
) -> Result<NodeRevisionId> {
    let node_id = NodeId::new(keys::allocate(scope, COUNTER_NODE)?);
    let id = NodeRevisionId::new(
        node_id,
        copy_id.clone(),
        ChangeSetId::Txn(txn_id.clone()),
    );
    put_node_rev(scope, &id, record)?;
    Ok(id)
}

/// Append the next revision of an existing node within `txn_id`
///
/// The new id keeps the old node id, takes the supplied copy id, and is
/// tagged with the transaction. The stored record's predecessor fields
/// are filled in here: predecessor id is `old_id`, and the predecessor
/// count is incremented when the old record knew its own.
pub fn create_successor(
    scope: &mut WriteScope<'_>,
    old_id: &NodeRevisionId,
    record: &NodeRevision,
    copy_id: &CopyId,
    txn_id: &TxnId,
) -> Result<NodeRevisionId> {
    let old_record = get_node_rev(scope, old_id)?;
    let new_id = NodeRevisionId::new(
        old_id.node_id.clone(),
        copy_id.clone(),
        ChangeSetId::Txn(txn_id.clone()),
    );
    let mut new_record = record.clone();
    new_record.predecessor = Some(old_id.clone());
    new_record.predecessor_count = old_record.predecessor_count.map(|n| n + 1);
    put_node_rev(scope, &new_id, &new_record)?;
    Ok(new_id)
}
