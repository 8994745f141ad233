//! DAG node handles
//!
//! A [`DagNode`] is an immutable, cheaply clonable handle onto one
//! node-revision: its id, kind, and created-path, loaded once. The full
//! record is refetched on demand, since a mutable node-revision's
//! representation keys can change underneath a live handle and the
//! record is the authority.
//!
//! Mutation never updates a handle in place; tree operations return new
//! handles, and callers re-open by path after an ancestor was cloned.

use chronofs_core::{
    Cancel, FsConfig, FsError, NodeKind, NodeRevision, NodeRevisionId, PropList, Result, TxnId,
};
use chronofs_storage::{nodes, reps, KvRead, WriteScope};

/// An immutable handle onto one node-revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagNode {
    /// Full node-revision id
    pub id: NodeRevisionId,
    /// File or directory
    pub kind: NodeKind,
    /// Canonical path at which the node-revision was created
    pub created_path: String,
}

impl DagNode {
    /// Load a handle for an id
    pub fn get(view: &impl KvRead, id: &NodeRevisionId) -> Result<DagNode> {
        let record = nodes::get_node_rev(view, id)?;
        Ok(DagNode {
            id: id.clone(),
            kind: record.kind,
            created_path: record.created_path,
        })
    }

    /// Refetch the full record
    pub fn record(&self, view: &impl KvRead) -> Result<NodeRevision> {
        nodes::get_node_rev(view, &self.id)
    }

    /// True when this node-revision is mutable under `txn_id`
    pub fn is_mutable(&self, txn_id: &TxnId) -> bool {
        self.id.is_txn_id(txn_id)
    }

    /// True for directories
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// The revision that created this node-revision, if committed
    pub fn created_rev(&self) -> Option<chronofs_core::Revnum> {
        self.id.change_set.revision()
    }
}

/// The property list of a node
pub fn proplist(
    view: &impl KvRead,
    config: &FsConfig,
    cancel: &Cancel,
    node: &DagNode,
) -> Result<PropList> {
    let record = node.record(view)?;
    match &record.props_rep {
        Some(key) => {
            let bytes = reps::rep_contents(view, config, cancel, key)?;
            Ok(bincode::deserialize(&bytes)?)
        }
        None => Ok(PropList::new()),
    }
}

/// Replace the property list of a mutable node
pub fn set_proplist(
    scope: &mut WriteScope<'_>,
    config: &FsConfig,
    cancel: &Cancel,
    node: &DagNode,
    txn_id: &TxnId,
    props: &PropList,
) -> Result<()> {
    if !node.is_mutable(txn_id) {
        return Err(FsError::not_mutable(format!("node '{}'", node.created_path)));
    }
    let mut record = node.record(scope)?;
    let rep_key = reps::get_mutable_rep(scope, config, cancel, record.props_rep.as_ref(), txn_id)?;
    reps::rep_contents_clear(scope, &rep_key, txn_id)?;
    reps::rep_append(scope, &rep_key, &bincode::serialize(props)?, txn_id)?;
    if record.props_rep.as_ref() != Some(&rep_key) {
        record.props_rep = Some(rep_key);
        nodes::put_node_rev(scope, &node.id, &record)?;
    }
    Ok(())
}
