//! Tree operations
//!
//! The typed mutation surface of the DAG: opening children, cloning for
//! write, creating and deleting entries, and copying nodes across the
//! tree. All mutations run inside a transaction context and require their
//! target directory to already be mutable; walking the tree from the
//! transaction root and cloning on the way down is the caller's job (the
//! engine's `make_path_mutable`).

use crate::dir;
use crate::node::DagNode;
use chronofs_core::{
    path, Cancel, CopyId, CopyOrigin, DirEntry, FsConfig, FsError, NodeKind, NodeRevision,
    NodeRevisionId, Result, Revnum, TxnId,
};
use chronofs_storage::{copies, nodes, reps, txns, KvRead, WriteScope};

/// Shared context for DAG operations: configuration plus cancellation
#[derive(Clone, Copy)]
pub struct DagOps<'a> {
    /// Handle configuration
    pub config: &'a FsConfig,
    /// Cancellation hook, consulted per entry during recursive walks
    pub cancel: &'a Cancel,
}

impl DagOps<'_> {
    /// The root node of a committed revision
    pub fn revision_root(&self, view: &impl KvRead, rev: Revnum) -> Result<DagNode> {
        let root_id = chronofs_storage::revisions::root_of(view, rev)?;
        DagNode::get(view, &root_id)
    }

    /// The root node of a transaction (mutable only after `clone_root`)
    pub fn txn_root(&self, view: &impl KvRead, txn_id: &TxnId) -> Result<DagNode> {
        let record = txns::get_txn(view, txn_id)?;
        DagNode::get(view, &record.root_id)
    }

    /// Open a named child of a directory
    pub fn open(
        &self,
        view: &impl KvRead,
        parent: &DagNode,
        name: &str,
    ) -> Result<Option<DagNode>> {
        let entries = dir::entries(view, self.config, self.cancel, parent)?;
        match entries.get(name) {
            Some(entry) => Ok(Some(DagNode::get(view, &entry.id)?)),
            None => Ok(None),
        }
    }

    /// The entry list of a directory
    pub fn entries(
        &self,
        view: &impl KvRead,
        dir_node: &DagNode,
    ) -> Result<chronofs_core::DirEntries> {
        dir::entries(view, self.config, self.cancel, dir_node)
    }

    /// Make the transaction root mutable, cloning the base root on first
    /// use
    ///
    /// The clone keeps the root's node id and copy id, records the base
    /// root as predecessor, and keeps `/` as its created-path.
    pub fn clone_root(&self, scope: &mut WriteScope<'_>, txn_id: &TxnId) -> Result<DagNode> {
        let mut record = txns::get_txn(scope, txn_id)?;
        if record.root_id.is_txn_id(txn_id) {
            return DagNode::get(scope, &record.root_id);
        }
        let base_root = nodes::get_node_rev(scope, &record.root_id)?;
        let new_id = nodes::create_successor(
            scope,
            &record.root_id,
            &base_root,
            &record.root_id.copy_id.clone(),
            txn_id,
        )?;
        record.root_id = new_id.clone();
        txns::put_txn(scope, txn_id, &record)?;
        DagNode::get(scope, &new_id)
    }

    /// Make a child mutable, cloning it on first use
    ///
    /// The parent must already be mutable. An explicit copy id puts the
    /// clone onto a new line of history; otherwise the child keeps its
    /// own. The parent's entry is rewritten to the clone's id, so callers
    /// holding older handles onto this directory must re-open by path.
    pub fn clone_child(
        &self,
        scope: &mut WriteScope<'_>,
        parent: &DagNode,
        name: &str,
        copy_id: Option<&CopyId>,
        txn_id: &TxnId,
    ) -> Result<DagNode> {
        if !parent.is_mutable(txn_id) {
            return Err(FsError::not_mutable(format!(
                "directory '{}'",
                parent.created_path
            )));
        }
        let mut entries = dir::entries(scope, self.config, self.cancel, parent)?;
        let entry = entries.get(name).cloned().ok_or_else(|| FsError::PathNotFound {
            path: path::join(&parent.created_path, name),
        })?;
        if entry.id.is_txn_id(txn_id) {
            return DagNode::get(scope, &entry.id);
        }
        let mut record = nodes::get_node_rev(scope, &entry.id)?;
        record.created_path = path::join(&parent.created_path, name);
        // An edit clone is not itself created by copy.
        record.copy_origin = None;
        let copy_id = copy_id.unwrap_or(&entry.id.copy_id).clone();
        let new_id = nodes::create_successor(scope, &entry.id, &record, &copy_id, txn_id)?;
        entries.insert(
            name.to_string(),
            DirEntry {
                id: new_id.clone(),
                kind: entry.kind,
            },
        );
        dir::set_entries(scope, self.config, self.cancel, parent, txn_id, &entries)?;
        DagNode::get(scope, &new_id)
    }

    /// Create a file entry
    pub fn make_file(
        &self,
        scope: &mut WriteScope<'_>,
        parent: &DagNode,
        name: &str,
        txn_id: &TxnId,
    ) -> Result<DagNode> {
        self.make_entry(scope, parent, name, NodeKind::File, txn_id)
    }

    /// Create a directory entry
    pub fn make_dir(
        &self,
        scope: &mut WriteScope<'_>,
        parent: &DagNode,
        name: &str,
        txn_id: &TxnId,
    ) -> Result<DagNode> {
        self.make_entry(scope, parent, name, NodeKind::Dir, txn_id)
    }

    fn make_entry(
        &self,
        scope: &mut WriteScope<'_>,
        parent: &DagNode,
        name: &str,
        kind: NodeKind,
        txn_id: &TxnId,
    ) -> Result<DagNode> {
        path::validate_name(name)?;
        if !parent.is_dir() {
            return Err(FsError::NotDirectory {
                path: parent.created_path.clone(),
            });
        }
        if !parent.is_mutable(txn_id) {
            return Err(FsError::not_mutable(format!(
                "directory '{}'",
                parent.created_path
            )));
        }
        let mut entries = dir::entries(scope, self.config, self.cancel, parent)?;
        let child_path = path::join(&parent.created_path, name);
        if entries.contains_key(name) {
            return Err(FsError::AlreadyExists { path: child_path });
        }
        let record = NodeRevision::new(kind, child_path);
        let id = nodes::create_node(scope, &record, &CopyId::new("0"), txn_id)?;
        entries.insert(name.to_string(), DirEntry { id: id.clone(), kind });
        dir::set_entries(scope, self.config, self.cancel, parent, txn_id, &entries)?;
        DagNode::get(scope, &id)
    }

    /// Remove a directory entry
    ///
    /// Mutable node-revisions reachable only through the deleted entry
    /// are destroyed along with their representations; committed
    /// node-revisions stay, reachable through prior revisions.
    pub fn delete_entry(
        &self,
        scope: &mut WriteScope<'_>,
        parent: &DagNode,
        name: &str,
        txn_id: &TxnId,
    ) -> Result<()> {
        if !parent.is_mutable(txn_id) {
            return Err(FsError::not_mutable(format!(
                "directory '{}'",
                parent.created_path
            )));
        }
        let mut entries = dir::entries(scope, self.config, self.cancel, parent)?;
        let entry = entries.remove(name).ok_or_else(|| FsError::PathNotFound {
            path: path::join(&parent.created_path, name),
        })?;
        self.delete_if_mutable(scope, &entry.id, txn_id)?;
        dir::set_entries(scope, self.config, self.cancel, parent, txn_id, &entries)
    }

    /// Recursively destroy a mutable node-revision and its mutable
    /// descendants
    pub fn delete_if_mutable(
        &self,
        scope: &mut WriteScope<'_>,
        id: &NodeRevisionId,
        txn_id: &TxnId,
    ) -> Result<()> {
        if !id.is_txn_id(txn_id) {
            return Ok(());
        }
        self.cancel.check()?;
        let record = nodes::get_node_rev(scope, id)?;
        if record.kind.is_dir() {
            let node = DagNode::get(scope, id)?;
            for entry in dir::entries(scope, self.config, self.cancel, &node)?.values() {
                self.delete_if_mutable(scope, &entry.id, txn_id)?;
            }
        }
        if let Some(rep) = &record.props_rep {
            reps::delete_rep_if_mutable(scope, rep, txn_id)?;
        }
        if let Some(rep) = &record.data_rep {
            reps::delete_rep_if_mutable(scope, rep, txn_id)?;
        }
        nodes::delete_node_rev(scope, id)
    }

    /// Remove an entry without touching the node it names
    ///
    /// The rename half-step: the node keeps living under its new entry.
    pub fn unlink_entry(
        &self,
        scope: &mut WriteScope<'_>,
        parent: &DagNode,
        name: &str,
        txn_id: &TxnId,
    ) -> Result<()> {
        if !parent.is_mutable(txn_id) {
            return Err(FsError::not_mutable(format!(
                "directory '{}'",
                parent.created_path
            )));
        }
        let mut entries = dir::entries(scope, self.config, self.cancel, parent)?;
        if entries.remove(name).is_none() {
            return Err(FsError::PathNotFound {
                path: path::join(&parent.created_path, name),
            });
        }
        dir::set_entries(scope, self.config, self.cancel, parent, txn_id, &entries)
    }

    /// Write an entry directly; used by the merge pass
    pub fn set_entry(
        &self,
        scope: &mut WriteScope<'_>,
        parent: &DagNode,
        name: &str,
        id: &NodeRevisionId,
        kind: NodeKind,
        txn_id: &TxnId,
    ) -> Result<()> {
        let mut entries = dir::entries(scope, self.config, self.cancel, parent)?;
        entries.insert(
            name.to_string(),
            DirEntry {
                id: id.clone(),
                kind,
            },
        );
        dir::set_entries(scope, self.config, self.cancel, parent, txn_id, &entries)
    }

    /// Copy a node under a new name
    ///
    /// With `preserve_history`, a fresh node on a fresh line of history
    /// is created: new node id, new copy id, predecessor pointing at the
    /// source, and a recorded copy origin. Without it, the destination
    /// entry simply names the source id.
    #[allow(clippy::too_many_arguments)]
    pub fn copy(
        &self,
        scope: &mut WriteScope<'_>,
        to_parent: &DagNode,
        name: &str,
        from_node: &DagNode,
        preserve_history: bool,
        from_path: &str,
        from_rev: Revnum,
        txn_id: &TxnId,
    ) -> Result<()> {
        if !to_parent.is_mutable(txn_id) {
            return Err(FsError::not_mutable(format!(
                "directory '{}'",
                to_parent.created_path
            )));
        }
        if !preserve_history {
            return self.set_entry(scope, to_parent, name, &from_node.id, from_node.kind, txn_id);
        }

        let copy_id = copies::reserve_copy_id(scope)?;
        let from_record = from_node.record(scope)?;
        let mut record = from_record.clone();
        record.created_path = path::join(&to_parent.created_path, name);
        record.predecessor = Some(from_node.id.clone());
        record.predecessor_count = from_record.predecessor_count.map(|n| n + 1);
        record.copy_origin = Some(CopyOrigin {
            path: from_path.to_string(),
            rev: from_rev,
        });
        // A copy starts a node of its own: fresh node id, so the copy is
        // unrelated to its source even though the predecessor link
        // remembers where it came from.
        let id = nodes::create_node(scope, &record, &copy_id, txn_id)?;
        copies::put_copy(
            scope,
            &copy_id,
            &copies::CopyRecord {
                src_path: from_path.to_string(),
                src_rev: from_rev,
                dst_id: id.clone(),
            },
        )?;
        self.set_entry(scope, to_parent, name, &id, from_node.kind, txn_id)
    }

    /// Compare two nodes' properties and contents
    ///
    /// Equal representation keys mean equal content. Differing keys mean
    /// "changed" in fast mode; strict mode compares the actual bytes,
    /// catching distinct keys with coinciding content.
    pub fn things_different(
        &self,
        view: &impl KvRead,
        a: &DagNode,
        b: &DagNode,
        strict: bool,
    ) -> Result<(bool, bool)> {
        let ra = a.record(view)?;
        let rb = b.record(view)?;
        let props_changed =
            self.reps_differ(view, ra.props_rep.as_ref(), rb.props_rep.as_ref(), strict)?;
        let contents_changed =
            self.reps_differ(view, ra.data_rep.as_ref(), rb.data_rep.as_ref(), strict)?;
        Ok((props_changed, contents_changed))
    }

    fn reps_differ(
        &self,
        view: &impl KvRead,
        a: Option<&chronofs_core::RepKey>,
        b: Option<&chronofs_core::RepKey>,
        strict: bool,
    ) -> Result<bool> {
        match (a, b) {
            (None, None) => Ok(false),
            (Some(a), Some(b)) if a == b => Ok(false),
            (a, b) if !strict => Ok(a != b),
            (a, b) => {
                let bytes_of = |key: Option<&chronofs_core::RepKey>| -> Result<Vec<u8>> {
                    match key {
                        Some(key) => reps::rep_contents(view, self.config, self.cancel, key),
                        None => Ok(Vec::new()),
                    }
                };
                Ok(bytes_of(a)? != bytes_of(b)?)
            }
        }
    }
}
