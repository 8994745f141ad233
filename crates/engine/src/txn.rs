//! Transactions
//!
//! A [`Transaction`] is a named, persistent workspace against a base
//! revision. Mutations clone their way down from the transaction root
//! (`make_path_mutable`), record a path change, and stay invisible to
//! every reader until commit. Abort purges everything the transaction
//! created.

use crate::access::AccessContext;
use crate::commit;
use crate::root::resolve;
use chronofs_core::{
    path, Checksum, ChecksumKind, DirEntries, FsError, NodeKind, PropList, Result, Revnum, TxnId,
};
use chronofs_dag::{contents, node as dag_node, DagNode, DagOps};
use chronofs_delta::decode_stream;
use chronofs_storage::{
    changes::{self, ChangeKind, ChangeRecord},
    revisions, txns, FsStore, KvRead, TxnRecord, WriteScope,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// A mutable workspace against a base revision
pub struct Transaction {
    store: FsStore,
    access: Arc<RwLock<AccessContext>>,
    id: TxnId,
}

impl Transaction {
    pub(crate) fn begin(
        store: FsStore,
        access: Arc<RwLock<AccessContext>>,
        base_rev: Revnum,
    ) -> Result<Transaction> {
        let id = store.write(|scope| {
            let root_id = revisions::root_of(scope, base_rev)?;
            txns::create_txn(
                scope,
                &TxnRecord {
                    base_rev,
                    root_id,
                    props: PropList::new(),
                },
            )
        })?;
        tracing::debug!(txn = %id, base_rev, "began transaction");
        Ok(Transaction { store, access, id })
    }

    pub(crate) fn open(
        store: FsStore,
        access: Arc<RwLock<AccessContext>>,
        name: &str,
    ) -> Result<Transaction> {
        let id = TxnId::new(name);
        store.read(|view| txns::get_txn(view, &id))?;
        Ok(Transaction { store, access, id })
    }

    /// The transaction's name
    pub fn name(&self) -> &str {
        self.id.as_str()
    }

    /// The transaction id
    pub fn id(&self) -> &TxnId {
        &self.id
    }

    pub(crate) fn store(&self) -> &FsStore {
        &self.store
    }

    pub(crate) fn access(&self) -> &Arc<RwLock<AccessContext>> {
        &self.access
    }

    fn ops(&self) -> DagOps<'_> {
        DagOps {
            config: self.store.config(),
            cancel: self.store.cancel(),
        }
    }

    /// The base revision this transaction was begun against
    pub fn base_rev(&self) -> Result<Revnum> {
        self.store
            .read(|view| Ok(txns::get_txn(view, &self.id)?.base_rev))
    }

    /// The transaction's current root node
    pub fn root(&self) -> Result<DagNode> {
        let ops = self.ops();
        self.store.read(|view| ops.txn_root(view, &self.id))
    }

    // =========================================================================
    // Transaction properties
    // =========================================================================

    /// Fetch one transaction property
    pub fn prop(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.store
            .read(|view| Ok(txns::get_txn(view, &self.id)?.props.get(name).cloned()))
    }

    /// Set or delete one transaction property
    pub fn set_prop(&self, name: &str, value: Option<&[u8]>) -> Result<()> {
        self.store.write(|scope| {
            let mut record = txns::get_txn(scope, &self.id)?;
            match value {
                Some(v) => {
                    record.props.insert(name.to_string(), v.to_vec());
                }
                None => {
                    record.props.remove(name);
                }
            }
            txns::put_txn(scope, &self.id, &record)
        })
    }

    /// The transaction's property list
    pub fn proplist(&self) -> Result<PropList> {
        self.store
            .read(|view| Ok(txns::get_txn(view, &self.id)?.props))
    }

    // =========================================================================
    // Reading through the transaction
    // =========================================================================

    fn resolve_node(&self, view: &impl KvRead, target: &str) -> Result<Option<DagNode>> {
        let ops = self.ops();
        let root = ops.txn_root(view, &self.id)?;
        resolve(view, &ops, &root, target)
    }

    fn require_node(&self, view: &impl KvRead, target: &str) -> Result<DagNode> {
        self.resolve_node(view, target)?
            .ok_or_else(|| FsError::PathNotFound {
                path: target.to_string(),
            })
    }

    /// The kind of the node at a path in this transaction's tree
    pub fn check_path(&self, target: &str) -> Result<Option<NodeKind>> {
        let target = path::canonicalize(target)?;
        self.store
            .read(|view| Ok(self.resolve_node(view, &target)?.map(|n| n.kind)))
    }

    /// Directory entries as this transaction sees them
    pub fn dir_entries(&self, target: &str) -> Result<DirEntries> {
        let target = path::canonicalize(target)?;
        let ops = self.ops();
        self.store.read(|view| {
            let node = self.require_node(view, &target)?;
            ops.entries(view, &node)
        })
    }

    /// File contents as this transaction sees them
    pub fn file_contents(&self, target: &str) -> Result<Vec<u8>> {
        let target = path::canonicalize(target)?;
        self.store.read(|view| {
            let node = self.require_node(view, &target)?;
            contents::file_contents(view, self.store.config(), self.store.cancel(), &node)
        })
    }

    /// File length as this transaction sees it
    pub fn file_length(&self, target: &str) -> Result<u64> {
        let target = path::canonicalize(target)?;
        self.store.read(|view| {
            let node = self.require_node(view, &target)?;
            contents::file_length(view, &node)
        })
    }

    /// File checksum as this transaction sees it
    pub fn file_checksum(&self, target: &str, kind: ChecksumKind) -> Result<Checksum> {
        let target = path::canonicalize(target)?;
        self.store.read(|view| {
            let node = self.require_node(view, &target)?;
            contents::file_checksum(view, self.store.config(), self.store.cancel(), &node, kind)
        })
    }

    /// Node properties as this transaction sees them
    pub fn node_proplist(&self, target: &str) -> Result<PropList> {
        let target = path::canonicalize(target)?;
        self.store.read(|view| {
            let node = self.require_node(view, &target)?;
            dag_node::proplist(view, self.store.config(), self.store.cancel(), &node)
        })
    }

    /// The revision that created the node at a path, or None while the
    /// node is still mutable in this transaction
    pub fn created_rev(&self, target: &str) -> Result<Option<Revnum>> {
        let target = path::canonicalize(target)?;
        self.store.read(|view| {
            let node = self.require_node(view, &target)?;
            Ok(node.created_rev())
        })
    }

    /// The changes recorded so far
    pub fn changed_paths(&self) -> Result<Vec<ChangeRecord>> {
        self.store.read(|view| changes::txn_changes(view, &self.id))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Clone every directory from the transaction root down to `target`,
    /// returning the mutable node at `target`
    pub(crate) fn make_path_mutable(
        &self,
        scope: &mut WriteScope<'_>,
        target: &str,
    ) -> Result<DagNode> {
        let ops = self.ops();
        let mut current = ops.clone_root(scope, &self.id)?;
        for component in path::components(target) {
            current = ops.clone_child(scope, &current, component, None, &self.id)?;
        }
        Ok(current)
    }

    fn mutable_parent(&self, scope: &mut WriteScope<'_>, target: &str) -> Result<(DagNode, String)> {
        let dir = path::dirname(target).ok_or_else(|| FsError::PathSyntax {
            path: target.to_string(),
        })?;
        let name = path::basename(target).ok_or_else(|| FsError::PathSyntax {
            path: target.to_string(),
        })?;
        let parent = self.make_path_mutable(scope, dir)?;
        Ok((parent, name.to_string()))
    }

    fn record_change(
        &self,
        scope: &mut WriteScope<'_>,
        target: &str,
        kind: ChangeKind,
        node: Option<&DagNode>,
        text_mod: bool,
        prop_mod: bool,
    ) -> Result<()> {
        changes::add_change(
            scope,
            &self.id,
            ChangeRecord {
                path: target.to_string(),
                kind,
                node_rev: node.map(|n| n.id.clone()),
                text_mod,
                prop_mod,
            },
        )
    }

    /// Create an empty file
    pub fn make_file(&self, target: &str) -> Result<()> {
        let target = path::canonicalize(target)?;
        self.store.write(|scope| {
            let (parent, name) = self.mutable_parent(scope, &target)?;
            let node = self.ops().make_file(scope, &parent, &name, &self.id)?;
            self.record_change(scope, &target, ChangeKind::Add, Some(&node), false, false)
        })
    }

    /// Create an empty directory
    pub fn make_dir(&self, target: &str) -> Result<()> {
        let target = path::canonicalize(target)?;
        self.store.write(|scope| {
            let (parent, name) = self.mutable_parent(scope, &target)?;
            let node = self.ops().make_dir(scope, &parent, &name, &self.id)?;
            self.record_change(scope, &target, ChangeKind::Add, Some(&node), false, false)
        })
    }

    /// Delete an entry (recursively for directories)
    pub fn delete(&self, target: &str) -> Result<()> {
        let target = path::canonicalize(target)?;
        if target == "/" {
            return Err(FsError::PathSyntax { path: target });
        }
        self.store.write(|scope| {
            let (parent, name) = self.mutable_parent(scope, &target)?;
            self.ops().delete_entry(scope, &parent, &name, &self.id)?;
            self.record_change(scope, &target, ChangeKind::Delete, None, false, false)
        })
    }

    /// Copy a node from a committed revision into this transaction
    pub fn copy(&self, from_rev: Revnum, from_path: &str, to_path: &str) -> Result<()> {
        self.copy_inner(from_rev, from_path, to_path, true)
    }

    /// Copy without preserving history: the destination entry simply
    /// names the source node-revision
    pub fn cheap_copy(&self, from_rev: Revnum, from_path: &str, to_path: &str) -> Result<()> {
        self.copy_inner(from_rev, from_path, to_path, false)
    }

    fn copy_inner(
        &self,
        from_rev: Revnum,
        from_path: &str,
        to_path: &str,
        preserve_history: bool,
    ) -> Result<()> {
        let from_path = path::canonicalize(from_path)?;
        let to_path = path::canonicalize(to_path)?;
        let ops = self.ops();
        self.store.write(|scope| {
            let from_root = ops.revision_root(scope, from_rev)?;
            let source =
                resolve(scope, &ops, &from_root, &from_path)?.ok_or(FsError::PathNotFound {
                    path: from_path.clone(),
                })?;
            let (parent, name) = self.mutable_parent(scope, &to_path)?;
            ops.copy(
                scope,
                &parent,
                &name,
                &source,
                preserve_history,
                &from_path,
                from_rev,
                &self.id,
            )?;
            let copied = ops.open(scope, &parent, &name)?.ok_or_else(|| {
                FsError::corrupt(format!("copy destination '{}' vanished", to_path))
            })?;
            self.record_change(scope, &to_path, ChangeKind::Add, Some(&copied), false, false)
        })
    }

    /// Rename a node within this transaction
    ///
    /// The destination entry names the very same node-revision, so the
    /// node id is preserved; only the directory entries move.
    pub fn rename(&self, from_path: &str, to_path: &str) -> Result<()> {
        let from_path = path::canonicalize(from_path)?;
        let to_path = path::canonicalize(to_path)?;
        if from_path == "/" || to_path == "/" {
            return Err(FsError::PathSyntax { path: "/".into() });
        }
        // Moving a directory into its own sub-tree would orphan a cycle.
        if path::is_ancestor_or_self(&from_path, &to_path) {
            return Err(FsError::PathSyntax { path: to_path });
        }
        let ops = self.ops();
        self.store.write(|scope| {
            let (from_parent, from_name) = self.mutable_parent(scope, &from_path)?;
            let node = ops
                .open(scope, &from_parent, &from_name)?
                .ok_or(FsError::PathNotFound {
                    path: from_path.clone(),
                })?;
            let (to_parent, to_name) = self.mutable_parent(scope, &to_path)?;
            if ops.open(scope, &to_parent, &to_name)?.is_some() {
                return Err(FsError::AlreadyExists {
                    path: to_path.clone(),
                });
            }
            ops.set_entry(scope, &to_parent, &to_name, &node.id, node.kind, &self.id)?;
            ops.unlink_entry(scope, &from_parent, &from_name, &self.id)?;
            self.record_change(scope, &from_path, ChangeKind::Delete, None, false, false)?;
            self.record_change(scope, &to_path, ChangeKind::Add, Some(&node), false, false)
        })
    }

    /// Replace a file's contents
    pub fn write_file(&self, target: &str, bytes: &[u8]) -> Result<()> {
        let target = path::canonicalize(target)?;
        self.store.write(|scope| {
            let node = self.make_path_mutable(scope, &target)?;
            let config = self.store.config();
            let cancel = self.store.cancel();
            contents::file_clear(scope, config, cancel, &node, &self.id)?;
            contents::file_append(scope, config, cancel, &node, bytes, &self.id)?;
            self.record_change(scope, &target, ChangeKind::Modify, Some(&node), true, false)
        })
    }

    /// Apply an svndiff stream against the file's current contents
    ///
    /// `base_checksum` guards the writer's idea of the base text; the
    /// decoded windows are applied in order and the reconstructed text
    /// replaces the file's contents.
    pub fn apply_text(
        &self,
        target: &str,
        base_checksum: Option<&Checksum>,
        svndiff: &[u8],
    ) -> Result<()> {
        let target = path::canonicalize(target)?;
        self.store.write(|scope| {
            let node = self.make_path_mutable(scope, &target)?;
            let config = self.store.config();
            let cancel = self.store.cancel();
            let base = contents::file_contents(scope, config, cancel, &node)?;
            if let Some(expected) = base_checksum {
                expected.verify(&base)?;
            }
            let mut new_contents = Vec::new();
            for window in decode_stream(svndiff)? {
                let start = (window.sview_offset as usize).min(base.len());
                let end = start.saturating_add(window.sview_len).min(base.len());
                let source_view = &base[start..end];
                new_contents.extend_from_slice(&window.apply(source_view)?);
            }
            contents::file_clear(scope, config, cancel, &node, &self.id)?;
            contents::file_append(scope, config, cancel, &node, &new_contents, &self.id)?;
            self.record_change(scope, &target, ChangeKind::Modify, Some(&node), true, false)
        })
    }

    /// Verify a file's final contents against the writer's checksum
    pub fn finalize_file(&self, target: &str, expected: Option<&Checksum>) -> Result<()> {
        let target = path::canonicalize(target)?;
        self.store.read(|view| {
            let node = self.require_node(view, &target)?;
            contents::finalize_edits(
                view,
                self.store.config(),
                self.store.cancel(),
                &node,
                expected,
            )
        })
    }

    /// Set or delete one node property
    pub fn set_node_prop(&self, target: &str, name: &str, value: Option<&[u8]>) -> Result<()> {
        let target = path::canonicalize(target)?;
        self.store.write(|scope| {
            let node = self.make_path_mutable(scope, &target)?;
            let config = self.store.config();
            let cancel = self.store.cancel();
            let mut props = dag_node::proplist(scope, config, cancel, &node)?;
            match value {
                Some(v) => {
                    props.insert(name.to_string(), v.to_vec());
                }
                None => {
                    props.remove(name);
                }
            }
            dag_node::set_proplist(scope, config, cancel, &node, &self.id, &props)?;
            self.record_change(scope, &target, ChangeKind::Modify, Some(&node), false, true)
        })
    }

    // =========================================================================
    // Commit and abort
    // =========================================================================

    /// Commit this transaction, producing the next revision
    ///
    /// Merges newer commits into the transaction first; a conflict leaves
    /// the transaction unchanged and openable.
    pub fn commit(&self) -> Result<Revnum> {
        commit::commit_txn(self)
    }

    /// Abort this transaction, purging everything it created
    pub fn abort(self) -> Result<()> {
        let ops = DagOps {
            config: self.store.config(),
            cancel: self.store.cancel(),
        };
        self.store.write(|scope| {
            let record = txns::get_txn(scope, &self.id)?;
            // The root clone, if any, owns every node-revision the
            // transaction created.
            ops.delete_if_mutable(scope, &record.root_id, &self.id)?;
            changes::purge_changes(scope, &self.id)?;
            txns::delete_txn(scope, &self.id)
        })?;
        tracing::debug!(txn = %self.id, "aborted transaction");
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction").field("id", &self.id).finish()
    }
}
