//! Revision roots
//!
//! A [`Root`] pins a committed revision and exposes its tree read-only.
//! Everything reachable from it is frozen: two independent opens of the
//! same `(revision, path)` yield the same node-revision id and the same
//! bytes, forever.

use chronofs_core::{
    path, Checksum, ChecksumKind, CopyOrigin, DirEntries, FsError, NodeKind, NodeRevisionId,
    PropList, Result, Revnum,
};
use chronofs_dag::{contents, node as dag_node, DagNode, DagOps};
use chronofs_storage::{FsStore, KvRead};

/// A read-only handle onto one committed revision's tree
#[derive(Debug, Clone)]
pub struct Root {
    store: FsStore,
    rev: Revnum,
}

impl Root {
    pub(crate) fn new(store: FsStore, rev: Revnum) -> Root {
        Root { store, rev }
    }

    /// The pinned revision number
    pub fn rev(&self) -> Revnum {
        self.rev
    }

    fn ops(&self) -> DagOps<'_> {
        DagOps {
            config: self.store.config(),
            cancel: self.store.cancel(),
        }
    }

    /// Resolve a path to its node, or fail with the full path
    pub fn node(&self, target: &str) -> Result<DagNode> {
        let target = path::canonicalize(target)?;
        let ops = self.ops();
        self.store.read(|view| {
            let root = ops.revision_root(view, self.rev)?;
            resolve(view, &ops, &root, &target)?.ok_or(FsError::PathNotFound { path: target })
        })
    }

    /// The kind of the node at a path, or None when absent
    pub fn check_path(&self, target: &str) -> Result<Option<NodeKind>> {
        let target = path::canonicalize(target)?;
        let ops = self.ops();
        self.store.read(|view| {
            let root = ops.revision_root(view, self.rev)?;
            Ok(resolve(view, &ops, &root, &target)?.map(|n| n.kind))
        })
    }

    /// The full node-revision id at a path
    pub fn node_id(&self, target: &str) -> Result<NodeRevisionId> {
        Ok(self.node(target)?.id)
    }

    /// The revision in which the node at a path was created
    pub fn created_rev(&self, target: &str) -> Result<Revnum> {
        let node = self.node(target)?;
        node.created_rev()
            .ok_or_else(|| FsError::corrupt(format!("committed node at '{}' has a txn tag", target)))
    }

    /// The canonical path at which the node was created
    pub fn created_path(&self, target: &str) -> Result<String> {
        Ok(self.node(target)?.created_path)
    }

    /// Where the node was copied from, if it was created by a
    /// history-preserving copy
    pub fn copy_origin(&self, target: &str) -> Result<Option<CopyOrigin>> {
        let node = self.node(target)?;
        self.store.read(|view| Ok(node.record(view)?.copy_origin))
    }

    /// The entries of a directory
    pub fn dir_entries(&self, target: &str) -> Result<DirEntries> {
        let node = self.node(target)?;
        let ops = self.ops();
        self.store.read(|view| ops.entries(view, &node))
    }

    /// The complete contents of a file
    pub fn file_contents(&self, target: &str) -> Result<Vec<u8>> {
        let node = self.node(target)?;
        self.store.read(|view| {
            contents::file_contents(view, self.store.config(), self.store.cancel(), &node)
        })
    }

    /// Read a range of a file; reads past the end return the suffix
    pub fn file_read_range(&self, target: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
        let node = self.node(target)?;
        self.store.read(|view| {
            contents::file_read_range(
                view,
                self.store.config(),
                self.store.cancel(),
                &node,
                offset,
                len,
            )
        })
    }

    /// The length of a file
    pub fn file_length(&self, target: &str) -> Result<u64> {
        let node = self.node(target)?;
        self.store.read(|view| contents::file_length(view, &node))
    }

    /// The checksum of a file's contents
    pub fn file_checksum(&self, target: &str, kind: ChecksumKind) -> Result<Checksum> {
        let node = self.node(target)?;
        self.store.read(|view| {
            contents::file_checksum(view, self.store.config(), self.store.cancel(), &node, kind)
        })
    }

    /// The property list of a node
    pub fn node_proplist(&self, target: &str) -> Result<PropList> {
        let node = self.node(target)?;
        self.store.read(|view| {
            dag_node::proplist(view, self.store.config(), self.store.cancel(), &node)
        })
    }
}

/// Walk a path from a root node; None when any component is missing
pub(crate) fn resolve(
    view: &impl KvRead,
    ops: &DagOps<'_>,
    root: &DagNode,
    target: &str,
) -> Result<Option<DagNode>> {
    let mut current = root.clone();
    for component in path::components(target) {
        if !current.is_dir() {
            return Ok(None);
        }
        match ops.open(view, &current, component)? {
            Some(child) => current = child,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}
