//! Node-revision records
//!
//! A node-revision is the complete, immutable state of one node at one
//! point in history. The record stores the node's kind, where its
//! properties and data live in the representation store, its predecessor
//! on the same node, its copy origin when it was created by a
//! history-preserving copy, and the canonical path at which it was
//! created.

use crate::id::{NodeRevisionId, Revnum};
use crate::rep::RepKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A regular file
    File,
    /// A directory
    Dir,
}

impl NodeKind {
    /// True for directories
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Dir)
    }
}

/// Where a copied node came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOrigin {
    /// Canonical source path of the copy
    pub path: String,
    /// Source revision of the copy
    pub rev: Revnum,
}

/// One node-revision record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRevision {
    /// File or directory
    pub kind: NodeKind,
    /// Canonical path at which this node-revision was created
    pub created_path: String,
    /// The previous revision of this node, if any
    pub predecessor: Option<NodeRevisionId>,
    /// Hops back to the node's origin; None when unknown
    pub predecessor_count: Option<u64>,
    /// Representation holding the property list, if any
    pub props_rep: Option<RepKey>,
    /// Representation holding file contents or serialized directory
    /// entries, if any
    pub data_rep: Option<RepKey>,
    /// Set when this node-revision was created by a history-preserving
    /// copy
    pub copy_origin: Option<CopyOrigin>,
    /// True if the node carries mergeinfo of its own
    pub has_mergeinfo: bool,
    /// Number of nodes at or under this one with mergeinfo
    pub mergeinfo_count: u64,
}

impl NodeRevision {
    /// A fresh record with no representations and no history
    pub fn new(kind: NodeKind, created_path: impl Into<String>) -> Self {
        NodeRevision {
            kind,
            created_path: created_path.into(),
            predecessor: None,
            predecessor_count: Some(0),
            props_rep: None,
            data_rep: None,
            copy_origin: None,
            has_mergeinfo: false,
            mergeinfo_count: 0,
        }
    }
}

/// One directory entry: the child's full node-revision id plus its kind
///
/// Entries name children by full id, never by node id alone; an unchanged
/// sub-tree therefore shares the exact same id across revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Full node-revision id of the child
    pub id: NodeRevisionId,
    /// Kind of the child
    pub kind: NodeKind,
}

/// Serialized form of a directory's contents
pub type DirEntries = BTreeMap<String, DirEntry>;

/// A property list, as stored in a props representation
pub type PropList = BTreeMap<String, Vec<u8>>;

/// Reserved revision property: the log message
pub const PROP_REVISION_LOG: &str = "svn:log";
/// Reserved revision property: the author
pub const PROP_REVISION_AUTHOR: &str = "svn:author";
/// Reserved revision property: the commit timestamp (RFC 3339 UTC)
pub const PROP_REVISION_DATE: &str = "svn:date";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ChangeSetId, CopyId, NodeId, NodeRevisionId};

    #[test]
    fn fresh_record_has_origin_count_zero() {
        let nr = NodeRevision::new(NodeKind::File, "/a");
        assert_eq!(nr.predecessor_count, Some(0));
        assert!(nr.predecessor.is_none());
        assert!(nr.data_rep.is_none());
        assert!(nr.copy_origin.is_none());
    }

    #[test]
    fn records_round_trip_through_bincode() {
        let mut nr = NodeRevision::new(NodeKind::Dir, "/trunk");
        nr.predecessor = Some(NodeRevisionId::new(
            NodeId::new("4"),
            CopyId::new("0"),
            ChangeSetId::Rev(3),
        ));
        nr.predecessor_count = Some(7);
        nr.copy_origin = Some(CopyOrigin {
            path: "/branches/b".into(),
            rev: 2,
        });
        let bytes = bincode::serialize(&nr).unwrap();
        let back: NodeRevision = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, nr);
    }
}
