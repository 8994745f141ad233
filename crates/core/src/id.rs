//! Node-revision identifiers
//!
//! A node-revision id is the triple `(node-id, copy-id, change-set-id)`.
//! The first two components are opaque base36 keys allocated by the
//! node-revision store; the third names the change set that created the
//! revision, either a live transaction (mutable) or a committed revision
//! (immutable).
//!
//! Two node-revisions are *related* iff their node ids match; they are on
//! the *same line of history* iff both node id and copy id match.
//!
//! ## Wire form
//!
//! Three dotted base36 parts; the third is prefixed `t` for transactions
//! and `r` for revisions: `3.1.r17`, `5.2.tb`.

use crate::error::{FsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Revision number. Revisions are numbered 0, 1, 2, … without gaps.
pub type Revnum = u64;

/// Encode a counter value as a lower-case base36 string
pub fn base36_encode(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = [0u8; 13];
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    String::from_utf8_lossy(&buf[i..]).into_owned()
}

/// Decode a lower-case base36 string
pub fn base36_decode(s: &str) -> Result<u64> {
    if s.is_empty() {
        return Err(FsError::corrupt("empty base36 key"));
    }
    let mut n: u64 = 0;
    for c in s.chars() {
        let d = match c {
            '0'..='9' => c as u64 - '0' as u64,
            'a'..='z' => c as u64 - 'a' as u64 + 10,
            _ => {
                return Err(FsError::corrupt(format!("invalid base36 key '{}'", s)));
            }
        };
        n = n
            .checked_mul(36)
            .and_then(|n| n.checked_add(d))
            .ok_or_else(|| FsError::corrupt(format!("base36 key '{}' overflows", s)))?;
    }
    Ok(n)
}

macro_rules! base36_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wrap an already-allocated base36 key
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// The raw key string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

base36_key! {
    /// Identity of a node across all its revisions
    NodeId
}

base36_key! {
    /// Identity of one line of history within a node
    CopyId
}

base36_key! {
    /// Identity of a live transaction
    TxnId
}

/// The change set that created a node-revision
///
/// A transaction tag means the node-revision is still mutable; a revision
/// tag means it is frozen forever.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeSetId {
    /// Created inside a live transaction; mutable under that transaction
    Txn(TxnId),
    /// Created by a committed revision; immutable
    Rev(Revnum),
}

impl ChangeSetId {
    /// True for transaction-tagged change sets
    pub fn is_txn(&self) -> bool {
        matches!(self, ChangeSetId::Txn(_))
    }

    /// The transaction id, if this is a transaction tag
    pub fn txn_id(&self) -> Option<&TxnId> {
        match self {
            ChangeSetId::Txn(t) => Some(t),
            ChangeSetId::Rev(_) => None,
        }
    }

    /// The revision number, if this is a revision tag
    pub fn revision(&self) -> Option<Revnum> {
        match self {
            ChangeSetId::Txn(_) => None,
            ChangeSetId::Rev(r) => Some(*r),
        }
    }
}

impl fmt::Display for ChangeSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeSetId::Txn(t) => write!(f, "t{}", t),
            ChangeSetId::Rev(r) => write!(f, "r{}", base36_encode(*r)),
        }
    }
}

/// A full node-revision id: `(node-id, copy-id, change-set-id)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRevisionId {
    /// Node identity; shared across all revisions of the node
    pub node_id: NodeId,
    /// Line-of-history identity within the node
    pub copy_id: CopyId,
    /// The change set that created this revision
    pub change_set: ChangeSetId,
}

impl NodeRevisionId {
    /// Assemble an id from its parts
    pub fn new(node_id: NodeId, copy_id: CopyId, change_set: ChangeSetId) -> Self {
        Self {
            node_id,
            copy_id,
            change_set,
        }
    }

    /// True if this id belongs to a live transaction
    pub fn is_txn(&self) -> bool {
        self.change_set.is_txn()
    }

    /// True if this id is mutable under the given transaction
    pub fn is_txn_id(&self, txn_id: &TxnId) -> bool {
        self.change_set.txn_id() == Some(txn_id)
    }

    /// Two node-revisions are related iff they share a node id
    pub fn is_related(&self, other: &NodeRevisionId) -> bool {
        self.node_id == other.node_id
    }

    /// Same line of history: node id and copy id both match
    pub fn same_line_of_history(&self, other: &NodeRevisionId) -> bool {
        self.node_id == other.node_id && self.copy_id == other.copy_id
    }

    /// Return this id re-tagged with the given committed revision
    pub fn with_revision(&self, rev: Revnum) -> NodeRevisionId {
        NodeRevisionId {
            node_id: self.node_id.clone(),
            copy_id: self.copy_id.clone(),
            change_set: ChangeSetId::Rev(rev),
        }
    }

    /// Parse the dotted wire form
    pub fn parse(s: &str) -> Result<NodeRevisionId> {
        let bad = || FsError::corrupt(format!("malformed node-revision id '{}'", s));
        let mut parts = s.split('.');
        let node = parts.next().ok_or_else(bad)?;
        let copy = parts.next().ok_or_else(bad)?;
        let cset = parts.next().ok_or_else(bad)?;
        if parts.next().is_some() || node.is_empty() || copy.is_empty() {
            return Err(bad());
        }
        base36_decode(node)?;
        base36_decode(copy)?;
        let change_set = if let Some(rest) = cset.strip_prefix('t') {
            base36_decode(rest)?;
            ChangeSetId::Txn(TxnId::new(rest))
        } else if let Some(rest) = cset.strip_prefix('r') {
            ChangeSetId::Rev(base36_decode(rest)?)
        } else {
            return Err(bad());
        };
        Ok(NodeRevisionId {
            node_id: NodeId::new(node),
            copy_id: CopyId::new(copy),
            change_set,
        })
    }
}

impl fmt::Display for NodeRevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.node_id, self.copy_id, self.change_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_round_trip() {
        for n in [0u64, 1, 9, 10, 35, 36, 1295, 1296, u64::from(u32::MAX)] {
            assert_eq!(base36_decode(&base36_encode(n)).unwrap(), n);
        }
        assert_eq!(base36_encode(0), "0");
        assert_eq!(base36_encode(35), "z");
        assert_eq!(base36_encode(36), "10");
    }

    #[test]
    fn base36_rejects_garbage() {
        assert!(base36_decode("").is_err());
        assert!(base36_decode("A1").is_err());
        assert!(base36_decode("1.2").is_err());
    }

    fn rev_id(n: &str, c: &str, r: Revnum) -> NodeRevisionId {
        NodeRevisionId::new(NodeId::new(n), CopyId::new(c), ChangeSetId::Rev(r))
    }

    #[test]
    fn wire_form_round_trip() {
        let id = rev_id("3", "1", 43);
        assert_eq!(id.to_string(), "3.1.r17");
        assert_eq!(NodeRevisionId::parse("3.1.r17").unwrap(), id);

        let txn = NodeRevisionId::new(
            NodeId::new("a"),
            CopyId::new("0"),
            ChangeSetId::Txn(TxnId::new("b")),
        );
        assert_eq!(txn.to_string(), "a.0.tb");
        assert_eq!(NodeRevisionId::parse("a.0.tb").unwrap(), txn);
    }

    #[test]
    fn wire_form_rejects_malformed() {
        for s in ["", "3", "3.1", "3.1.17", "3.1.x17", "3.1.r", "3.1.r17.9", "3..r1"] {
            assert!(NodeRevisionId::parse(s).is_err(), "accepted {:?}", s);
        }
    }

    #[test]
    fn relatedness_and_line_of_history() {
        let a = rev_id("3", "1", 4);
        let b = rev_id("3", "2", 7);
        let c = rev_id("4", "1", 7);
        assert!(a.is_related(&b));
        assert!(!a.is_related(&c));
        assert!(!a.same_line_of_history(&b));
        assert!(a.same_line_of_history(&rev_id("3", "1", 9)));
    }

    #[test]
    fn retag_with_revision() {
        let id = NodeRevisionId::new(
            NodeId::new("5"),
            CopyId::new("0"),
            ChangeSetId::Txn(TxnId::new("7")),
        );
        assert!(id.is_txn());
        let frozen = id.with_revision(12);
        assert!(!frozen.is_txn());
        assert_eq!(frozen.change_set.revision(), Some(12));
        assert!(id.same_line_of_history(&frozen));
    }
}
