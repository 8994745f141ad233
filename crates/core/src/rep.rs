//! Representation records
//!
//! A representation describes how to obtain a byte stream: either a
//! fulltext (a single string-store key) or a delta, an ordered list of
//! chunks, each reconstructing a contiguous range of the fulltext from an
//! svndiff window stored in the string store, applied against a source
//! representation.
//!
//! A representation carrying a transaction tag is still mutable within
//! that transaction; mutable representations are always fulltexts.

use crate::id::TxnId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key of a blob in the string store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StringKey(String);

impl StringKey {
    /// Wrap an allocated string key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StringKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque key of a record in the representation store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepKey(String);

impl RepKey {
    /// Wrap an allocated representation key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One chunk of a delta representation
///
/// Chunks are kept in strictly ascending `text_offset` order and
/// consecutive chunks are contiguous, so together they cover the
/// reconstructed fulltext without gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaChunk {
    /// Offset of the reconstructed range within the fulltext
    pub text_offset: u64,
    /// Length of the reconstructed range
    pub text_length: u64,
    /// Representation the window's source view reads from
    pub source: RepKey,
    /// String holding this chunk's svndiff window (header stripped)
    pub window_key: StringKey,
    /// MD5 digest of the complete fulltext this chunk belongs to
    pub md5: [u8; 16],
}

/// How the bytes of a representation are stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepContents {
    /// The complete bytes live in one string
    Fulltext {
        /// Key of the string holding the bytes
        string_key: StringKey,
    },
    /// The bytes are reconstructed from svndiff windows against a source
    /// representation
    Delta {
        /// Ordered chunk list; never empty
        chunks: Vec<DeltaChunk>,
    },
}

/// A representation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representation {
    /// Present while the representation is mutable within a transaction
    pub txn_id: Option<TxnId>,
    /// Fulltext or delta storage
    pub contents: RepContents,
}

impl Representation {
    /// A fulltext representation over the given string
    pub fn fulltext(string_key: StringKey, txn_id: Option<TxnId>) -> Self {
        Representation {
            txn_id,
            contents: RepContents::Fulltext { string_key },
        }
    }

    /// True if this representation is mutable under the given transaction
    pub fn is_mutable(&self, txn_id: &TxnId) -> bool {
        self.txn_id.as_ref() == Some(txn_id)
    }

    /// True for fulltext representations
    pub fn is_fulltext(&self) -> bool {
        matches!(self.contents, RepContents::Fulltext { .. })
    }

    /// Every string key this representation references
    pub fn string_keys(&self) -> Vec<StringKey> {
        match &self.contents {
            RepContents::Fulltext { string_key } => vec![string_key.clone()],
            RepContents::Delta { chunks } => {
                chunks.iter().map(|c| c.window_key.clone()).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutability_is_per_transaction() {
        let mine = TxnId::new("5");
        let theirs = TxnId::new("6");
        let rep = Representation::fulltext(StringKey::new("a"), Some(mine.clone()));
        assert!(rep.is_mutable(&mine));
        assert!(!rep.is_mutable(&theirs));

        let frozen = Representation::fulltext(StringKey::new("a"), None);
        assert!(!frozen.is_mutable(&mine));
    }

    #[test]
    fn string_keys_of_delta_are_the_window_keys() {
        let chunk = |off, key: &str| DeltaChunk {
            text_offset: off,
            text_length: 10,
            source: RepKey::new("s"),
            window_key: StringKey::new(key),
            md5: [0; 16],
        };
        let rep = Representation {
            txn_id: None,
            contents: RepContents::Delta {
                chunks: vec![chunk(0, "w0"), chunk(10, "w1")],
            },
        };
        let keys: Vec<_> = rep.string_keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["w0", "w1"]);
        assert!(!rep.is_fulltext());
    }
}
