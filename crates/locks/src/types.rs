//! Lock records and digest files
//!
//! Each lock lives in a digest record keyed by the MD5 of its canonical
//! path. Interior directories carry *ancestor index* records under the
//! same keying: a children list naming the digests of direct descendants
//! that are locked or have lock-bearing sub-trees. (The on-disk rendition
//! shards digests into a two-level directory by their first three hex
//! characters; over an ordered KV table that collapses to a flat
//! digest-keyed table, keeping the ancestor-index rule.)

use chrono::{DateTime, Utc};
use chronofs_core::Checksum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One path lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Canonical locked path
    pub path: String,
    /// Opaque lock token
    pub token: String,
    /// Username the lock belongs to
    pub owner: String,
    /// Optional free-form comment
    pub comment: Option<String>,
    /// When the lock was taken
    pub creation_date: DateTime<Utc>,
    /// When the lock lapses, if ever
    pub expiration_date: Option<DateTime<Utc>>,
}

impl Lock {
    /// True once the expiration date has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiration_date, Some(expires) if expires <= now)
    }
}

/// One digest record: a lock, an ancestor index, or both
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestRecord {
    /// The lock on this exact path, if any
    pub lock: Option<Lock>,
    /// Digests of direct descendants that carry locks or lock-bearing
    /// sub-trees
    pub children: BTreeSet<String>,
}

impl DigestRecord {
    /// True when the record holds nothing and can be pruned
    pub fn is_empty(&self) -> bool {
        self.lock.is_none() && self.children.is_empty()
    }
}

/// The digest key of a canonical path
pub fn digest_of(path: &str) -> String {
    Checksum::Md5(Checksum::md5(path.as_bytes())).to_hex()
}

/// Generate a fresh lock token
pub fn generate_token() -> String {
    format!("opaquelocktoken:{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn digests_are_md5_hex_of_the_path() {
        // MD5("/") as a fixed point for the digest scheme.
        assert_eq!(digest_of("/"), "6666cd76f96956469e7be39d750cc7d9");
        assert_eq!(digest_of("/a"), digest_of("/a"));
        assert_ne!(digest_of("/a"), digest_of("/b"));
    }

    #[test]
    fn tokens_are_unique_and_tagged() {
        let a = generate_token();
        let b = generate_token();
        assert!(a.starts_with("opaquelocktoken:"));
        assert_ne!(a, b);
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let now = Utc::now();
        let mut lock = Lock {
            path: "/f".into(),
            token: generate_token(),
            owner: "alice".into(),
            comment: None,
            creation_date: now,
            expiration_date: None,
        };
        assert!(!lock.is_expired(now));
        lock.expiration_date = Some(now - Duration::seconds(1));
        assert!(lock.is_expired(now));
        lock.expiration_date = Some(now + Duration::seconds(60));
        assert!(!lock.is_expired(now));
    }

    #[test]
    fn empty_records_prune() {
        let mut record = DigestRecord::default();
        assert!(record.is_empty());
        record.children.insert(digest_of("/a"));
        assert!(!record.is_empty());
    }
}
