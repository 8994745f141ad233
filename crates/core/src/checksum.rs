//! Content checksums
//!
//! The engine verifies file contents with MD5 and SHA-1 digests. MD5 is
//! the primary kind: it keys the lock digest files and is carried in every
//! delta chunk. SHA-1 is offered as the second checksum kind over the
//! public API.

use crate::error::{FsError, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumKind {
    /// 16-byte MD5 digest
    Md5,
    /// 20-byte SHA-1 digest
    Sha1,
}

/// A computed digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Checksum {
    /// MD5 digest bytes
    Md5([u8; 16]),
    /// SHA-1 digest bytes
    Sha1([u8; 20]),
}

impl Checksum {
    /// Digest the given bytes with the requested algorithm
    pub fn compute(kind: ChecksumKind, data: &[u8]) -> Checksum {
        match kind {
            ChecksumKind::Md5 => Checksum::Md5(md5::compute(data).0),
            ChecksumKind::Sha1 => {
                let digest = Sha1::digest(data);
                let mut bytes = [0u8; 20];
                bytes.copy_from_slice(&digest);
                Checksum::Sha1(bytes)
            }
        }
    }

    /// MD5 digest of the given bytes
    pub fn md5(data: &[u8]) -> [u8; 16] {
        md5::compute(data).0
    }

    /// The algorithm of this digest
    pub fn kind(&self) -> ChecksumKind {
        match self {
            Checksum::Md5(_) => ChecksumKind::Md5,
            Checksum::Sha1(_) => ChecksumKind::Sha1,
        }
    }

    /// The raw digest bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Checksum::Md5(b) => b,
            Checksum::Sha1(b) => b,
        }
    }

    /// Lower-case hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Parse a hex digest of the given kind
    pub fn parse_hex(kind: ChecksumKind, s: &str) -> Result<Checksum> {
        let bytes = hex::decode(s).map_err(|_| FsError::ChecksumMismatch {
            expected: s.to_string(),
            actual: "<unparsable hex digest>".to_string(),
        })?;
        match (kind, bytes.len()) {
            (ChecksumKind::Md5, 16) => {
                let mut b = [0u8; 16];
                b.copy_from_slice(&bytes);
                Ok(Checksum::Md5(b))
            }
            (ChecksumKind::Sha1, 20) => {
                let mut b = [0u8; 20];
                b.copy_from_slice(&bytes);
                Ok(Checksum::Sha1(b))
            }
            _ => Err(FsError::ChecksumMismatch {
                expected: s.to_string(),
                actual: format!("<{} byte digest>", bytes.len()),
            }),
        }
    }

    /// Verify that `actual` content matches this digest
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let actual = Checksum::compute(self.kind(), data);
        if actual == *self {
            Ok(())
        } else {
            Err(FsError::ChecksumMismatch {
                expected: self.to_hex(),
                actual: actual.to_hex(),
            })
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind(), self.to_hex())
    }
}
