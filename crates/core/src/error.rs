//! Error types for the chronofs engine
//!
//! This module defines the unified error type used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Each variant maps to a stable numeric [`ErrorKind`]; the numeric codes
//! are part of the API contract and never change once assigned.
//!
//! ## Error Categories
//!
//! - **Path syntax**: malformed path or illegal entry name
//! - **Not found**: no such node, revision, transaction, string, or lock
//! - **Wrong kind**: directory operation on a file or vice versa
//! - **Not mutable**: write attempted on a committed node-revision
//! - **Conflict / out of date**: merge conflicts and stale base revisions
//! - **Lock errors**: token, owner, and existence failures
//! - **Corrupt**: invariant violation detected in persisted data
//! - **Transient**: serialization/busy condition; the retry loop re-runs

use std::io;
use thiserror::Error;

/// Result type alias used across all chronofs crates
pub type Result<T> = std::result::Result<T, FsError>;

/// Stable numeric error kinds
///
/// The discriminants are frozen: they are reported over API boundaries and
/// matched by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    /// Malformed path or illegal entry name
    PathSyntax = 1,
    /// No such node, revision, transaction, string, or property
    NotFound = 2,
    /// Directory operation applied to a non-directory
    NotDirectory = 3,
    /// File operation applied to a non-file
    NotFile = 4,
    /// Write attempted on a committed (immutable) node-revision
    NotMutable = 5,
    /// Add over an existing directory entry
    AlreadyExists = 6,
    /// Merge conflict; the error carries the offending path
    Conflict = 7,
    /// Base revision is older than the created-rev of the target
    OutOfDate = 8,
    /// Content checksum did not match the expected value
    ChecksumMismatch = 9,
    /// Path is already locked by somebody else
    AlreadyLocked = 10,
    /// No lock on the path
    NoSuchLock = 11,
    /// The lock on the path has expired
    LockExpired = 12,
    /// Supplied lock token does not match the lock on the path
    BadLockToken = 13,
    /// Lock is held by a different owner
    LockOwnerMismatch = 14,
    /// Caller is not authorized for the lock operation
    NotAuthorized = 15,
    /// Invariant violation detected in persisted data
    Corrupt = 16,
    /// The caller's cancellation callback fired
    Cancelled = 17,
    /// Underlying storage reported a serialization/busy condition
    Transient = 18,
    /// Failure after the revision was already published
    PostCommit = 19,
    /// Handle configuration rejected at open
    InvalidConfig = 20,
}

/// Error type for all chronofs operations
#[derive(Debug, Error)]
pub enum FsError {
    /// Malformed path
    #[error("invalid path syntax: '{path}'")]
    PathSyntax {
        /// The offending path
        path: String,
    },

    /// Illegal directory-entry name
    #[error("illegal entry name: '{name}'")]
    IllegalName {
        /// The offending name
        name: String,
    },

    /// Path does not exist in the tree being addressed
    #[error("path not found: '{path}'")]
    PathNotFound {
        /// The path that was not found
        path: String,
    },

    /// Revision number out of range
    #[error("no such revision: {revision}")]
    NoSuchRevision {
        /// The revision that was requested
        revision: u64,
    },

    /// Transaction name does not resolve to a live transaction
    #[error("no such transaction: '{name}'")]
    NoSuchTransaction {
        /// The transaction name
        name: String,
    },

    /// String-store key does not exist
    #[error("no such string: '{key}'")]
    NoSuchString {
        /// The string key
        key: String,
    },

    /// Representation key does not exist
    #[error("no such representation: '{key}'")]
    NoSuchRepresentation {
        /// The representation key
        key: String,
    },

    /// Node-revision id does not exist
    #[error("no such node-revision: '{id}'")]
    NoSuchNodeRevision {
        /// The node-revision id in wire form
        id: String,
    },

    /// Directory operation on a non-directory
    #[error("not a directory: '{path}'")]
    NotDirectory {
        /// The offending path
        path: String,
    },

    /// File operation on a non-file
    #[error("not a file: '{path}'")]
    NotFile {
        /// The offending path
        path: String,
    },

    /// Write attempted on a committed node-revision or representation
    #[error("not mutable: {what}")]
    NotMutable {
        /// What was not mutable (id or path, human readable)
        what: String,
    },

    /// Add over an existing entry
    #[error("already exists: '{path}'")]
    AlreadyExists {
        /// The path that already exists
        path: String,
    },

    /// Merge conflict during commit
    #[error("conflict at '{path}'")]
    Conflict {
        /// Path of the conflicting entry, relative to the transaction root
        path: String,
    },

    /// Base revision older than the created-rev of the target
    #[error("out of date: '{path}'")]
    OutOfDate {
        /// The stale path
        path: String,
    },

    /// Checksum verification failure
    #[error("checksum mismatch: expected {expected}, actual {actual}")]
    ChecksumMismatch {
        /// Hex form of the expected digest
        expected: String,
        /// Hex form of the actual digest
        actual: String,
    },

    /// Path is already locked
    #[error("path already locked: '{path}' (owner {owner})")]
    AlreadyLocked {
        /// The locked path
        path: String,
        /// Owner of the existing lock
        owner: String,
    },

    /// No lock on path
    #[error("no lock on path: '{path}'")]
    NoSuchLock {
        /// The path
        path: String,
    },

    /// Lock has expired
    #[error("lock expired on path: '{path}'")]
    LockExpired {
        /// The path
        path: String,
    },

    /// Token mismatch
    #[error("bad lock token for path: '{path}'")]
    BadLockToken {
        /// The path
        path: String,
    },

    /// Owner mismatch
    #[error("lock on '{path}' is owned by '{owner}'")]
    LockOwnerMismatch {
        /// The path
        path: String,
        /// The actual owner of the lock
        owner: String,
    },

    /// Caller lacks authorization for the lock operation
    #[error("not authorized: {message}")]
    NotAuthorized {
        /// Description of the missing authorization
        message: String,
    },

    /// Invariant violation in persisted data
    #[error("corrupt filesystem data: {message}")]
    Corrupt {
        /// Description of the corruption
        message: String,
    },

    /// Cooperative cancellation
    #[error("operation cancelled")]
    Cancelled,

    /// Serialization/busy condition from the underlying store
    #[error("transient storage condition: {message}")]
    Transient {
        /// Description of the condition
        message: String,
    },

    /// The revision was published but a post-commit step failed
    #[error("revision {revision} committed, but post-commit processing failed: {message}")]
    PostCommit {
        /// The revision that was already published
        revision: u64,
        /// Description of the failed step
        message: String,
    },

    /// A filesystem handle was opened with an unusable configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration
        message: String,
    },
}

impl FsError {
    /// Create a Corrupt error
    pub fn corrupt(message: impl Into<String>) -> Self {
        FsError::Corrupt {
            message: message.into(),
        }
    }

    /// Create a Transient error
    pub fn transient(message: impl Into<String>) -> Self {
        FsError::Transient {
            message: message.into(),
        }
    }

    /// Create a NotMutable error
    pub fn not_mutable(what: impl Into<String>) -> Self {
        FsError::NotMutable { what: what.into() }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        FsError::InvalidConfig {
            message: message.into(),
        }
    }

    /// The stable numeric kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::PathSyntax { .. } | FsError::IllegalName { .. } => ErrorKind::PathSyntax,
            FsError::PathNotFound { .. }
            | FsError::NoSuchRevision { .. }
            | FsError::NoSuchTransaction { .. }
            | FsError::NoSuchString { .. }
            | FsError::NoSuchRepresentation { .. }
            | FsError::NoSuchNodeRevision { .. } => ErrorKind::NotFound,
            FsError::NotDirectory { .. } => ErrorKind::NotDirectory,
            FsError::NotFile { .. } => ErrorKind::NotFile,
            FsError::NotMutable { .. } => ErrorKind::NotMutable,
            FsError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            FsError::Conflict { .. } => ErrorKind::Conflict,
            FsError::OutOfDate { .. } => ErrorKind::OutOfDate,
            FsError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            FsError::AlreadyLocked { .. } => ErrorKind::AlreadyLocked,
            FsError::NoSuchLock { .. } => ErrorKind::NoSuchLock,
            FsError::LockExpired { .. } => ErrorKind::LockExpired,
            FsError::BadLockToken { .. } => ErrorKind::BadLockToken,
            FsError::LockOwnerMismatch { .. } => ErrorKind::LockOwnerMismatch,
            FsError::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            FsError::Corrupt { .. } => ErrorKind::Corrupt,
            FsError::Cancelled => ErrorKind::Cancelled,
            FsError::Transient { .. } => ErrorKind::Transient,
            FsError::PostCommit { .. } => ErrorKind::PostCommit,
            FsError::InvalidConfig { .. } => ErrorKind::InvalidConfig,
        }
    }

    /// The stable numeric code of this error
    pub fn code(&self) -> u32 {
        self.kind() as u32
    }

    /// Check if this error should be retried by the storage retry loop
    pub fn is_transient(&self) -> bool {
        matches!(self, FsError::Transient { .. })
    }

    /// Check if this error is a merge conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, FsError::Conflict { .. })
    }

    /// Check if this is a "not found" type error
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this error belongs to the lock family
    pub fn is_lock_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AlreadyLocked
                | ErrorKind::NoSuchLock
                | ErrorKind::LockExpired
                | ErrorKind::BadLockToken
                | ErrorKind::LockOwnerMismatch
                | ErrorKind::NotAuthorized
        )
    }
}

impl From<bincode::Error> for FsError {
    fn from(e: bincode::Error) -> Self {
        FsError::Corrupt {
            message: format!("record encoding: {}", e),
        }
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        FsError::Corrupt {
            message: format!("I/O: {}", e),
        }
    }
}
