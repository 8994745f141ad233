//! Path locking for chronofs
//!
//! Advisory locks restricting write access to named file paths. Each lock
//! lives in a digest record keyed by the MD5 of its canonical path;
//! interior directories carry ancestor indices listing their lock-bearing
//! descendants, so a commit can discover every relevant lock from any
//! ancestor in one walk. The commit engine calls
//! [`allow_locked_operation`] for every path its transaction touches.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod store;
pub mod types;

pub use store::{allow_locked_operation, get_lock, get_locks, lock, unlock, verify_lock, LockDepth, LockParams};
pub use types::{digest_of, generate_token, DigestRecord, Lock};
