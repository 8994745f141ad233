//! Storage layer for chronofs
//!
//! This crate implements the engine's persistent tables over an ordered
//! key/value store with ACID write scopes:
//!
//! - **strings**: opaque, append-extendable byte blobs
//! - **reps**: representation records, the delta-chain reader, and
//!   post-commit deltification
//! - **nodes**: the append-only node-revision store
//! - **revisions**: the revision index and revision properties
//! - **txns**: transaction records
//! - **copies**: copy-origin metadata per copy id
//! - **changes**: per-change-set path change lists
//!
//! [`FsStore`] is the handle type tying a set of tables to a
//! configuration, a cancellation hook, and the repository write lock.
//! All writes run inside retry-wrapped ACID scopes; see the `kv` module.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod changes;
pub mod copies;
pub mod keys;
pub mod kv;
pub mod nodes;
pub mod reps;
pub mod revisions;
pub mod store;
pub mod strings;
pub mod txns;

pub use changes::{ChangeKind, ChangeRecord};
pub use copies::CopyRecord;
pub use kv::{with_retry, Kv, KvRead, ReadView, Table, WriteScope};
pub use revisions::Revision;
pub use store::{now_rfc3339, FsStore};
pub use txns::TxnRecord;
