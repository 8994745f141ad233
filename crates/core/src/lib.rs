//! Core types for the chronofs engine
//!
//! This crate defines the vocabulary shared by every layer of the
//! versioned filesystem: node-revision identifiers, node-revision and
//! representation records, repository paths, content checksums, the error
//! taxonomy with its stable numeric kinds, configuration, and cooperative
//! cancellation.
//!
//! Nothing here touches storage; the records are plain data with `serde`
//! derives, serialized with `bincode` by the storage layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod checksum;
pub mod config;
pub mod error;
pub mod id;
pub mod noderev;
pub mod path;
pub mod rep;

pub use cancel::{Cancel, CancelFn};
pub use checksum::{Checksum, ChecksumKind};
pub use config::FsConfig;
pub use error::{ErrorKind, FsError, Result};
pub use id::{base36_decode, base36_encode, ChangeSetId, CopyId, NodeId, NodeRevisionId, Revnum, TxnId};
pub use noderev::{
    CopyOrigin, DirEntries, DirEntry, NodeKind, NodeRevision, PropList, PROP_REVISION_AUTHOR,
    PROP_REVISION_DATE, PROP_REVISION_LOG,
};
pub use rep::{DeltaChunk, RepContents, RepKey, Representation, StringKey};
