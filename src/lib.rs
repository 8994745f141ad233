//! # chronofs
//!
//! A versioned filesystem engine: a content-addressed, transactional,
//! append-only store of directory trees whose history is preserved
//! forever. Clients begin a transaction against a base revision, mutate a
//! working copy of the tree, and commit atomically to produce the next
//! immutable revision. Readers open any historical revision as a virtual
//! root and traverse it by path.
//!
//! # Quick Start
//!
//! ```
//! use chronofs::{Filesystem, FsConfig};
//!
//! fn main() -> chronofs::Result<()> {
//!     let fs = Filesystem::create(FsConfig::default())?;
//!
//!     // Revision 0 is the empty root.
//!     assert_eq!(fs.youngest_rev()?, 0);
//!
//!     // Mutate through a transaction, commit atomically.
//!     let txn = fs.begin_txn(0)?;
//!     txn.make_file("/hello.txt")?;
//!     txn.write_file("/hello.txt", b"hi\n")?;
//!     let rev = txn.commit()?;
//!     assert_eq!(rev, 1);
//!
//!     // Read any revision forever after.
//!     let root = fs.revision_root(1)?;
//!     assert_eq!(root.file_contents("/hello.txt")?, b"hi\n");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! | Layer | Crate | Responsibility |
//! |-------|-------|----------------|
//! | Facade | `chronofs` | Re-exports; the stable public surface |
//! | Engine | `chronofs-engine` | Transactions, editor protocol, three-way merge, atomic commit |
//! | Locks | `chronofs-locks` | Digest-keyed path locks with ancestor indices |
//! | DAG | `chronofs-dag` | Typed node handles, clone-on-write tree mutation |
//! | Storage | `chronofs-storage` | Strings, representations, delta chains, tables, retry loop |
//! | Delta | `chronofs-delta` | svndiff windows: codec and block-match generator |
//! | Core | `chronofs-core` | Ids, records, paths, checksums, errors, config |
//!
//! History is append-only: deletion removes a directory entry, but the
//! addressed node-revisions remain reachable through prior revisions.

pub use chronofs_core::{
    Cancel, CancelFn, ChangeSetId, Checksum, ChecksumKind, CopyId, CopyOrigin, DirEntries,
    DirEntry, ErrorKind, FsConfig, FsError, NodeId, NodeKind, NodeRevision, NodeRevisionId,
    PropList, RepKey, Result, Revnum, StringKey, TxnId, PROP_REVISION_AUTHOR, PROP_REVISION_DATE,
    PROP_REVISION_LOG,
};
pub use chronofs_engine::{
    autocommit, AccessContext, DirBaton, FileBaton, Filesystem, Root, TextDeltaSink, Transaction,
    TxnEditor,
};
pub use chronofs_locks::{Lock, LockDepth, LockParams};
pub use chronofs_storage::{ChangeKind, ChangeRecord};
