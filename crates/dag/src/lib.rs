//! The DAG layer of chronofs
//!
//! A typed view over node-revisions: immutable [`DagNode`] handles,
//! directory entry lists, clone-on-write tree mutation, and file content
//! streams. Mutation returns new handles rather than updating old ones;
//! after an ancestor directory has been cloned, stale handles must be
//! re-opened by path.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contents;
pub mod dir;
pub mod node;
pub mod ops;

pub use node::DagNode;
pub use ops::DagOps;
