//! File contents
//!
//! Reading and writing file data through the representation layer. A file
//! with no data representation reads as empty; the first write-through
//! allocates a mutable fulltext for it.

use crate::node::DagNode;
use chronofs_core::{Cancel, Checksum, ChecksumKind, FsConfig, FsError, Result, TxnId};
use chronofs_storage::{nodes, reps, KvRead, WriteScope};

fn require_file(node: &DagNode) -> Result<()> {
    if node.is_dir() {
        return Err(FsError::NotFile {
            path: node.created_path.clone(),
        });
    }
    Ok(())
}

/// The length of a file's contents
pub fn file_length(view: &impl KvRead, node: &DagNode) -> Result<u64> {
    require_file(node)?;
    match node.record(view)?.data_rep {
        Some(key) => reps::rep_contents_size(view, &key),
        None => Ok(0),
    }
}

/// Read `len` bytes of a file starting at `offset`
///
/// Reads past the end return the available suffix.
pub fn file_read_range(
    view: &impl KvRead,
    config: &FsConfig,
    cancel: &Cancel,
    node: &DagNode,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>> {
    require_file(node)?;
    match node.record(view)?.data_rep {
        Some(key) => reps::rep_read_range(view, config, cancel, &key, offset, len),
        None => Ok(Vec::new()),
    }
}

/// The complete contents of a file
pub fn file_contents(
    view: &impl KvRead,
    config: &FsConfig,
    cancel: &Cancel,
    node: &DagNode,
) -> Result<Vec<u8>> {
    require_file(node)?;
    match node.record(view)?.data_rep {
        Some(key) => reps::rep_contents(view, config, cancel, &key),
        None => Ok(Vec::new()),
    }
}

/// Append bytes to a mutable file
pub fn file_append(
    scope: &mut WriteScope<'_>,
    config: &FsConfig,
    cancel: &Cancel,
    node: &DagNode,
    bytes: &[u8],
    txn_id: &TxnId,
) -> Result<()> {
    require_file(node)?;
    if !node.is_mutable(txn_id) {
        return Err(FsError::not_mutable(format!("file '{}'", node.created_path)));
    }
    let mut record = node.record(scope)?;
    let rep_key = reps::get_mutable_rep(scope, config, cancel, record.data_rep.as_ref(), txn_id)?;
    if record.data_rep.as_ref() != Some(&rep_key) {
        record.data_rep = Some(rep_key.clone());
        nodes::put_node_rev(scope, &node.id, &record)?;
    }
    reps::rep_append(scope, &rep_key, bytes, txn_id)
}

/// Discard a mutable file's contents
pub fn file_clear(
    scope: &mut WriteScope<'_>,
    config: &FsConfig,
    cancel: &Cancel,
    node: &DagNode,
    txn_id: &TxnId,
) -> Result<()> {
    require_file(node)?;
    if !node.is_mutable(txn_id) {
        return Err(FsError::not_mutable(format!("file '{}'", node.created_path)));
    }
    let mut record = node.record(scope)?;
    let rep_key = reps::get_mutable_rep(scope, config, cancel, record.data_rep.as_ref(), txn_id)?;
    if record.data_rep.as_ref() != Some(&rep_key) {
        record.data_rep = Some(rep_key.clone());
        nodes::put_node_rev(scope, &node.id, &record)?;
    }
    reps::rep_contents_clear(scope, &rep_key, txn_id)
}

/// The checksum of a file's contents
pub fn file_checksum(
    view: &impl KvRead,
    config: &FsConfig,
    cancel: &Cancel,
    node: &DagNode,
    kind: ChecksumKind,
) -> Result<Checksum> {
    let contents = file_contents(view, config, cancel, node)?;
    Ok(Checksum::compute(kind, &contents))
}

/// Close out a file's edits, verifying the writer's checksum
pub fn finalize_edits(
    view: &impl KvRead,
    config: &FsConfig,
    cancel: &Cancel,
    node: &DagNode,
    expected: Option<&Checksum>,
) -> Result<()> {
    require_file(node)?;
    if let Some(expected) = expected {
        let contents = file_contents(view, config, cancel, node)?;
        expected.verify(&contents)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronofs_core::{CopyId, NodeKind, NodeRevision};
    use chronofs_storage::FsStore;

    fn fixture() -> (FsStore, DagNode, TxnId, FsConfig, Cancel) {
        let store = FsStore::create(FsConfig::default()).unwrap();
        let txn = TxnId::new("0");
        let node = store
            .write(|scope| {
                let id = nodes::create_node(
                    scope,
                    &NodeRevision::new(NodeKind::File, "/f"),
                    &CopyId::new("0"),
                    &txn,
                )?;
                DagNode::get(scope, &id)
            })
            .unwrap();
        (store, node, txn, FsConfig::default(), Cancel::never())
    }

    #[test]
    fn fresh_files_read_as_empty() {
        let (store, node, _txn, config, cancel) = fixture();
        store
            .read(|view| {
                assert_eq!(file_length(view, &node)?, 0);
                assert_eq!(file_contents(view, &config, &cancel, &node)?, b"");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn writes_append_and_ranges_read_back() {
        let (store, node, txn, config, cancel) = fixture();
        store
            .write(|scope| {
                file_append(scope, &config, &cancel, &node, b"hello ", &txn)?;
                file_append(scope, &config, &cancel, &node, b"world", &txn)?;
                Ok(())
            })
            .unwrap();
        store
            .read(|view| {
                assert_eq!(file_length(view, &node)?, 11);
                assert_eq!(file_contents(view, &config, &cancel, &node)?, b"hello world");
                assert_eq!(
                    file_read_range(view, &config, &cancel, &node, 6, 100)?,
                    b"world"
                );
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn clear_discards_contents() {
        let (store, node, txn, config, cancel) = fixture();
        store
            .write(|scope| {
                file_append(scope, &config, &cancel, &node, b"temporary", &txn)?;
                file_clear(scope, &config, &cancel, &node, &txn)?;
                file_append(scope, &config, &cancel, &node, b"kept", &txn)?;
                Ok(())
            })
            .unwrap();
        store
            .read(|view| {
                assert_eq!(file_contents(view, &config, &cancel, &node)?, b"kept");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn checksums_cover_both_kinds() {
        let (store, node, txn, config, cancel) = fixture();
        store
            .write(|scope| file_append(scope, &config, &cancel, &node, b"abc", &txn))
            .unwrap();
        store
            .read(|view| {
                let md5 = file_checksum(view, &config, &cancel, &node, ChecksumKind::Md5)?;
                assert_eq!(md5.to_hex(), "900150983cd24fb0d6963f7d28e17f72");
                let sha1 = file_checksum(view, &config, &cancel, &node, ChecksumKind::Sha1)?;
                assert_eq!(sha1.to_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn finalize_edits_verifies_the_expected_digest() {
        let (store, node, txn, config, cancel) = fixture();
        store
            .write(|scope| file_append(scope, &config, &cancel, &node, b"payload", &txn))
            .unwrap();
        store
            .read(|view| {
                let good = Checksum::compute(ChecksumKind::Md5, b"payload");
                finalize_edits(view, &config, &cancel, &node, Some(&good))?;
                let bad = Checksum::compute(ChecksumKind::Md5, b"different");
                let err = finalize_edits(view, &config, &cancel, &node, Some(&bad)).unwrap_err();
                assert_eq!(err.kind(), chronofs_core::ErrorKind::ChecksumMismatch);
                // No expectation, no verification.
                finalize_edits(view, &config, &cancel, &node, None)?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn directories_are_not_files() {
        let store = FsStore::create(FsConfig::default()).unwrap();
        let root_id = store
            .read(|view| chronofs_storage::revisions::root_of(view, 0))
            .unwrap();
        let root = store.read(|view| DagNode::get(view, &root_id)).unwrap();
        let err = store.read(|view| file_length(view, &root)).unwrap_err();
        assert_eq!(err.kind(), chronofs_core::ErrorKind::NotFile);
    }

    #[test]
    fn immutable_files_refuse_writes() {
        let (store, node, _txn, config, cancel) = fixture();
        let err = store
            .write(|scope| {
                file_append(scope, &config, &cancel, &node, b"x", &TxnId::new("other"), )
            })
            .unwrap_err();
        assert_eq!(err.kind(), chronofs_core::ErrorKind::NotMutable);
    }
}
