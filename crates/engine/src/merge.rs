//! Three-way tree merge
//!
//! On commit, newer revisions may have landed since the transaction's
//! base. The engine reconciles them by merging the newest committed root
//! `S` into the transaction root `T`, with the base root `A` as common
//! ancestor:
//!
//! - an entry unchanged in `S` relative to `A` leaves `T` alone;
//! - an entry unchanged in `T` adopts `S`'s id;
//! - an entry changed in both recurses for directory triples, tolerates
//!   identical outcomes, and conflicts otherwise.
//!
//! A conflict error names the offending path; the surrounding ACID scope
//! throws the partial merge away, so the transaction is untouched and
//! remains openable.

use chronofs_core::{path, DirEntry, FsError, NodeKind, PropList, Result, TxnId};
use chronofs_dag::{node as dag_node, DagNode, DagOps};
use chronofs_storage::WriteScope;

/// Merge `source` (the newest committed root) into the mutable
/// transaction root `target`, using `ancestor` (the base root) as the
/// common ancestor
pub fn merge_trees(
    scope: &mut WriteScope<'_>,
    ops: &DagOps<'_>,
    txn_id: &TxnId,
    source: &DagNode,
    target: &DagNode,
    ancestor: &DagNode,
) -> Result<()> {
    if source.id == ancestor.id {
        return Ok(());
    }
    merge_dirs(scope, ops, txn_id, "/", source, target, ancestor)
}

fn conflict(at: &str) -> FsError {
    FsError::Conflict {
        path: at.to_string(),
    }
}

fn node_props(
    scope: &mut WriteScope<'_>,
    ops: &DagOps<'_>,
    node: &DagNode,
) -> Result<PropList> {
    dag_node::proplist(scope, ops.config, ops.cancel, node)
}

fn merge_dirs(
    scope: &mut WriteScope<'_>,
    ops: &DagOps<'_>,
    txn_id: &TxnId,
    dir_path: &str,
    source: &DagNode,
    target: &DagNode,
    ancestor: &DagNode,
) -> Result<()> {
    ops.cancel.check()?;

    // Property changes on the directory itself: adopt the source's when
    // the target kept the ancestor's, conflict when both diverged.
    let s_props = node_props(scope, ops, source)?;
    let a_props = node_props(scope, ops, ancestor)?;
    if s_props != a_props {
        let t_props = node_props(scope, ops, target)?;
        if t_props == a_props {
            dag_node::set_proplist(scope, ops.config, ops.cancel, target, txn_id, &s_props)?;
        } else if t_props != s_props {
            return Err(conflict(dir_path));
        }
    }

    let s_entries = ops.entries(scope, source)?;
    let t_entries = ops.entries(scope, target)?;
    let a_entries = ops.entries(scope, ancestor)?;

    for (name, a_entry) in &a_entries {
        ops.cancel.check()?;
        let child_path = path::join(dir_path, name);
        let s_entry = s_entries.get(name);
        let t_entry = t_entries.get(name);

        // Source left the entry alone: whatever the transaction did
        // stands.
        if s_entry == Some(a_entry) {
            continue;
        }

        // Transaction left the entry alone: adopt the source's change.
        if t_entry == Some(a_entry) {
            match s_entry {
                Some(entry) => {
                    ops.set_entry(scope, target, name, &entry.id, entry.kind, txn_id)?;
                }
                None => {
                    ops.delete_entry(scope, target, name, txn_id)?;
                }
            }
            continue;
        }

        match (s_entry, t_entry) {
            // Both deleted: the same outcome.
            (None, None) => {}
            // One side deleted what the other changed.
            (None, Some(_)) | (Some(_), None) => return Err(conflict(&child_path)),
            (Some(s_e), Some(t_e)) => {
                merge_entry(scope, ops, txn_id, &child_path, target, name, s_e, t_e, Some(a_entry))?;
            }
        }
    }

    // Entries the source added beyond the ancestor.
    for (name, s_entry) in &s_entries {
        if a_entries.contains_key(name) {
            continue;
        }
        ops.cancel.check()?;
        let child_path = path::join(dir_path, name);
        match t_entries.get(name) {
            None => {
                ops.set_entry(scope, target, name, &s_entry.id, s_entry.kind, txn_id)?;
            }
            Some(t_entry) => {
                merge_entry(scope, ops, txn_id, &child_path, target, name, s_entry, t_entry, None)?;
            }
        }
    }

    // Entries only the transaction added need nothing.
    Ok(())
}

/// Reconcile one entry both sides changed (or both sides added, when
/// `ancestor_entry` is absent)
#[allow(clippy::too_many_arguments)]
fn merge_entry(
    scope: &mut WriteScope<'_>,
    ops: &DagOps<'_>,
    txn_id: &TxnId,
    child_path: &str,
    target_dir: &DagNode,
    name: &str,
    s_entry: &DirEntry,
    t_entry: &DirEntry,
    ancestor_entry: Option<&DirEntry>,
) -> Result<()> {
    // The identical outcome is no conflict at all.
    if s_entry.id == t_entry.id {
        return Ok(());
    }

    match (s_entry.kind, t_entry.kind) {
        (NodeKind::Dir, NodeKind::Dir) => {
            let ancestor_entry = match ancestor_entry {
                Some(entry) if entry.kind == NodeKind::Dir => entry,
                // Double-added directories (or a replaced non-directory
                // ancestor) have no common base to recurse from.
                _ => return Err(conflict(child_path)),
            };
            let s_child = DagNode::get(scope, &s_entry.id)?;
            let a_child = DagNode::get(scope, &ancestor_entry.id)?;
            let t_child = ops.clone_child(scope, target_dir, name, None, txn_id)?;
            merge_dirs(scope, ops, txn_id, child_path, &s_child, &t_child, &a_child)
        }
        (NodeKind::File, NodeKind::File) => {
            // Both targeting the same node is a true double edit: only
            // coinciding bytes and properties escape a conflict. A
            // replacement by an unrelated node supersedes whatever the
            // other side did to the old one, so the transaction's entry
            // stands.
            if !s_entry.id.is_related(&t_entry.id) {
                return Ok(());
            }
            let s_node = DagNode::get(scope, &s_entry.id)?;
            let t_node = DagNode::get(scope, &t_entry.id)?;
            let (props_differ, text_differ) =
                ops.things_different(scope, &s_node, &t_node, true)?;
            if props_differ || text_differ {
                Err(conflict(child_path))
            } else {
                Ok(())
            }
        }
        _ => Err(conflict(child_path)),
    }
}

#[cfg(test)]
mod tests {
    use crate::fs::Filesystem;
    use chronofs_core::{ErrorKind, FsConfig, FsError};

    fn fs_with_tree() -> Filesystem {
        let fs = Filesystem::create(FsConfig::default()).unwrap();
        let txn = fs.begin_txn(0).unwrap();
        txn.make_dir("/d").unwrap();
        txn.make_file("/d/f").unwrap();
        txn.write_file("/d/f", b"base\n").unwrap();
        txn.make_file("/top").unwrap();
        txn.commit().unwrap();
        fs
    }

    #[test]
    fn target_adopts_source_only_changes() {
        let fs = fs_with_tree();
        let racer = fs.begin_txn(1).unwrap();
        racer.write_file("/d/f", b"racer won\n").unwrap();

        let mine = fs.begin_txn(1).unwrap();
        mine.write_file("/top", b"my change\n").unwrap();

        racer.commit().unwrap();
        let rev = mine.commit().unwrap();

        let head = fs.revision_root(rev).unwrap();
        assert_eq!(head.file_contents("/d/f").unwrap(), b"racer won\n");
        assert_eq!(head.file_contents("/top").unwrap(), b"my change\n");
    }

    #[test]
    fn double_edit_of_one_node_conflicts_with_its_path() {
        let fs = fs_with_tree();
        let racer = fs.begin_txn(1).unwrap();
        racer.write_file("/d/f", b"theirs\n").unwrap();
        let mine = fs.begin_txn(1).unwrap();
        mine.write_file("/d/f", b"ours\n").unwrap();

        racer.commit().unwrap();
        let err = mine.commit().unwrap_err();
        assert!(matches!(err, FsError::Conflict { path } if path == "/d/f"));
    }

    #[test]
    fn identical_double_edits_do_not_conflict() {
        let fs = fs_with_tree();
        let racer = fs.begin_txn(1).unwrap();
        racer.write_file("/d/f", b"same bytes\n").unwrap();
        let mine = fs.begin_txn(1).unwrap();
        mine.write_file("/d/f", b"same bytes\n").unwrap();

        racer.commit().unwrap();
        let rev = mine.commit().unwrap();
        assert_eq!(
            fs.revision_root(rev).unwrap().file_contents("/d/f").unwrap(),
            b"same bytes\n"
        );
    }

    #[test]
    fn delete_against_edit_conflicts_both_ways() {
        let fs = fs_with_tree();
        // Their delete versus our edit.
        let racer = fs.begin_txn(1).unwrap();
        racer.delete("/d/f").unwrap();
        let mine = fs.begin_txn(1).unwrap();
        mine.write_file("/d/f", b"still editing\n").unwrap();
        racer.commit().unwrap();
        let err = mine.commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // Their edit versus our delete, from the new head.
        let head = fs.youngest_rev().unwrap();
        let racer = fs.begin_txn(head).unwrap();
        racer.write_file("/top", b"edited\n").unwrap();
        let mine = fs.begin_txn(head).unwrap();
        mine.delete("/top").unwrap();
        racer.commit().unwrap();
        let err = mine.commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn matching_deletions_merge_silently() {
        let fs = fs_with_tree();
        let racer = fs.begin_txn(1).unwrap();
        racer.delete("/top").unwrap();
        let mine = fs.begin_txn(1).unwrap();
        mine.delete("/top").unwrap();
        mine.write_file("/d/f", b"and an edit\n").unwrap();

        racer.commit().unwrap();
        let rev = mine.commit().unwrap();
        let head = fs.revision_root(rev).unwrap();
        assert!(head.check_path("/top").unwrap().is_none());
        assert_eq!(head.file_contents("/d/f").unwrap(), b"and an edit\n");
    }

    #[test]
    fn source_additions_land_next_to_target_additions() {
        let fs = fs_with_tree();
        let racer = fs.begin_txn(1).unwrap();
        racer.make_file("/theirs.txt").unwrap();
        let mine = fs.begin_txn(1).unwrap();
        mine.make_file("/ours.txt").unwrap();

        racer.commit().unwrap();
        let rev = mine.commit().unwrap();
        let head = fs.revision_root(rev).unwrap();
        assert!(head.check_path("/theirs.txt").unwrap().is_some());
        assert!(head.check_path("/ours.txt").unwrap().is_some());
    }

    #[test]
    fn directory_prop_double_change_conflicts() {
        let fs = fs_with_tree();
        let racer = fs.begin_txn(1).unwrap();
        racer.set_node_prop("/d", "user:owner", Some(b"them")).unwrap();
        let mine = fs.begin_txn(1).unwrap();
        mine.set_node_prop("/d", "user:owner", Some(b"us")).unwrap();

        racer.commit().unwrap();
        let err = mine.commit().unwrap_err();
        assert!(matches!(err, FsError::Conflict { path } if path == "/d"));
    }

    #[test]
    fn directory_prop_single_change_is_adopted() {
        let fs = fs_with_tree();
        let racer = fs.begin_txn(1).unwrap();
        racer.set_node_prop("/d", "user:owner", Some(b"them")).unwrap();
        let mine = fs.begin_txn(1).unwrap();
        mine.write_file("/top", b"unrelated\n").unwrap();

        racer.commit().unwrap();
        let rev = mine.commit().unwrap();
        let props = fs.revision_root(rev).unwrap().node_proplist("/d").unwrap();
        assert_eq!(props.get("user:owner"), Some(&b"them".to_vec()));
    }

    #[test]
    fn replacement_by_a_new_node_supersedes_the_other_edit() {
        let fs = fs_with_tree();
        let racer = fs.begin_txn(1).unwrap();
        racer.write_file("/d/f", b"their edit\n").unwrap();
        let mine = fs.begin_txn(1).unwrap();
        mine.delete("/d/f").unwrap();
        mine.make_file("/d/f").unwrap();
        mine.write_file("/d/f", b"replacement\n").unwrap();

        racer.commit().unwrap();
        let rev = mine.commit().unwrap();
        assert_eq!(
            fs.revision_root(rev).unwrap().file_contents("/d/f").unwrap(),
            b"replacement\n"
        );
    }
}
