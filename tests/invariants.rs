//! Cross-cutting invariants and round-trip laws

use chronofs::{
    autocommit, AccessContext, Cancel, ChangeKind, ErrorKind, Filesystem, FsConfig, LockDepth,
    LockParams, PROP_REVISION_DATE, PROP_REVISION_LOG,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn fresh() -> Filesystem {
    Filesystem::create(FsConfig::default()).unwrap()
}

fn commit_file(fs: &Filesystem, base: u64, path: &str, bytes: &[u8]) -> u64 {
    let txn = fs.begin_txn(base).unwrap();
    if txn.check_path(path).unwrap().is_none() {
        txn.make_file(path).unwrap();
    }
    txn.write_file(path, bytes).unwrap();
    txn.commit().unwrap()
}

#[test]
fn independent_opens_agree_forever() {
    let fs = fresh();
    let rev = commit_file(&fs, 0, "/f", b"immutable bytes");
    commit_file(&fs, rev, "/f", b"newer bytes");

    let a = fs.revision_root(rev).unwrap();
    let b = fs.revision_root(rev).unwrap();
    assert_eq!(a.node_id("/f").unwrap(), b.node_id("/f").unwrap());
    assert_eq!(
        a.file_contents("/f").unwrap(),
        b.file_contents("/f").unwrap()
    );
    assert_eq!(a.file_contents("/f").unwrap(), b"immutable bytes");
}

#[test]
fn disjoint_ranged_reads_concatenate_to_the_fulltext() {
    let fs = fresh();
    let body: Vec<u8> = (0u32..5000).flat_map(|i| i.to_le_bytes()).collect();
    let rev = commit_file(&fs, 0, "/blob", &body);
    let root = fs.revision_root(rev).unwrap();

    let full = root.file_contents("/blob").unwrap();
    assert_eq!(full, body);

    let mut stitched = Vec::new();
    let mut offset = 0u64;
    for chunk_len in [1usize, 7, 512, 4096, 100_000] {
        let piece = root.file_read_range("/blob", offset, chunk_len).unwrap();
        offset += piece.len() as u64;
        stitched.extend_from_slice(&piece);
        if piece.len() < chunk_len {
            break;
        }
    }
    assert_eq!(stitched, body);
}

#[test]
fn read_past_end_returns_the_suffix() {
    let fs = fresh();
    let rev = commit_file(&fs, 0, "/short", b"abcdef");
    let root = fs.revision_root(rev).unwrap();
    assert_eq!(root.file_read_range("/short", 4, 100).unwrap(), b"ef");
    assert_eq!(root.file_read_range("/short", 6, 100).unwrap(), b"");
    assert_eq!(root.file_read_range("/short", 600, 1).unwrap(), b"");
}

#[test]
fn empty_files_are_empty_at_every_layer() {
    let fs = fresh();
    let txn = fs.begin_txn(0).unwrap();
    txn.make_file("/empty").unwrap();
    let rev = txn.commit().unwrap();
    let root = fs.revision_root(rev).unwrap();
    assert_eq!(root.file_length("/empty").unwrap(), 0);
    assert_eq!(root.file_contents("/empty").unwrap(), b"");
}

#[test]
fn abort_leaves_the_repository_bit_identical() {
    let fs = fresh();
    let rev = commit_file(&fs, 0, "/keep", b"kept");
    let entries_before = fs.revision_root(rev).unwrap().dir_entries("/").unwrap();

    let txn = fs.begin_txn(rev).unwrap();
    txn.make_dir("/scratch").unwrap();
    txn.make_file("/scratch/tmp").unwrap();
    txn.write_file("/scratch/tmp", b"going away").unwrap();
    txn.write_file("/keep", b"modified in txn").unwrap();
    txn.abort().unwrap();

    assert_eq!(fs.youngest_rev().unwrap(), rev);
    let entries_after = fs.revision_root(rev).unwrap().dir_entries("/").unwrap();
    assert_eq!(entries_before, entries_after);
    assert_eq!(
        fs.revision_root(rev).unwrap().file_contents("/keep").unwrap(),
        b"kept"
    );
    assert!(fs.list_transactions().unwrap().is_empty());
}

#[test]
fn lock_then_unlock_restores_the_lock_store() {
    let fs = fresh();
    fs.set_access(AccessContext::for_user("alice"));
    commit_file(&fs, 0, "/f", b"x");

    assert!(fs.get_locks("/", LockDepth::Infinity).unwrap().is_empty());
    let lock = fs.lock("/f", &LockParams::default()).unwrap();
    assert_eq!(fs.get_locks("/", LockDepth::Infinity).unwrap().len(), 1);
    fs.unlock("/f", Some(&lock.token), false).unwrap();
    assert!(fs.get_locks("/", LockDepth::Infinity).unwrap().is_empty());
    assert!(fs.get_lock("/f").unwrap().is_none());
}

#[test]
fn commit_stamps_date_and_carries_txn_props() {
    let fs = fresh();
    let txn = fs.begin_txn(0).unwrap();
    txn.set_prop(PROP_REVISION_LOG, Some(b"first commit")).unwrap();
    txn.make_file("/f").unwrap();
    let rev = txn.commit().unwrap();

    assert_eq!(
        fs.revision_prop(rev, PROP_REVISION_LOG).unwrap(),
        Some(b"first commit".to_vec())
    );
    assert!(fs.revision_prop(rev, PROP_REVISION_DATE).unwrap().is_some());

    // Revision properties are unversioned: mutate after the fact.
    fs.set_revision_prop(rev, PROP_REVISION_LOG, Some(b"amended"))
        .unwrap();
    assert_eq!(
        fs.revision_prop(rev, PROP_REVISION_LOG).unwrap(),
        Some(b"amended".to_vec())
    );
}

#[test]
fn paths_changed_reports_the_frozen_change_set() {
    let fs = fresh();
    let rev = {
        let txn = fs.begin_txn(0).unwrap();
        txn.make_dir("/d").unwrap();
        txn.make_file("/d/f").unwrap();
        txn.write_file("/d/f", b"content").unwrap();
        txn.commit().unwrap()
    };

    let changed = fs.paths_changed(rev).unwrap();
    let mut paths: Vec<&str> = changed.iter().map(|c| c.path.as_str()).collect();
    paths.sort_unstable();
    assert_eq!(paths, ["/d", "/d/f"]);

    let file_change = changed.iter().find(|c| c.path == "/d/f").unwrap();
    assert_eq!(file_change.kind, ChangeKind::Add);
    assert!(file_change.text_mod);
    // Frozen ids carry the revision tag, not the txn tag.
    assert_eq!(
        file_change.node_rev.as_ref().unwrap().change_set.revision(),
        Some(rev)
    );

    let next = {
        let txn = fs.begin_txn(rev).unwrap();
        txn.delete("/d/f").unwrap();
        txn.commit().unwrap()
    };
    let changed = fs.paths_changed(next).unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].kind, ChangeKind::Delete);
    assert!(changed[0].node_rev.is_none());
}

#[test]
fn transactions_are_listable_and_purgeable() {
    let fs = fresh();
    let t1 = fs.begin_txn(0).unwrap();
    let t2 = fs.begin_txn(0).unwrap();
    t2.make_file("/junk").unwrap();

    let mut names = fs.list_transactions().unwrap();
    names.sort_unstable();
    let mut expected = vec![t1.name().to_string(), t2.name().to_string()];
    expected.sort_unstable();
    assert_eq!(names, expected);

    fs.purge_txn(t2.name()).unwrap();
    assert_eq!(fs.list_transactions().unwrap(), vec![t1.name().to_string()]);
    assert!(fs.open_txn(t2.name()).is_err());
}

#[test]
fn autocommit_round_trip() {
    let fs = fresh();
    let r1 = autocommit::put_file(&fs, "/auto.txt", b"one-shot\n").unwrap();
    assert_eq!(r1, 1);
    assert_eq!(
        fs.revision_root(r1).unwrap().file_contents("/auto.txt").unwrap(),
        b"one-shot\n"
    );

    let r2 = autocommit::make_collection(&fs, "/dir").unwrap();
    let r3 = autocommit::copy_path(&fs, "/auto.txt", "/dir/copy.txt").unwrap();
    let r4 = autocommit::move_path(&fs, "/auto.txt", "/dir/moved.txt").unwrap();
    let r5 = autocommit::delete_path(&fs, "/dir/copy.txt").unwrap();
    assert_eq!((r2, r3, r4, r5), (2, 3, 4, 5));

    let head = fs.revision_root(r5).unwrap();
    assert!(head.check_path("/auto.txt").unwrap().is_none());
    assert!(head.check_path("/dir/copy.txt").unwrap().is_none());
    assert_eq!(
        head.file_contents("/dir/moved.txt").unwrap(),
        b"one-shot\n"
    );
    // Autoversioning stamped its log message.
    assert!(fs.revision_prop(r4, PROP_REVISION_LOG).unwrap().is_some());
}

#[test]
fn cancellation_unwinds_cleanly() {
    let fs = fresh();
    let rev = commit_file(&fs, 0, "/f", b"some bytes");

    let flag = Arc::new(AtomicBool::new(false));
    let hook = {
        let flag = flag.clone();
        Cancel::new(Arc::new(move || flag.load(Ordering::Relaxed)))
    };
    let cancellable = fs.new_handle(FsConfig::default(), hook).unwrap();

    // Fine while the flag is clear.
    assert_eq!(
        cancellable
            .revision_root(rev)
            .unwrap()
            .dir_entries("/")
            .unwrap()
            .len(),
        1
    );

    flag.store(true, Ordering::Relaxed);
    let err = cancellable
        .revision_root(rev)
        .unwrap()
        .dir_entries("/")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    // The original handle is unaffected.
    assert_eq!(fs.revision_root(rev).unwrap().dir_entries("/").unwrap().len(), 1);
}

#[test]
fn unusable_configurations_fail_at_open_not_at_commit() {
    let bad = FsConfig {
        delta_window_size: 0,
        ..FsConfig::default()
    };
    let err = Filesystem::create(bad.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);

    let fs = fresh();
    let err = fs.new_handle(bad, Cancel::never()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[test]
fn stale_base_revisions_still_commit_when_disjoint() {
    let fs = fresh();
    let r1 = commit_file(&fs, 0, "/a", b"first");
    // A txn begun against revision 0, committing after r1 exists.
    let txn = fs.begin_txn(0).unwrap();
    txn.make_file("/b").unwrap();
    txn.write_file("/b", b"second").unwrap();
    let r2 = txn.commit().unwrap();
    assert_eq!(r2, r1 + 1);

    let head = fs.revision_root(r2).unwrap();
    assert_eq!(head.file_contents("/a").unwrap(), b"first");
    assert_eq!(head.file_contents("/b").unwrap(), b"second");
}
