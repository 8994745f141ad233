//! Lock operations
//!
//! Taking and releasing locks mutates the leaf digest record and every
//! ancestor index, inside one ACID scope under the repository write lock.
//! Indices are written before the leaf: interrupted work leaves an index
//! without a lock (reads as unlocked everywhere) rather than a lock
//! without an index (inconsistent between leaf and ancestors).
//!
//! Expired locks are removed lazily, and only by callers holding the
//! repository write lock; plain readers just treat them as absent.

use crate::types::{digest_of, generate_token, DigestRecord, Lock};
use chrono::{DateTime, Utc};
use chronofs_core::{path, FsError, Result, Revnum};
use chronofs_dag::{DagNode, DagOps};
use chronofs_storage::{revisions, FsStore, KvRead, Table, WriteScope};
use std::collections::HashSet;

/// How far below the given path to look for locks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDepth {
    /// The path itself only
    Path,
    /// The path and its direct descendants
    Immediates,
    /// The whole sub-tree
    Infinity,
}

/// Parameters for taking a lock
#[derive(Debug, Default, Clone)]
pub struct LockParams {
    /// Use this token instead of generating one
    pub token: Option<String>,
    /// Free-form comment stored with the lock
    pub comment: Option<String>,
    /// When the lock should lapse
    pub expiration_date: Option<DateTime<Utc>>,
    /// Take over an existing lock instead of failing
    pub steal: bool,
    /// The caller's believed revision of the path; stale values are
    /// rejected as out of date
    pub current_rev: Option<Revnum>,
}

fn read_record(view: &impl KvRead, digest: &str) -> Result<Option<DigestRecord>> {
    match view.get(Table::LockDigests, digest) {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

fn write_record(scope: &mut WriteScope<'_>, digest: &str, record: &DigestRecord) -> Result<()> {
    if record.is_empty() {
        scope.delete(Table::LockDigests, digest);
    } else {
        scope.put(Table::LockDigests, digest, bincode::serialize(record)?);
    }
    Ok(())
}

/// The chain of `(ancestor, child)` path pairs from the root down to
/// `path` itself
fn ancestor_chain(locked_path: &str) -> Vec<(String, String)> {
    let mut chain = Vec::new();
    let mut parent = "/".to_string();
    let mut walked = String::new();
    for component in path::components(locked_path) {
        walked.push('/');
        walked.push_str(component);
        chain.push((parent.clone(), walked.clone()));
        parent = walked.clone();
    }
    chain
}

fn resolve_path(
    view: &impl KvRead,
    ops: &DagOps<'_>,
    root: &DagNode,
    target: &str,
) -> Result<Option<DagNode>> {
    let mut current = root.clone();
    for component in path::components(target) {
        if !current.is_dir() {
            return Ok(None);
        }
        match ops.open(view, &current, component)? {
            Some(child) => current = child,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Lock a file path
///
/// Fails when the path is a directory or does not exist, when the
/// caller's `current_rev` predates the file's created revision, and when
/// the path is already locked by somebody else (unless stealing). The
/// caller must be an authenticated user; the lock is owned by them.
pub fn lock(
    store: &FsStore,
    target: &str,
    username: Option<&str>,
    params: &LockParams,
) -> Result<Lock> {
    let target = path::canonicalize(target)?;
    let username = username.ok_or_else(|| FsError::NotAuthorized {
        message: "locking requires an authenticated username".into(),
    })?;

    let _guard = store.acquire_write_lock();
    let ops = DagOps {
        config: store.config(),
        cancel: store.cancel(),
    };
    let lock = store.write(|scope| {
        let youngest = revisions::youngest(scope)?;
        let root = ops.revision_root(scope, youngest)?;
        let node = match resolve_path(scope, &ops, &root, &target)? {
            Some(node) if node.is_dir() => {
                return Err(FsError::NotFile {
                    path: target.clone(),
                });
            }
            Some(node) => node,
            None => {
                // A stale working copy holding a deleted file is out of
                // date; everything else is plain not-found.
                return Err(if params.current_rev.is_some() {
                    FsError::OutOfDate {
                        path: target.clone(),
                    }
                } else {
                    FsError::PathNotFound {
                        path: target.clone(),
                    }
                });
            }
        };

        if let Some(current_rev) = params.current_rev {
            let created_rev = node.created_rev().unwrap_or(youngest);
            if current_rev < created_rev {
                return Err(FsError::OutOfDate {
                    path: target.clone(),
                });
            }
        }

        let digest = digest_of(&target);
        let mut record = read_record(scope, &digest)?.unwrap_or_default();
        let now = Utc::now();
        if let Some(existing) = &record.lock {
            if existing.is_expired(now) {
                record.lock = None;
            } else if !params.steal {
                return Err(FsError::AlreadyLocked {
                    path: target.clone(),
                    owner: existing.owner.clone(),
                });
            }
        }

        let lock = Lock {
            path: target.clone(),
            token: params.token.clone().unwrap_or_else(generate_token),
            owner: username.to_string(),
            comment: params.comment.clone(),
            creation_date: now,
            expiration_date: params.expiration_date,
        };

        // Ancestor indices first, then the leaf.
        for (ancestor, child) in ancestor_chain(&target) {
            let ancestor_digest = digest_of(&ancestor);
            let mut index = read_record(scope, &ancestor_digest)?.unwrap_or_default();
            index.children.insert(digest_of(&child));
            write_record(scope, &ancestor_digest, &index)?;
        }
        record.lock = Some(lock.clone());
        write_record(scope, &digest, &record)?;
        Ok(lock)
    })?;
    tracing::debug!(path = %lock.path, owner = %lock.owner, "took path lock");
    Ok(lock)
}

/// Release a lock
///
/// Requires the matching token and the owning username, unless
/// `break_lock` forces the release. Ancestor indices are pruned bottom-up
/// so empty index records disappear with the lock.
pub fn unlock(
    store: &FsStore,
    target: &str,
    username: Option<&str>,
    token: Option<&str>,
    break_lock: bool,
) -> Result<()> {
    let target = path::canonicalize(target)?;
    let _guard = store.acquire_write_lock();

    // Released vs. lapsed-and-purged: the purge must persist even though
    // the caller still gets a no-such-lock error.
    let released = store.write(|scope| {
        let digest = digest_of(&target);
        let mut record = read_record(scope, &digest)?.unwrap_or_default();
        let now = Utc::now();
        let lock = match record.lock.take() {
            Some(lock) if lock.is_expired(now) => {
                write_record(scope, &digest, &record)?;
                prune_ancestors(scope, &target)?;
                return Ok(false);
            }
            Some(lock) => lock,
            None => {
                return Err(FsError::NoSuchLock {
                    path: target.clone(),
                });
            }
        };

        if !break_lock {
            if token != Some(lock.token.as_str()) {
                return Err(FsError::BadLockToken {
                    path: target.clone(),
                });
            }
            match username {
                None => {
                    return Err(FsError::NotAuthorized {
                        message: "unlocking requires an authenticated username".into(),
                    });
                }
                Some(user) if user != lock.owner => {
                    return Err(FsError::LockOwnerMismatch {
                        path: target.clone(),
                        owner: lock.owner.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        write_record(scope, &digest, &record)?;
        prune_ancestors(scope, &target)?;
        Ok(true)
    })?;
    if !released {
        return Err(FsError::NoSuchLock { path: target });
    }
    tracing::debug!(path = %target, "released path lock");
    Ok(())
}

fn prune_ancestors(scope: &mut WriteScope<'_>, target: &str) -> Result<()> {
    for (ancestor, child) in ancestor_chain(target).into_iter().rev() {
        let child_digest = digest_of(&child);
        let child_live = read_record(scope, &child_digest)?
            .map(|r| !r.is_empty())
            .unwrap_or(false);
        if child_live {
            break;
        }
        let ancestor_digest = digest_of(&ancestor);
        let mut index = read_record(scope, &ancestor_digest)?.unwrap_or_default();
        index.children.remove(&child_digest);
        write_record(scope, &ancestor_digest, &index)?;
    }
    Ok(())
}

/// The lock on a path, if one is present and unexpired
pub fn get_lock(store: &FsStore, target: &str) -> Result<Option<Lock>> {
    let target = path::canonicalize(target)?;
    store.read(|view| lock_at(view, &target))
}

fn lock_at(view: &impl KvRead, target: &str) -> Result<Option<Lock>> {
    let record = read_record(view, &digest_of(target))?;
    Ok(record
        .and_then(|r| r.lock)
        .filter(|lock| !lock.is_expired(Utc::now())))
}

/// All unexpired locks at or under a path, to the given depth
pub fn get_locks(store: &FsStore, target: &str, depth: LockDepth) -> Result<Vec<Lock>> {
    let target = path::canonicalize(target)?;
    store.read(|view| {
        let mut found = Vec::new();
        walk_locks(view, &digest_of(&target), depth, &mut found)?;
        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    })
}

fn walk_locks(
    view: &impl KvRead,
    digest: &str,
    depth: LockDepth,
    found: &mut Vec<Lock>,
) -> Result<()> {
    let Some(record) = read_record(view, digest)? else {
        return Ok(());
    };
    if let Some(lock) = record.lock {
        if !lock.is_expired(Utc::now()) {
            found.push(lock);
        }
    }
    let descend = match depth {
        LockDepth::Path => None,
        LockDepth::Immediates => Some(LockDepth::Path),
        LockDepth::Infinity => Some(LockDepth::Infinity),
    };
    if let Some(next_depth) = descend {
        for child in &record.children {
            walk_locks(view, child, next_depth, found)?;
        }
    }
    Ok(())
}

/// Verify that the caller may write to a possibly locked path
///
/// Checks the path's own lock, and with `recursive` every lock in the
/// sub-tree: the caller's username must match the owner and the caller's
/// token set must contain the lock's token. This is the commit-time
/// guard; it runs against a view because the commit already holds the
/// repository write lock.
pub fn allow_locked_operation(
    view: &impl KvRead,
    target: &str,
    recursive: bool,
    username: Option<&str>,
    tokens: &HashSet<String>,
) -> Result<()> {
    let target = path::canonicalize(target)?;
    let mut found = Vec::new();
    let depth = if recursive {
        LockDepth::Infinity
    } else {
        LockDepth::Path
    };
    walk_locks(view, &digest_of(&target), depth, &mut found)?;
    for lock in found {
        verify_lock(&lock, username, tokens)?;
    }
    Ok(())
}

/// Verify one lock against the caller's identity and token set
pub fn verify_lock(lock: &Lock, username: Option<&str>, tokens: &HashSet<String>) -> Result<()> {
    match username {
        None => {
            return Err(FsError::NotAuthorized {
                message: format!("path '{}' is locked and no username is given", lock.path),
            });
        }
        Some(user) if user != lock.owner => {
            return Err(FsError::LockOwnerMismatch {
                path: lock.path.clone(),
                owner: lock.owner.clone(),
            });
        }
        Some(_) => {}
    }
    if !tokens.contains(&lock.token) {
        return Err(FsError::BadLockToken {
            path: lock.path.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronofs_core::{
        ChangeSetId, CopyId, DirEntries, DirEntry, FsConfig, NodeId, NodeKind, NodeRevision,
        NodeRevisionId, Representation,
    };
    use chronofs_storage::{keys, nodes, reps, revisions, strings, Revision};

    /// Fabricate revision 1 with the given file paths (single level under
    /// nested dirs as needed).
    fn store_with_files(paths: &[&str]) -> FsStore {
        let store = FsStore::create(FsConfig::default()).unwrap();
        store
            .write(|scope| {
                // Build a nested DirEntries tree bottom-up in memory,
                // writing committed nodes tagged r1.
                fn put_dir(
                    scope: &mut WriteScope<'_>,
                    created_path: &str,
                    entries: DirEntries,
                ) -> chronofs_core::Result<NodeRevisionId> {
                    let bytes = bincode::serialize(&entries).unwrap();
                    let string_key = strings::append(scope, None, &bytes)?;
                    let rep = Representation::fulltext(string_key, None);
                    let rep_key = reps::put_new_rep(scope, &rep)?;
                    let mut record = NodeRevision::new(NodeKind::Dir, created_path);
                    record.data_rep = Some(rep_key);
                    let node_id = NodeId::new(keys::allocate(scope, keys::COUNTER_NODE)?);
                    let id =
                        NodeRevisionId::new(node_id, CopyId::new("0"), ChangeSetId::Rev(1));
                    nodes::put_node_rev(scope, &id, &record)?;
                    Ok(id)
                }

                // Only flat and two-level paths are needed by the tests.
                let mut root_entries = DirEntries::new();
                let mut subdirs: std::collections::BTreeMap<String, DirEntries> =
                    Default::default();
                for p in paths {
                    let canonical = path::canonicalize(p).unwrap();
                    let file_record = NodeRevision::new(NodeKind::File, canonical.clone());
                    let node_id = NodeId::new(keys::allocate(scope, keys::COUNTER_NODE)?);
                    let id =
                        NodeRevisionId::new(node_id, CopyId::new("0"), ChangeSetId::Rev(1));
                    nodes::put_node_rev(scope, &id, &file_record)?;
                    let entry = DirEntry {
                        id,
                        kind: NodeKind::File,
                    };
                    match canonical[1..].split_once('/') {
                        None => {
                            root_entries.insert(canonical[1..].to_string(), entry);
                        }
                        Some((dir, file)) => {
                            subdirs
                                .entry(dir.to_string())
                                .or_default()
                                .insert(file.to_string(), entry);
                        }
                    }
                }
                for (dir, entries) in subdirs {
                    let id = put_dir(scope, &format!("/{}", dir), entries)?;
                    root_entries.insert(
                        dir,
                        DirEntry {
                            id,
                            kind: NodeKind::Dir,
                        },
                    );
                }
                let root_id = put_dir(scope, "/", root_entries)?;
                revisions::put_next_revision(
                    scope,
                    &Revision {
                        root_id,
                        props: Default::default(),
                    },
                )?;
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn lock_then_get_then_unlock_round_trips() {
        let store = store_with_files(&["/hello.txt"]);
        let lock = lock(
            &store,
            "/hello.txt",
            Some("alice"),
            &LockParams::default(),
        )
        .unwrap();
        assert_eq!(lock.owner, "alice");
        assert!(lock.token.starts_with("opaquelocktoken:"));

        let found = get_lock(&store, "/hello.txt").unwrap().unwrap();
        assert_eq!(found.token, lock.token);

        unlock(&store, "/hello.txt", Some("alice"), Some(&lock.token), false).unwrap();
        assert!(get_lock(&store, "/hello.txt").unwrap().is_none());
        // The lock store is back to its pre-lock state: no digest rows.
        store
            .read(|view| {
                assert!(view.scan_prefix(Table::LockDigests, "").is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn ancestor_indices_expose_subtree_locks() {
        let store = store_with_files(&["/a/f", "/a/g", "/b"]);
        lock(&store, "/a/f", Some("alice"), &LockParams::default()).unwrap();
        lock(&store, "/a/g", Some("alice"), &LockParams::default()).unwrap();
        lock(&store, "/b", Some("bob"), &LockParams::default()).unwrap();

        let all = get_locks(&store, "/", LockDepth::Infinity).unwrap();
        let paths: Vec<&str> = all.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, ["/a/f", "/a/g", "/b"]);

        let under_a = get_locks(&store, "/a", LockDepth::Infinity).unwrap();
        assert_eq!(under_a.len(), 2);

        let immediate = get_locks(&store, "/", LockDepth::Immediates).unwrap();
        let names: Vec<&str> = immediate.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(names, ["/b"]);
    }

    #[test]
    fn double_lock_fails_unless_stolen() {
        let store = store_with_files(&["/f"]);
        lock(&store, "/f", Some("alice"), &LockParams::default()).unwrap();
        let err = lock(&store, "/f", Some("bob"), &LockParams::default()).unwrap_err();
        assert_eq!(err.kind(), chronofs_core::ErrorKind::AlreadyLocked);

        let stolen = lock(
            &store,
            "/f",
            Some("bob"),
            &LockParams {
                steal: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(stolen.owner, "bob");
    }

    #[test]
    fn directories_and_missing_paths_are_rejected() {
        let store = store_with_files(&["/a/f"]);
        let err = lock(&store, "/a", Some("alice"), &LockParams::default()).unwrap_err();
        assert_eq!(err.kind(), chronofs_core::ErrorKind::NotFile);

        let err = lock(&store, "/ghost", Some("alice"), &LockParams::default()).unwrap_err();
        assert!(err.is_not_found());

        let err = lock(
            &store,
            "/ghost",
            Some("alice"),
            &LockParams {
                current_rev: Some(1),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), chronofs_core::ErrorKind::OutOfDate);
    }

    #[test]
    fn stale_current_rev_is_out_of_date() {
        let store = store_with_files(&["/f"]);
        let err = lock(
            &store,
            "/f",
            Some("alice"),
            &LockParams {
                current_rev: Some(0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), chronofs_core::ErrorKind::OutOfDate);
    }

    #[test]
    fn unlock_checks_token_and_owner_unless_breaking() {
        let store = store_with_files(&["/f"]);
        let l = lock(&store, "/f", Some("alice"), &LockParams::default()).unwrap();

        let err = unlock(&store, "/f", Some("alice"), Some("wrong-token"), false).unwrap_err();
        assert_eq!(err.kind(), chronofs_core::ErrorKind::BadLockToken);

        let err = unlock(&store, "/f", Some("mallory"), Some(&l.token), false).unwrap_err();
        assert_eq!(err.kind(), chronofs_core::ErrorKind::LockOwnerMismatch);

        // Breaking ignores both.
        unlock(&store, "/f", None, None, true).unwrap();
        assert!(get_lock(&store, "/f").unwrap().is_none());

        let err = unlock(&store, "/f", Some("alice"), Some(&l.token), false).unwrap_err();
        assert_eq!(err.kind(), chronofs_core::ErrorKind::NoSuchLock);
    }

    #[test]
    fn expired_locks_read_as_absent() {
        let store = store_with_files(&["/f"]);
        lock(
            &store,
            "/f",
            Some("alice"),
            &LockParams {
                expiration_date: Some(Utc::now() - chrono::Duration::seconds(5)),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(get_lock(&store, "/f").unwrap().is_none());
        assert!(get_locks(&store, "/", LockDepth::Infinity).unwrap().is_empty());
        // And the path is free for the next taker.
        let l = lock(&store, "/f", Some("bob"), &LockParams::default()).unwrap();
        assert_eq!(l.owner, "bob");
    }

    #[test]
    fn allow_locked_operation_enforces_owner_and_token() {
        let store = store_with_files(&["/a/f"]);
        let l = lock(&store, "/a/f", Some("alice"), &LockParams::default()).unwrap();

        store
            .read(|view| {
                let no_tokens = HashSet::new();
                let mut with_token = HashSet::new();
                with_token.insert(l.token.clone());

                // Unrelated path passes with no credentials at all.
                allow_locked_operation(view, "/a/other", false, None, &no_tokens)?;

                let err = allow_locked_operation(view, "/a/f", false, None, &no_tokens)
                    .unwrap_err();
                assert_eq!(err.kind(), chronofs_core::ErrorKind::NotAuthorized);

                let err =
                    allow_locked_operation(view, "/a/f", false, Some("bob"), &with_token)
                        .unwrap_err();
                assert_eq!(err.kind(), chronofs_core::ErrorKind::LockOwnerMismatch);

                let err =
                    allow_locked_operation(view, "/a/f", false, Some("alice"), &no_tokens)
                        .unwrap_err();
                assert_eq!(err.kind(), chronofs_core::ErrorKind::BadLockToken);

                allow_locked_operation(view, "/a/f", false, Some("alice"), &with_token)?;
                // Recursive check from an ancestor discovers the leaf.
                let err = allow_locked_operation(view, "/a", true, Some("alice"), &no_tokens)
                    .unwrap_err();
                assert_eq!(err.kind(), chronofs_core::ErrorKind::BadLockToken);
                allow_locked_operation(view, "/", true, Some("alice"), &with_token)?;
                Ok(())
            })
            .unwrap();
    }
}
