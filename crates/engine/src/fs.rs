//! The filesystem handle
//!
//! [`Filesystem`] is the top-level entry point: it owns a store handle
//! and an access context, and hands out revision roots, transactions,
//! editors, and the lock operations. Multiple handles may share one
//! repository; mutations serialize on the shared repository write lock.

use crate::access::AccessContext;
use crate::editor::TxnEditor;
use crate::root::Root;
use crate::txn::Transaction;
use chronofs_core::{Cancel, FsConfig, PropList, Result, Revnum};
use chronofs_locks::{Lock, LockDepth, LockParams};
use chronofs_storage::{changes, revisions, txns, ChangeRecord, FsStore};
use parking_lot::RwLock;
use std::sync::Arc;

/// A handle onto one versioned filesystem
pub struct Filesystem {
    store: FsStore,
    access: Arc<RwLock<AccessContext>>,
}

impl Filesystem {
    /// Create a fresh filesystem with an empty revision 0
    pub fn create(config: FsConfig) -> Result<Filesystem> {
        Ok(Filesystem {
            store: FsStore::create(config)?,
            access: Arc::new(RwLock::new(AccessContext::anonymous())),
        })
    }

    /// Open an independent handle onto the same repository
    ///
    /// The new handle has its own configuration, cancellation hook, and
    /// access context; tables and the write lock are shared. The
    /// configuration is validated, like at create.
    pub fn new_handle(&self, config: FsConfig, cancel: Cancel) -> Result<Filesystem> {
        Ok(Filesystem {
            store: self.store.new_handle(config, cancel)?,
            access: Arc::new(RwLock::new(AccessContext::anonymous())),
        })
    }

    /// The store behind this handle
    pub(crate) fn store(&self) -> &FsStore {
        &self.store
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Replace this handle's access context
    pub fn set_access(&self, access: AccessContext) {
        *self.access.write() = access;
    }

    /// A copy of this handle's access context
    pub fn access(&self) -> AccessContext {
        self.access.read().clone()
    }

    // =========================================================================
    // Revisions
    // =========================================================================

    /// The youngest committed revision number
    pub fn youngest_rev(&self) -> Result<Revnum> {
        self.store.read(|view| revisions::youngest(view))
    }

    /// A read-only root pinned to a revision
    pub fn revision_root(&self, rev: Revnum) -> Result<Root> {
        // Fail now rather than on first use.
        self.store.read(|view| revisions::get_revision(view, rev))?;
        Ok(Root::new(self.store.clone(), rev))
    }

    /// One revision property
    pub fn revision_prop(&self, rev: Revnum, name: &str) -> Result<Option<Vec<u8>>> {
        self.store
            .read(|view| revisions::get_property(view, rev, name))
    }

    /// Set or delete a revision property
    ///
    /// Revision properties are unversioned; this rewrites history's
    /// metadata in place.
    pub fn set_revision_prop(&self, rev: Revnum, name: &str, value: Option<&[u8]>) -> Result<()> {
        self.store
            .write(|scope| revisions::set_property(scope, rev, name, value.map(<[u8]>::to_vec)))
    }

    /// The full property list of a revision
    pub fn revision_proplist(&self, rev: Revnum) -> Result<PropList> {
        self.store.read(|view| revisions::proplist(view, rev))
    }

    /// The paths a revision changed
    pub fn paths_changed(&self, rev: Revnum) -> Result<Vec<ChangeRecord>> {
        // Surface no-such-revision for out-of-range numbers.
        self.store.read(|view| {
            revisions::get_revision(view, rev)?;
            changes::rev_changes(view, rev)
        })
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Begin a transaction against a base revision
    pub fn begin_txn(&self, base_rev: Revnum) -> Result<Transaction> {
        self.store
            .read(|view| revisions::get_revision(view, base_rev))?;
        Transaction::begin(self.store.clone(), Arc::clone(&self.access), base_rev)
    }

    /// Reopen a live transaction by name
    pub fn open_txn(&self, name: &str) -> Result<Transaction> {
        Transaction::open(self.store.clone(), Arc::clone(&self.access), name)
    }

    /// Names of all live transactions
    pub fn list_transactions(&self) -> Result<Vec<String>> {
        self.store.read(|view| {
            Ok(txns::list_txns(view)?
                .into_iter()
                .map(|id| id.to_string())
                .collect())
        })
    }

    /// Abort a transaction by name
    pub fn purge_txn(&self, name: &str) -> Result<()> {
        self.open_txn(name)?.abort()
    }

    /// Begin a transaction and wrap it in a commit editor
    pub fn editor(&self, base_rev: Revnum) -> Result<TxnEditor> {
        Ok(TxnEditor::new(self.begin_txn(base_rev)?))
    }

    // =========================================================================
    // Locks
    // =========================================================================

    /// Lock a file path for this handle's user
    pub fn lock(&self, target: &str, params: &LockParams) -> Result<Lock> {
        let access = self.access.read().clone();
        let lock = chronofs_locks::lock(&self.store, target, access.username.as_deref(), params)?;
        // The session that takes a lock carries its token.
        self.access.write().add_token(lock.token.clone());
        Ok(lock)
    }

    /// Release a lock
    pub fn unlock(&self, target: &str, token: Option<&str>, break_lock: bool) -> Result<()> {
        let access = self.access.read().clone();
        chronofs_locks::unlock(
            &self.store,
            target,
            access.username.as_deref(),
            token,
            break_lock,
        )
    }

    /// The lock on a path, if any
    pub fn get_lock(&self, target: &str) -> Result<Option<Lock>> {
        chronofs_locks::get_lock(&self.store, target)
    }

    /// All locks at or under a path
    pub fn get_locks(&self, target: &str, depth: LockDepth) -> Result<Vec<Lock>> {
        chronofs_locks::get_locks(&self.store, target, depth)
    }
}

impl std::fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filesystem").finish_non_exhaustive()
    }
}
