//! The filesystem store handle
//!
//! `FsStore` bundles the ordered-KV tables with the handle's
//! configuration, its cancellation hook, and the repository write lock
//! that serializes commits and lock mutations. Opening a second handle
//! onto the same repository shares the tables and the write lock but
//! carries its own configuration and cancellation.
//!
//! Creating a store initializes revision 0: an empty root directory and
//! an `svn:date` stamp.

use crate::kv::{with_retry, Kv, ReadView, WriteScope};
use crate::revisions::{self, Revision};
use crate::{keys, nodes};
use chronofs_core::{
    Cancel, ChangeSetId, CopyId, FsConfig, NodeId, NodeKind, NodeRevision, NodeRevisionId,
    PropList, Result, PROP_REVISION_DATE,
};
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// A handle onto one repository's tables
#[derive(Clone)]
pub struct FsStore {
    kv: Arc<Kv>,
    write_lock: Arc<Mutex<()>>,
    config: FsConfig,
    cancel: Cancel,
}

impl FsStore {
    /// Create a fresh repository with revision 0 in place
    pub fn create(config: FsConfig) -> Result<FsStore> {
        config.validate()?;
        let store = FsStore {
            kv: Arc::new(Kv::new()),
            write_lock: Arc::new(Mutex::new(())),
            config,
            cancel: Cancel::never(),
        };
        store.write(|scope| {
            let node_id = NodeId::new(keys::allocate(scope, keys::COUNTER_NODE)?);
            let root_id =
                NodeRevisionId::new(node_id, CopyId::new("0"), ChangeSetId::Rev(0));
            nodes::put_node_rev(scope, &root_id, &NodeRevision::new(NodeKind::Dir, "/"))?;
            let mut props = PropList::new();
            props.insert(PROP_REVISION_DATE.into(), now_rfc3339().into_bytes());
            revisions::put_next_revision(scope, &Revision { root_id, props })?;
            Ok(())
        })?;
        tracing::info!("created repository at revision 0");
        Ok(store)
    }

    /// Open another handle onto the same repository
    ///
    /// The new handle shares tables and the write lock; configuration and
    /// cancellation are its own, and the configuration is validated like
    /// at create.
    pub fn new_handle(&self, config: FsConfig, cancel: Cancel) -> Result<FsStore> {
        config.validate()?;
        Ok(FsStore {
            kv: Arc::clone(&self.kv),
            write_lock: Arc::clone(&self.write_lock),
            config,
            cancel,
        })
    }

    /// This handle's configuration
    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// This handle's cancellation hook
    pub fn cancel(&self) -> &Cancel {
        &self.cancel
    }

    /// Install a cancellation hook on this handle
    pub fn set_cancel(&mut self, cancel: Cancel) {
        self.cancel = cancel;
    }

    /// Run a read scope against a consistent view
    pub fn read<T>(&self, f: impl FnOnce(&ReadView<'_>) -> Result<T>) -> Result<T> {
        self.kv.with_read(f)
    }

    /// Run a write scope, retrying transient storage conditions
    ///
    /// The closure may run more than once; it must not capture partial
    /// results across attempts.
    pub fn write<T>(&self, mut f: impl FnMut(&mut WriteScope<'_>) -> Result<T>) -> Result<T> {
        with_retry(self.config.max_retries, || self.kv.with_write(&mut f))
    }

    /// Acquire the repository write lock
    ///
    /// Commits and path-lock mutations hold this for their whole critical
    /// section; it serializes them across every handle on the repository.
    pub fn acquire_write_lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }
}

impl std::fmt::Debug for FsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The current UTC time in RFC 3339 form, as stored in `svn:date`
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
