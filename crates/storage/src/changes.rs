//! Per-change-set path change records
//!
//! Every editor-driven mutation appends one change record to its
//! transaction's list. At commit the list is re-keyed under the new
//! revision number, so `paths_changed(rev)` can answer without walking
//! two trees.

use crate::kv::{KvRead, Table, WriteScope};
use chronofs_core::{NodeRevisionId, Result, Revnum, TxnId};
use serde::{Deserialize, Serialize};

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Path added
    Add,
    /// Path contents or properties modified
    Modify,
    /// Path deleted
    Delete,
    /// Path deleted and re-added within one change set
    Replace,
}

/// One path change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Canonical path that changed
    pub path: String,
    /// The kind of change
    pub kind: ChangeKind,
    /// Resulting node-revision, absent for deletions
    pub node_rev: Option<NodeRevisionId>,
    /// True when file text changed
    pub text_mod: bool,
    /// True when properties changed
    pub prop_mod: bool,
}

fn txn_key(txn_id: &TxnId) -> String {
    format!("t{}", txn_id)
}

fn rev_key(rev: Revnum) -> String {
    format!("r{:020}", rev)
}

fn load(view: &impl KvRead, key: &str) -> Result<Vec<ChangeRecord>> {
    match view.get(Table::Changes, key) {
        Some(bytes) => Ok(bincode::deserialize(&bytes)?),
        None => Ok(Vec::new()),
    }
}

/// Append a change to a transaction's list
///
/// A second change on the same path folds into the first: delete-then-add
/// becomes `Replace`, repeated modifications merge their flags, and the
/// recorded node-revision is the latest one.
pub fn add_change(scope: &mut WriteScope<'_>, txn_id: &TxnId, change: ChangeRecord) -> Result<()> {
    let key = txn_key(txn_id);
    let mut list = load(scope, &key)?;
    if let Some(existing) = list.iter_mut().find(|c| c.path == change.path) {
        existing.kind = match (existing.kind, change.kind) {
            (ChangeKind::Delete, ChangeKind::Add) => ChangeKind::Replace,
            (_, ChangeKind::Delete) => ChangeKind::Delete,
            (ChangeKind::Add, _) => ChangeKind::Add,
            (ChangeKind::Replace, _) => ChangeKind::Replace,
            (_, kind) => kind,
        };
        existing.text_mod |= change.text_mod;
        existing.prop_mod |= change.prop_mod;
        existing.node_rev = change.node_rev;
    } else {
        list.push(change);
    }
    scope.put(Table::Changes, key, bincode::serialize(&list)?);
    Ok(())
}

/// The changes recorded so far by a transaction
pub fn txn_changes(view: &impl KvRead, txn_id: &TxnId) -> Result<Vec<ChangeRecord>> {
    load(view, &txn_key(txn_id))
}

/// The frozen changes of a committed revision
pub fn rev_changes(view: &impl KvRead, rev: Revnum) -> Result<Vec<ChangeRecord>> {
    load(view, &rev_key(rev))
}

/// Move a transaction's changes under its new revision number
pub fn freeze_changes(
    scope: &mut WriteScope<'_>,
    txn_id: &TxnId,
    rev: Revnum,
    rewrite: impl Fn(ChangeRecord) -> ChangeRecord,
) -> Result<()> {
    let key = txn_key(txn_id);
    let list: Vec<ChangeRecord> = load(scope, &key)?.into_iter().map(rewrite).collect();
    scope.delete(Table::Changes, &key);
    scope.put(Table::Changes, rev_key(rev), bincode::serialize(&list)?);
    Ok(())
}

/// Drop a transaction's changes (abort path)
pub fn purge_changes(scope: &mut WriteScope<'_>, txn_id: &TxnId) -> Result<()> {
    scope.delete(Table::Changes, &txn_key(txn_id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::Kv;

    fn change(path: &str, kind: ChangeKind) -> ChangeRecord {
        ChangeRecord {
            path: path.into(),
            kind,
            node_rev: None,
            text_mod: false,
            prop_mod: false,
        }
    }

    #[test]
    fn changes_accumulate_per_transaction() {
        let kv = Kv::new();
        let txn = TxnId::new("4");
        kv.with_write(|scope| {
            add_change(scope, &txn, change("/a", ChangeKind::Add))?;
            add_change(scope, &txn, change("/b", ChangeKind::Modify))?;
            Ok(())
        })
        .unwrap();
        kv.with_read(|view| {
            let list = txn_changes(view, &txn)?;
            assert_eq!(list.len(), 2);
            assert_eq!(list[0].path, "/a");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn delete_then_add_becomes_replace() {
        let kv = Kv::new();
        let txn = TxnId::new("5");
        kv.with_write(|scope| {
            add_change(scope, &txn, change("/f", ChangeKind::Delete))?;
            add_change(scope, &txn, change("/f", ChangeKind::Add))?;
            let list = txn_changes(scope, &txn)?;
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].kind, ChangeKind::Replace);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn modify_flags_merge() {
        let kv = Kv::new();
        let txn = TxnId::new("6");
        kv.with_write(|scope| {
            let mut first = change("/f", ChangeKind::Modify);
            first.text_mod = true;
            add_change(scope, &txn, first)?;
            let mut second = change("/f", ChangeKind::Modify);
            second.prop_mod = true;
            add_change(scope, &txn, second)?;
            let list = txn_changes(scope, &txn)?;
            assert!(list[0].text_mod && list[0].prop_mod);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn freeze_moves_the_list_under_the_revision() {
        let kv = Kv::new();
        let txn = TxnId::new("7");
        kv.with_write(|scope| {
            add_change(scope, &txn, change("/x", ChangeKind::Add))?;
            freeze_changes(scope, &txn, 3, |c| c)?;
            assert!(txn_changes(scope, &txn)?.is_empty());
            let frozen = rev_changes(scope, 3)?;
            assert_eq!(frozen.len(), 1);
            assert_eq!(frozen[0].path, "/x");
            Ok(())
        })
        .unwrap();
    }
}
