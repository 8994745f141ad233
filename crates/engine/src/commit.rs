//! Atomic revision publication
//!
//! Under the repository write lock: verify every locked path the
//! transaction touches, merge newer commits into the transaction, freeze
//! its node-revisions by rewriting their transaction tags to the new
//! revision number, publish the revision record, and drop the transaction
//! record. The whole sequence runs in one ACID scope; a conflict or any
//! other failure leaves the transaction exactly as it was.
//!
//! Deltification of the new revision's changed file contents runs
//! afterwards, outside the critical section, and is best-effort: readers
//! see identical bytes before and after, and a failure only logs.

use crate::merge::merge_trees;
use crate::txn::Transaction;
use chronofs_core::{
    FsError, NodeRevisionId, RepKey, Result, Revnum, TxnId, PROP_REVISION_DATE,
};
use chronofs_dag::{dir, DagNode, DagOps};
use chronofs_storage::{
    changes, keys, nodes, now_rfc3339, reps, revisions, txns, ChangeKind, Revision, WriteScope,
};

/// Commit a transaction, producing the next revision number
pub fn commit_txn(txn: &Transaction) -> Result<Revnum> {
    let store = txn.store().clone();
    let access = txn.access().read().clone();
    let ops = DagOps {
        config: store.config(),
        cancel: store.cancel(),
    };

    let guard = store.acquire_write_lock();
    let (new_rev, deltify_list) = store.write(|scope| {
        verify_locks(scope, txn.id(), &access)?;

        // Merge in everything that committed since our base. Each pass
        // advances the base; under the write lock the head cannot move,
        // so the loop settles after one round.
        loop {
            let record = txns::get_txn(scope, txn.id())?;
            let youngest = revisions::youngest(scope)?;
            if youngest == record.base_rev {
                break;
            }
            let target = ops.clone_root(scope, txn.id())?;
            let source = DagNode::get(scope, &revisions::root_of(scope, youngest)?)?;
            let ancestor = DagNode::get(scope, &revisions::root_of(scope, record.base_rev)?)?;
            merge_trees(scope, &ops, txn.id(), &source, &target, &ancestor)?;

            let mut record = txns::get_txn(scope, txn.id())?;
            record.base_rev = youngest;
            txns::put_txn(scope, txn.id(), &record)?;
        }

        let record = txns::get_txn(scope, txn.id())?;
        let new_rev = keys::peek(scope, keys::COUNTER_REV)?;

        let mut deltify_list = Vec::new();
        let new_root_id =
            freeze_node(scope, &ops, txn.id(), &record.root_id, new_rev, &mut deltify_list)?;

        changes::freeze_changes(scope, txn.id(), new_rev, |mut change| {
            if let Some(id) = &change.node_rev {
                if id.is_txn_id(txn.id()) {
                    change.node_rev = Some(id.with_revision(new_rev));
                }
            }
            change
        })?;

        let mut props = record.props.clone();
        props.insert(PROP_REVISION_DATE.into(), now_rfc3339().into_bytes());
        let rev = revisions::put_next_revision(
            scope,
            &Revision {
                root_id: new_root_id,
                props,
            },
        )?;
        if rev != new_rev {
            return Err(FsError::corrupt(format!(
                "revision allocator moved during commit: expected {}, got {}",
                new_rev, rev
            )));
        }
        txns::delete_txn(scope, txn.id())?;
        Ok((rev, deltify_list))
    })?;
    drop(guard);

    tracing::info!(rev = new_rev, txn = %txn.id(), "committed revision");

    if store.config().deltify_on_commit {
        for (target, source) in deltify_list {
            let outcome =
                store.write(|scope| reps::rep_deltify(scope, ops.config, ops.cancel, &target, &source));
            if let Err(error) = outcome {
                tracing::warn!(%target, %source, %error, "post-commit deltification failed");
            }
        }
    }

    Ok(new_rev)
}

/// Check every path the transaction touches against the lock store
fn verify_locks(
    scope: &mut WriteScope<'_>,
    txn_id: &TxnId,
    access: &crate::access::AccessContext,
) -> Result<()> {
    let changed = changes::txn_changes(scope, txn_id)?;
    for change in &changed {
        // Deletions take out whole sub-trees, and directory changes may
        // shadow locked descendants; both get the recursive check.
        let recursive = match change.kind {
            ChangeKind::Delete => true,
            _ => match &change.node_rev {
                Some(id) => nodes::get_node_rev(scope, id)?.kind.is_dir(),
                None => true,
            },
        };
        chronofs_locks::allow_locked_operation(
            scope,
            &change.path,
            recursive,
            access.username.as_deref(),
            &access.lock_tokens,
        )?;
    }
    Ok(())
}

/// Freeze one node-revision, returning its committed id
///
/// Directories freeze their children first and rewrite any entry whose id
/// changed; representation records lose their transaction tags; finally
/// the record moves from its `t` id to the matching `r` id. Changed file
/// contents with a distinct predecessor representation are collected for
/// post-commit deltification.
fn freeze_node(
    scope: &mut WriteScope<'_>,
    ops: &DagOps<'_>,
    txn_id: &TxnId,
    id: &NodeRevisionId,
    new_rev: Revnum,
    deltify_list: &mut Vec<(RepKey, RepKey)>,
) -> Result<NodeRevisionId> {
    if !id.is_txn_id(txn_id) {
        return Ok(id.clone());
    }
    ops.cancel.check()?;

    if nodes::get_node_rev(scope, id)?.kind.is_dir() {
        let node = DagNode::get(scope, id)?;
        let entries = dir::entries(scope, ops.config, ops.cancel, &node)?;
        let mut rewritten = entries.clone();
        let mut changed = false;
        for (name, entry) in &entries {
            let frozen = freeze_node(scope, ops, txn_id, &entry.id, new_rev, deltify_list)?;
            if frozen != entry.id {
                if let Some(rewritten_entry) = rewritten.get_mut(name) {
                    rewritten_entry.id = frozen;
                }
                changed = true;
            }
        }
        if changed {
            dir::set_entries(scope, ops.config, ops.cancel, &node, txn_id, &rewritten)?;
        }
    }

    // Reload: a directory rewrite above may have touched the record.
    let record = nodes::get_node_rev(scope, id)?;

    let mut data_was_mutable = false;
    for (rep_key, is_data) in [(&record.props_rep, false), (&record.data_rep, true)] {
        if let Some(rep_key) = rep_key {
            let mut rep = reps::get_rep(scope, rep_key)?;
            if rep.txn_id.as_ref() == Some(txn_id) {
                rep.txn_id = None;
                reps::put_rep(scope, rep_key, &rep)?;
                if is_data {
                    data_was_mutable = true;
                }
            }
        }
    }

    // Files whose contents this transaction wrote become deltification
    // candidates against their predecessor's contents.
    if !record.kind.is_dir() && data_was_mutable {
        if let (Some(target), Some(pred)) = (&record.data_rep, &record.predecessor) {
            let pred_record = nodes::get_node_rev(scope, pred)?;
            if let Some(source) = pred_record.data_rep {
                if source != *target {
                    deltify_list.push((target.clone(), source));
                }
            }
        }
    }

    let new_id = id.with_revision(new_rev);
    nodes::put_node_rev(scope, &new_id, &record)?;
    nodes::delete_node_rev(scope, id)?;
    Ok(new_id)
}
