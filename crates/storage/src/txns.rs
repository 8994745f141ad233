//! The transaction table
//!
//! A transaction is a named, persistent workspace holding a mutable root
//! and a base revision. Records live here from `begin` until commit or
//! abort. Names are drawn from the shared base36 counter, so they consist
//! of `[A-Za-z0-9.-]` as required.

use crate::keys::{self, COUNTER_TXN};
use crate::kv::{KvRead, Table, WriteScope};
use chronofs_core::{FsError, NodeRevisionId, PropList, Result, Revnum, TxnId};
use serde::{Deserialize, Serialize};

/// One transaction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnRecord {
    /// Base revision the transaction was begun against
    pub base_rev: Revnum,
    /// Current root id: the base revision's root until the first
    /// mutation clones it into the transaction
    pub root_id: NodeRevisionId,
    /// Transaction properties (log message, author, …)
    pub props: PropList,
}

/// Create a transaction record, allocating its name
pub fn create_txn(scope: &mut WriteScope<'_>, record: &TxnRecord) -> Result<TxnId> {
    let name = keys::allocate(scope, COUNTER_TXN)?;
    scope.put(Table::Transactions, &name, bincode::serialize(record)?);
    Ok(TxnId::new(name))
}

/// Load a transaction record
pub fn get_txn(view: &impl KvRead, txn_id: &TxnId) -> Result<TxnRecord> {
    let bytes = view
        .get(Table::Transactions, txn_id.as_str())
        .ok_or_else(|| FsError::NoSuchTransaction {
            name: txn_id.to_string(),
        })?;
    Ok(bincode::deserialize(&bytes)?)
}

/// Store a transaction record
pub fn put_txn(scope: &mut WriteScope<'_>, txn_id: &TxnId, record: &TxnRecord) -> Result<()> {
    scope.put(
        Table::Transactions,
        txn_id.as_str(),
        bincode::serialize(record)?,
    );
    Ok(())
}

/// Remove a transaction record
pub fn delete_txn(scope: &mut WriteScope<'_>, txn_id: &TxnId) -> Result<()> {
    get_txn(scope, txn_id)?;
    scope.delete(Table::Transactions, txn_id.as_str());
    Ok(())
}

/// Names of all live transactions
pub fn list_txns(view: &impl KvRead) -> Result<Vec<TxnId>> {
    Ok(view
        .scan_prefix(Table::Transactions, "")
        .into_iter()
        .map(|(name, _)| TxnId::new(name))
        .collect())
}
