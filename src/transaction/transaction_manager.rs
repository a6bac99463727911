use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::lock_manager::LockManager;
use crate::transaction::{IsolationLevel, Transaction, TransactionState};

/// Creates transactions and tracks the active ones so the deadlock detector
/// can resolve a txn id back to its record.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    active: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Begin a new transaction at the given isolation level.
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.active.lock().insert(txn_id, txn.clone());
        txn
    }

    /// Look up an active transaction by id.
    pub fn get(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active.lock().get(&txn_id).cloned()
    }

    /// Commit: release every lock the transaction still holds and retire it.
    pub fn commit(&self, txn: &Arc<Transaction>, lock_manager: &LockManager) {
        lock_manager.release_all_locks(txn);
        txn.set_state(TransactionState::Committed);
        self.active.lock().remove(&txn.id());
    }

    /// Abort: same release path as commit; the caller (or executors above)
    /// are responsible for undoing any tuple changes.
    pub fn abort(&self, txn: &Arc<Transaction>, lock_manager: &LockManager) {
        txn.set_state(TransactionState::Aborted);
        lock_manager.release_all_locks(txn);
        self.active.lock().remove(&txn.id());
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
