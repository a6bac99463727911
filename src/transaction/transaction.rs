use std::collections::{HashMap, HashSet};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::common::types::{Rid, TableOid, TxnId};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Strict two-phase locking states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Lock modes for hierarchical (table/row) locking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
    IntentionShared,
    IntentionExclusive,
    SharedIntentionExclusive,
}

/// Why the lock manager aborted a transaction
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("lock requested while in the shrinking phase")]
    LockOnShrinking,

    #[error("shared lock requested under READ UNCOMMITTED")]
    LockSharedOnReadUncommitted,

    #[error("another transaction is already upgrading on this resource")]
    UpgradeConflict,

    #[error("requested upgrade is not a legal mode transition")]
    IncompatibleUpgrade,

    #[error("row lock requested without the required table lock")]
    TableLockNotPresent,

    #[error("unlock requested but no matching lock is held")]
    AttemptedUnlockButNoLockHeld,

    #[error("intention lock requested on a row")]
    AttemptedIntentionLockOnRow,

    #[error("table unlocked while its rows are still locked")]
    TableUnlockedBeforeUnlockingRows,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("transaction {txn_id} aborted: {reason}")]
pub struct TransactionAbort {
    pub txn_id: TxnId,
    pub reason: AbortReason,
}

#[derive(Default)]
struct LockSets {
    shared_tables: HashSet<TableOid>,
    exclusive_tables: HashSet<TableOid>,
    intention_shared_tables: HashSet<TableOid>,
    intention_exclusive_tables: HashSet<TableOid>,
    shared_intention_exclusive_tables: HashSet<TableOid>,
    shared_rows: HashMap<TableOid, HashSet<Rid>>,
    exclusive_rows: HashMap<TableOid, HashSet<Rid>>,
}

impl LockSets {
    fn table_set(&mut self, mode: LockMode) -> &mut HashSet<TableOid> {
        match mode {
            LockMode::Shared => &mut self.shared_tables,
            LockMode::Exclusive => &mut self.exclusive_tables,
            LockMode::IntentionShared => &mut self.intention_shared_tables,
            LockMode::IntentionExclusive => &mut self.intention_exclusive_tables,
            LockMode::SharedIntentionExclusive => &mut self.shared_intention_exclusive_tables,
        }
    }

    fn row_set(&mut self, mode: LockMode) -> &mut HashMap<TableOid, HashSet<Rid>> {
        match mode {
            LockMode::Shared => &mut self.shared_rows,
            LockMode::Exclusive => &mut self.exclusive_rows,
            _ => unreachable!("row locks are only ever S or X"),
        }
    }
}

/// An active transaction: its 2PL phase plus the bookkeeping of every lock it
/// holds, one set per table mode and per row mode. The lock manager is the
/// only writer of the lock sets; the state may also be flipped to `Aborted`
/// by the deadlock detector.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: RwLock<TransactionState>,
    lock_sets: Mutex<LockSets>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: RwLock::new(TransactionState::Growing),
            lock_sets: Mutex::new(LockSets::default()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.write() = state;
    }

    pub(crate) fn add_table_lock(&self, mode: LockMode, oid: TableOid) {
        self.lock_sets.lock().table_set(mode).insert(oid);
    }

    pub(crate) fn remove_table_lock(&self, mode: LockMode, oid: TableOid) {
        self.lock_sets.lock().table_set(mode).remove(&oid);
    }

    pub(crate) fn add_row_lock(&self, mode: LockMode, oid: TableOid, rid: Rid) {
        self.lock_sets.lock().row_set(mode).entry(oid).or_default().insert(rid);
    }

    pub(crate) fn remove_row_lock(&self, mode: LockMode, oid: TableOid, rid: Rid) {
        let mut sets = self.lock_sets.lock();
        let rows_by_table = sets.row_set(mode);
        if let Some(rows) = rows_by_table.get_mut(&oid) {
            rows.remove(&rid);
            if rows.is_empty() {
                rows_by_table.remove(&oid);
            }
        }
    }

    pub(crate) fn clear_lock_sets(&self) {
        *self.lock_sets.lock() = LockSets::default();
    }

    /// Does this transaction hold a table lock on `oid` in `mode`?
    pub fn holds_table_lock(&self, oid: TableOid, mode: LockMode) -> bool {
        self.lock_sets.lock().table_set(mode).contains(&oid)
    }

    /// Does this transaction hold a table lock on `oid` in any of `modes`?
    pub fn holds_table_lock_in(&self, oid: TableOid, modes: &[LockMode]) -> bool {
        modes.iter().any(|&mode| self.holds_table_lock(oid, mode))
    }

    /// Does this transaction hold a row lock on `(oid, rid)` in `mode`?
    pub fn holds_row_lock(&self, oid: TableOid, rid: Rid, mode: LockMode) -> bool {
        self.lock_sets
            .lock()
            .row_set(mode)
            .get(&oid)
            .is_some_and(|rows| rows.contains(&rid))
    }

    /// Does this transaction still hold any row lock on `oid`?
    pub fn holds_rows_on(&self, oid: TableOid) -> bool {
        let mut sets = self.lock_sets.lock();
        let shared = sets.row_set(LockMode::Shared).get(&oid).is_some_and(|r| !r.is_empty());
        let exclusive = sets
            .row_set(LockMode::Exclusive)
            .get(&oid)
            .is_some_and(|r| !r.is_empty());
        shared || exclusive
    }
}
