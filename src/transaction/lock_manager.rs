use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use log::warn;
use parking_lot::{Condvar, Mutex};

use crate::common::config::CYCLE_DETECTION_INTERVAL;
use crate::common::types::{Rid, TableOid, TxnId};
use crate::transaction::transaction_manager::TransactionManager;
use crate::transaction::wait_for_graph::WaitForGraph;
use crate::transaction::{
    AbortReason, IsolationLevel, LockMode, Transaction, TransactionAbort, TransactionState,
};

/// One entry in a resource's request queue.
#[derive(Debug, Clone, Copy)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

/// FIFO queue of lock requests on one resource (a table or a row), with the
/// single in-flight upgrade slot and the condvar its waiters sleep on.
struct LockRequestQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

#[derive(Default)]
struct QueueInner {
    requests: Vec<LockRequest>,
    upgrading: Option<TxnId>,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            cv: Condvar::new(),
        }
    }
}

/// Holder/requester compatibility per the multi-granularity matrix.
fn compatible(held: LockMode, requested: LockMode) -> bool {
    use LockMode::*;
    match held {
        Shared => matches!(requested, Shared | IntentionShared),
        Exclusive => false,
        IntentionShared => !matches!(requested, Exclusive),
        IntentionExclusive => matches!(requested, IntentionShared | IntentionExclusive),
        SharedIntentionExclusive => matches!(requested, IntentionShared),
    }
}

/// Legal lock upgrades.
fn can_upgrade(held: LockMode, requested: LockMode) -> bool {
    use LockMode::*;
    match held {
        IntentionShared => matches!(
            requested,
            Shared | Exclusive | IntentionExclusive | SharedIntentionExclusive
        ),
        Shared | IntentionExclusive => {
            matches!(requested, Exclusive | SharedIntentionExclusive)
        }
        SharedIntentionExclusive => requested == Exclusive,
        Exclusive => false,
    }
}

/// Does releasing a lock of `mode` end the growing phase at `isolation`?
fn shrinks_on_unlock(mode: LockMode, isolation: IsolationLevel) -> bool {
    match isolation {
        IsolationLevel::RepeatableRead => {
            matches!(mode, LockMode::Shared | LockMode::Exclusive)
        }
        IsolationLevel::ReadCommitted | IsolationLevel::ReadUncommitted => {
            mode == LockMode::Exclusive
        }
    }
}

struct LockManagerShared {
    table_lock_map: Mutex<HashMap<TableOid, Arc<LockRequestQueue>>>,
    row_lock_map: Mutex<HashMap<Rid, Arc<LockRequestQueue>>>,
    txn_manager: Arc<TransactionManager>,
    shutdown: AtomicBool,
}

/// Hierarchical lock manager enforcing strict two-phase locking.
///
/// Lock ordering is two-level everywhere: the map-level mutex is taken
/// first, then the per-queue mutex, and the map mutex is dropped before any
/// wait. A background thread periodically builds the wait-for graph and
/// aborts the youngest transaction on each cycle; the thread is signalled
/// and joined when the lock manager is dropped.
pub struct LockManager {
    shared: Arc<LockManagerShared>,
    detector: Option<JoinHandle<()>>,
}

impl LockManager {
    pub fn new(txn_manager: Arc<TransactionManager>) -> Self {
        Self::with_detection_interval(txn_manager, CYCLE_DETECTION_INTERVAL)
    }

    pub fn with_detection_interval(
        txn_manager: Arc<TransactionManager>,
        interval: Duration,
    ) -> Self {
        let shared = Arc::new(LockManagerShared {
            table_lock_map: Mutex::new(HashMap::new()),
            row_lock_map: Mutex::new(HashMap::new()),
            txn_manager,
            shutdown: AtomicBool::new(false),
        });

        let worker = shared.clone();
        let detector = thread::spawn(move || {
            while !worker.shutdown.load(Ordering::Acquire) {
                thread::sleep(interval);
                if worker.shutdown.load(Ordering::Acquire) {
                    break;
                }
                worker.detect_deadlocks();
            }
        });

        Self {
            shared,
            detector: Some(detector),
        }
    }

    /// Acquire a table lock. `Ok(true)` is a grant; `Ok(false)` means the
    /// wait was cut short because the deadlock detector aborted this
    /// transaction; `Err` is a validation abort (state already `Aborted`).
    pub fn lock_table(
        &self,
        txn: &Transaction,
        mode: LockMode,
        oid: TableOid,
    ) -> Result<bool, TransactionAbort> {
        self.shared.validate_lock_request(txn, mode)?;

        let queue = {
            let mut map = self.shared.table_lock_map.lock();
            map.entry(oid)
                .or_insert_with(|| Arc::new(LockRequestQueue::new()))
                .clone()
        };
        self.shared.acquire(&queue, txn, mode, oid, None)
    }

    /// Acquire a row lock. Rows only take `Shared` or `Exclusive`, and the
    /// owning table must already be locked in a covering mode.
    pub fn lock_row(
        &self,
        txn: &Transaction,
        mode: LockMode,
        oid: TableOid,
        rid: Rid,
    ) -> Result<bool, TransactionAbort> {
        use LockMode::*;

        if !matches!(mode, Shared | Exclusive) {
            return Err(abort(txn, AbortReason::AttemptedIntentionLockOnRow));
        }
        self.shared.validate_lock_request(txn, mode)?;

        let covering: &[LockMode] = match mode {
            Exclusive => &[Exclusive, IntentionExclusive, SharedIntentionExclusive],
            _ => &[
                Exclusive,
                IntentionExclusive,
                SharedIntentionExclusive,
                Shared,
                IntentionShared,
            ],
        };
        if !txn.holds_table_lock_in(oid, covering) {
            return Err(abort(txn, AbortReason::TableLockNotPresent));
        }

        let queue = {
            let mut map = self.shared.row_lock_map.lock();
            map.entry(rid)
                .or_insert_with(|| Arc::new(LockRequestQueue::new()))
                .clone()
        };
        self.shared.acquire(&queue, txn, mode, oid, Some(rid))
    }

    /// Release a table lock. Errors if no matching grant exists or rows of
    /// this table are still locked by the transaction.
    pub fn unlock_table(&self, txn: &Transaction, oid: TableOid) -> Result<(), TransactionAbort> {
        let queue = {
            let map = self.shared.table_lock_map.lock();
            match map.get(&oid) {
                Some(queue) => queue.clone(),
                None => return Err(abort(txn, AbortReason::AttemptedUnlockButNoLockHeld)),
            }
        };

        if txn.holds_rows_on(oid) {
            return Err(abort(txn, AbortReason::TableUnlockedBeforeUnlockingRows));
        }

        let mode = {
            let mut q = queue.inner.lock();
            let pos = q
                .requests
                .iter()
                .position(|r| r.txn_id == txn.id() && r.granted);
            let pos = match pos {
                Some(pos) => pos,
                None => {
                    drop(q);
                    return Err(abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
                }
            };
            let mode = q.requests[pos].mode;
            q.requests.remove(pos);
            queue.cv.notify_all();
            mode
        };

        maybe_shrink(txn, mode);
        txn.remove_table_lock(mode, oid);
        Ok(())
    }

    /// Release a row lock.
    pub fn unlock_row(
        &self,
        txn: &Transaction,
        oid: TableOid,
        rid: Rid,
    ) -> Result<(), TransactionAbort> {
        let queue = {
            let map = self.shared.row_lock_map.lock();
            match map.get(&rid) {
                Some(queue) => queue.clone(),
                None => return Err(abort(txn, AbortReason::AttemptedUnlockButNoLockHeld)),
            }
        };

        let mode = {
            let mut q = queue.inner.lock();
            let pos = q
                .requests
                .iter()
                .position(|r| r.txn_id == txn.id() && r.granted);
            let pos = match pos {
                Some(pos) => pos,
                None => {
                    drop(q);
                    return Err(abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
                }
            };
            let mode = q.requests[pos].mode;
            q.requests.remove(pos);
            queue.cv.notify_all();
            mode
        };

        maybe_shrink(txn, mode);
        txn.remove_row_lock(mode, oid, rid);
        Ok(())
    }

    /// Drop every request the transaction still has anywhere, waking the
    /// affected queues. Used by commit/abort, which bypass unlock
    /// validation.
    pub fn release_all_locks(&self, txn: &Transaction) {
        let txn_id = txn.id();
        let row_queues: Vec<_> = self.shared.row_lock_map.lock().values().cloned().collect();
        let table_queues: Vec<_> = self.shared.table_lock_map.lock().values().cloned().collect();

        for queue in row_queues.into_iter().chain(table_queues) {
            let mut q = queue.inner.lock();
            let before = q.requests.len();
            q.requests.retain(|r| r.txn_id != txn_id);
            if q.upgrading == Some(txn_id) {
                q.upgrading = None;
            }
            if q.requests.len() != before {
                queue.cv.notify_all();
            }
        }

        txn.clear_lock_sets();
    }

    /// Run one deadlock detection pass immediately (the background worker
    /// does this on its own every interval).
    pub fn detect_deadlocks_now(&self) {
        self.shared.detect_deadlocks();
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.detector.take() {
            let _ = handle.join();
        }
    }
}

fn abort(txn: &Transaction, reason: AbortReason) -> TransactionAbort {
    txn.set_state(TransactionState::Aborted);
    TransactionAbort {
        txn_id: txn.id(),
        reason,
    }
}

fn maybe_shrink(txn: &Transaction, mode: LockMode) {
    if txn.state() == TransactionState::Growing && shrinks_on_unlock(mode, txn.isolation_level()) {
        txn.set_state(TransactionState::Shrinking);
    }
}

/// FIFO grant rule: every already-granted request must be compatible, and no
/// other waiter may sit ahead of the candidate.
fn grant_allowed(q: &QueueInner, txn_id: TxnId) -> bool {
    let candidate = match q.requests.iter().find(|r| r.txn_id == txn_id) {
        Some(request) => request,
        None => return false,
    };
    for request in &q.requests {
        if request.granted {
            if !compatible(request.mode, candidate.mode) {
                return false;
            }
        } else {
            return request.txn_id == txn_id;
        }
    }
    false
}

impl LockManagerShared {
    /// Isolation-level and 2PL-phase validation shared by table and row
    /// acquisition.
    fn validate_lock_request(
        &self,
        txn: &Transaction,
        mode: LockMode,
    ) -> Result<(), TransactionAbort> {
        use LockMode::*;

        match txn.isolation_level() {
            IsolationLevel::ReadUncommitted => {
                if matches!(mode, Shared | IntentionShared | SharedIntentionExclusive) {
                    return Err(abort(txn, AbortReason::LockSharedOnReadUncommitted));
                }
                if txn.state() == TransactionState::Shrinking
                    && matches!(mode, Exclusive | IntentionExclusive)
                {
                    return Err(abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::ReadCommitted => {
                if txn.state() == TransactionState::Shrinking
                    && !matches!(mode, Shared | IntentionShared)
                {
                    return Err(abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::RepeatableRead => {
                if txn.state() == TransactionState::Shrinking {
                    return Err(abort(txn, AbortReason::LockOnShrinking));
                }
            }
        }
        Ok(())
    }

    /// Enqueue (or upgrade) a request on `queue` and block until it is
    /// granted or the transaction is aborted from outside.
    fn acquire(
        &self,
        queue: &Arc<LockRequestQueue>,
        txn: &Transaction,
        mode: LockMode,
        oid: TableOid,
        rid: Option<Rid>,
    ) -> Result<bool, TransactionAbort> {
        let txn_id = txn.id();
        let mut q = queue.inner.lock();

        let mut is_upgrade = false;
        if let Some(pos) = q.requests.iter().position(|r| r.txn_id == txn_id) {
            let held = q.requests[pos].mode;
            if held == mode {
                return Ok(true);
            }
            // Only one upgrade may be in flight per resource.
            if q.upgrading.is_some() {
                drop(q);
                return Err(abort(txn, AbortReason::UpgradeConflict));
            }
            if !can_upgrade(held, mode) {
                drop(q);
                return Err(abort(txn, AbortReason::IncompatibleUpgrade));
            }

            q.requests.remove(pos);
            erase_lock(txn, held, oid, rid);

            // The upgrade request outranks ordinary waiters: it slots in
            // right behind the granted prefix.
            let insert_at = q
                .requests
                .iter()
                .position(|r| !r.granted)
                .unwrap_or(q.requests.len());
            q.requests.insert(
                insert_at,
                LockRequest {
                    txn_id,
                    mode,
                    granted: false,
                },
            );
            q.upgrading = Some(txn_id);
            is_upgrade = true;
        } else {
            q.requests.push(LockRequest {
                txn_id,
                mode,
                granted: false,
            });
        }

        while !grant_allowed(&q, txn_id) {
            queue.cv.wait(&mut q);
            // The deadlock detector may have chosen us as the victim while
            // we slept; spurious wakeups land here too and simply re-check.
            if txn.state() == TransactionState::Aborted {
                if is_upgrade {
                    q.upgrading = None;
                }
                if let Some(pos) = q.requests.iter().position(|r| r.txn_id == txn_id) {
                    q.requests.remove(pos);
                }
                queue.cv.notify_all();
                return Ok(false);
            }
        }

        if let Some(request) = q.requests.iter_mut().find(|r| r.txn_id == txn_id) {
            request.granted = true;
        }
        if is_upgrade {
            q.upgrading = None;
        }
        record_lock(txn, mode, oid, rid);

        // An exclusive grant cannot coexist with anything else, so there is
        // no one worth waking.
        if mode != LockMode::Exclusive {
            queue.cv.notify_all();
        }
        Ok(true)
    }

    /// One pass of the background detector: snapshot waiter -> holder edges
    /// from every queue, then abort the youngest transaction on each cycle
    /// until the graph is acyclic.
    fn detect_deadlocks(&self) {
        let mut graph = WaitForGraph::default();
        let mut waiting_on_table: HashMap<TxnId, TableOid> = HashMap::new();
        let mut waiting_on_row: HashMap<TxnId, Rid> = HashMap::new();

        {
            let table_map = self.table_lock_map.lock();
            let row_map = self.row_lock_map.lock();

            for (&oid, queue) in table_map.iter() {
                let q = queue.inner.lock();
                let granted: Vec<TxnId> = q
                    .requests
                    .iter()
                    .filter(|r| r.granted)
                    .map(|r| r.txn_id)
                    .collect();
                for request in q.requests.iter().filter(|r| !r.granted) {
                    waiting_on_table.insert(request.txn_id, oid);
                    for &holder in &granted {
                        graph.add_edge(request.txn_id, holder);
                    }
                }
            }

            for (&rid, queue) in row_map.iter() {
                let q = queue.inner.lock();
                let granted: Vec<TxnId> = q
                    .requests
                    .iter()
                    .filter(|r| r.granted)
                    .map(|r| r.txn_id)
                    .collect();
                for request in q.requests.iter().filter(|r| !r.granted) {
                    waiting_on_row.insert(request.txn_id, rid);
                    for &holder in &granted {
                        graph.add_edge(request.txn_id, holder);
                    }
                }
            }
        }

        while let Some(cycle) = graph.find_cycle() {
            let victim = match cycle.iter().copied().max() {
                Some(victim) => victim,
                None => break,
            };
            warn!("deadlock among {:?}, aborting youngest txn {}", cycle, victim);

            if let Some(txn) = self.txn_manager.get(victim) {
                txn.set_state(TransactionState::Aborted);
            }
            graph.remove_txn(victim);

            if let Some(&oid) = waiting_on_table.get(&victim) {
                if let Some(queue) = self.table_lock_map.lock().get(&oid).cloned() {
                    let _q = queue.inner.lock();
                    queue.cv.notify_all();
                }
            }
            if let Some(&rid) = waiting_on_row.get(&victim) {
                if let Some(queue) = self.row_lock_map.lock().get(&rid).cloned() {
                    let _q = queue.inner.lock();
                    queue.cv.notify_all();
                }
            }
        }
    }
}

fn record_lock(txn: &Transaction, mode: LockMode, oid: TableOid, rid: Option<Rid>) {
    match rid {
        None => txn.add_table_lock(mode, oid),
        Some(rid) => txn.add_row_lock(mode, oid, rid),
    }
}

fn erase_lock(txn: &Transaction, mode: LockMode, oid: TableOid, rid: Option<Rid>) {
    match rid {
        None => txn.remove_table_lock(mode, oid),
        Some(rid) => txn.remove_row_lock(mode, oid, rid),
    }
}
