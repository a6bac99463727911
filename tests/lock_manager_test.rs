use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cairndb::common::types::Rid;
use cairndb::transaction::{
    AbortReason, IsolationLevel, LockManager, LockMode, TransactionManager, TransactionState,
};

const TABLE_A: u32 = 1;

fn setup() -> (Arc<TransactionManager>, Arc<LockManager>) {
    let txn_manager = Arc::new(TransactionManager::new());
    let lock_manager = Arc::new(LockManager::with_detection_interval(
        txn_manager.clone(),
        Duration::from_millis(10),
    ));
    (txn_manager, lock_manager)
}

#[test]
fn test_table_lock_and_unlock() {
    let (txn_manager, lock_manager) = setup();
    let txn = txn_manager.begin(IsolationLevel::RepeatableRead);

    assert!(lock_manager.lock_table(&txn, LockMode::Shared, TABLE_A).unwrap());
    assert!(txn.holds_table_lock(TABLE_A, LockMode::Shared));
    assert_eq!(txn.state(), TransactionState::Growing);

    lock_manager.unlock_table(&txn, TABLE_A).unwrap();
    assert!(!txn.holds_table_lock(TABLE_A, LockMode::Shared));
    // Releasing S under REPEATABLE READ ends the growing phase.
    assert_eq!(txn.state(), TransactionState::Shrinking);
}

#[test]
fn test_shared_locks_coexist() {
    let (txn_manager, lock_manager) = setup();
    let t1 = txn_manager.begin(IsolationLevel::RepeatableRead);
    let t2 = txn_manager.begin(IsolationLevel::RepeatableRead);

    assert!(lock_manager.lock_table(&t1, LockMode::Shared, TABLE_A).unwrap());
    assert!(lock_manager.lock_table(&t2, LockMode::Shared, TABLE_A).unwrap());

    lock_manager.unlock_table(&t1, TABLE_A).unwrap();
    lock_manager.unlock_table(&t2, TABLE_A).unwrap();
}

#[test]
fn test_relocking_same_mode_is_idempotent() {
    let (txn_manager, lock_manager) = setup();
    let txn = txn_manager.begin(IsolationLevel::RepeatableRead);

    assert!(lock_manager.lock_table(&txn, LockMode::IntentionShared, TABLE_A).unwrap());
    assert!(lock_manager.lock_table(&txn, LockMode::IntentionShared, TABLE_A).unwrap());
    lock_manager.unlock_table(&txn, TABLE_A).unwrap();
}

#[test]
fn test_read_uncommitted_rejects_shared() {
    let (txn_manager, lock_manager) = setup();
    let txn = txn_manager.begin(IsolationLevel::ReadUncommitted);

    let err = lock_manager
        .lock_table(&txn, LockMode::Shared, TABLE_A)
        .unwrap_err();
    assert_eq!(err.reason, AbortReason::LockSharedOnReadUncommitted);
    assert_eq!(txn.state(), TransactionState::Aborted);
}

#[test]
fn test_lock_on_shrinking_aborts() {
    let (txn_manager, lock_manager) = setup();
    let txn = txn_manager.begin(IsolationLevel::RepeatableRead);

    lock_manager.lock_table(&txn, LockMode::Shared, TABLE_A).unwrap();
    lock_manager.unlock_table(&txn, TABLE_A).unwrap();
    assert_eq!(txn.state(), TransactionState::Shrinking);

    let err = lock_manager
        .lock_table(&txn, LockMode::IntentionShared, TABLE_A)
        .unwrap_err();
    assert_eq!(err.reason, AbortReason::LockOnShrinking);
    assert_eq!(txn.state(), TransactionState::Aborted);
}

#[test]
fn test_read_committed_allows_shared_while_shrinking() {
    let (txn_manager, lock_manager) = setup();
    let txn = txn_manager.begin(IsolationLevel::ReadCommitted);

    lock_manager.lock_table(&txn, LockMode::IntentionExclusive, TABLE_A).unwrap();
    lock_manager
        .lock_row(&txn, LockMode::Exclusive, TABLE_A, Rid::new(1, 1))
        .unwrap();
    lock_manager.unlock_row(&txn, TABLE_A, Rid::new(1, 1)).unwrap();
    assert_eq!(txn.state(), TransactionState::Shrinking);

    // Under READ COMMITTED, S and IS are still allowed while shrinking.
    assert!(lock_manager.lock_table(&txn, LockMode::IntentionShared, 2).unwrap());
}

#[test]
fn test_row_lock_preconditions() {
    let (txn_manager, lock_manager) = setup();
    let rid = Rid::new(2, 7);

    // Intention modes are illegal on rows.
    let txn = txn_manager.begin(IsolationLevel::RepeatableRead);
    let err = lock_manager
        .lock_row(&txn, LockMode::IntentionExclusive, TABLE_A, rid)
        .unwrap_err();
    assert_eq!(err.reason, AbortReason::AttemptedIntentionLockOnRow);

    // A row X needs the table locked in X, IX or SIX first.
    let txn = txn_manager.begin(IsolationLevel::RepeatableRead);
    let err = lock_manager
        .lock_row(&txn, LockMode::Exclusive, TABLE_A, rid)
        .unwrap_err();
    assert_eq!(err.reason, AbortReason::TableLockNotPresent);

    // An IS table lock covers row S but not row X.
    let txn = txn_manager.begin(IsolationLevel::RepeatableRead);
    lock_manager.lock_table(&txn, LockMode::IntentionShared, TABLE_A).unwrap();
    assert!(lock_manager.lock_row(&txn, LockMode::Shared, TABLE_A, rid).unwrap());
    let err = lock_manager
        .lock_row(&txn, LockMode::Exclusive, TABLE_A, Rid::new(2, 8))
        .unwrap_err();
    assert_eq!(err.reason, AbortReason::TableLockNotPresent);
}

#[test]
fn test_unlock_without_lock_aborts() {
    let (txn_manager, lock_manager) = setup();
    let txn = txn_manager.begin(IsolationLevel::RepeatableRead);

    let err = lock_manager.unlock_table(&txn, TABLE_A).unwrap_err();
    assert_eq!(err.reason, AbortReason::AttemptedUnlockButNoLockHeld);
}

#[test]
fn test_unlock_table_before_rows_aborts() {
    let (txn_manager, lock_manager) = setup();
    let txn = txn_manager.begin(IsolationLevel::RepeatableRead);
    let rid = Rid::new(3, 1);

    lock_manager.lock_table(&txn, LockMode::IntentionExclusive, TABLE_A).unwrap();
    lock_manager.lock_row(&txn, LockMode::Exclusive, TABLE_A, rid).unwrap();

    let err = lock_manager.unlock_table(&txn, TABLE_A).unwrap_err();
    assert_eq!(err.reason, AbortReason::TableUnlockedBeforeUnlockingRows);
}

#[test]
fn test_incompatible_upgrade_aborts() {
    let (txn_manager, lock_manager) = setup();
    let txn = txn_manager.begin(IsolationLevel::RepeatableRead);

    lock_manager.lock_table(&txn, LockMode::Shared, TABLE_A).unwrap();
    let err = lock_manager
        .lock_table(&txn, LockMode::IntentionShared, TABLE_A)
        .unwrap_err();
    assert_eq!(err.reason, AbortReason::IncompatibleUpgrade);
    assert_eq!(txn.state(), TransactionState::Aborted);
}

#[test]
fn test_upgrade_outranks_waiters() {
    let (txn_manager, lock_manager) = setup();
    let t1 = txn_manager.begin(IsolationLevel::RepeatableRead);
    let t2 = txn_manager.begin(IsolationLevel::RepeatableRead);

    assert!(lock_manager.lock_table(&t1, LockMode::Shared, TABLE_A).unwrap());

    // T2 queues up behind T1's S lock waiting for X.
    let t2_granted = Arc::new(AtomicBool::new(false));
    let waiter = {
        let lock_manager = lock_manager.clone();
        let t2 = t2.clone();
        let t2_granted = t2_granted.clone();
        thread::spawn(move || {
            let granted = lock_manager.lock_table(&t2, LockMode::Exclusive, TABLE_A).unwrap();
            t2_granted.store(true, Ordering::SeqCst);
            granted
        })
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!t2_granted.load(Ordering::SeqCst));

    // T1's upgrade slots in ahead of T2 and is granted immediately.
    assert!(lock_manager.lock_table(&t1, LockMode::Exclusive, TABLE_A).unwrap());
    assert!(t1.holds_table_lock(TABLE_A, LockMode::Exclusive));
    thread::sleep(Duration::from_millis(50));
    assert!(!t2_granted.load(Ordering::SeqCst));

    // Only T1's release lets T2 through.
    lock_manager.unlock_table(&t1, TABLE_A).unwrap();
    assert!(waiter.join().unwrap());
    assert!(t2.holds_table_lock(TABLE_A, LockMode::Exclusive));
    lock_manager.unlock_table(&t2, TABLE_A).unwrap();
}

#[test]
fn test_upgrade_conflict_aborts_second_upgrader() {
    let (txn_manager, lock_manager) = setup();
    let t1 = txn_manager.begin(IsolationLevel::RepeatableRead);
    let t2 = txn_manager.begin(IsolationLevel::RepeatableRead);

    lock_manager.lock_table(&t1, LockMode::Shared, TABLE_A).unwrap();
    lock_manager.lock_table(&t2, LockMode::Shared, TABLE_A).unwrap();

    // T1's upgrade waits for T2 to release its S lock.
    let upgrader = {
        let lock_manager = lock_manager.clone();
        let t1 = t1.clone();
        thread::spawn(move || lock_manager.lock_table(&t1, LockMode::Exclusive, TABLE_A).unwrap())
    };
    thread::sleep(Duration::from_millis(50));

    // A second upgrade on the same queue is refused outright.
    let err = lock_manager
        .lock_table(&t2, LockMode::Exclusive, TABLE_A)
        .unwrap_err();
    assert_eq!(err.reason, AbortReason::UpgradeConflict);
    assert_eq!(t2.state(), TransactionState::Aborted);

    // Releasing the aborted transaction's locks unblocks the upgrader.
    txn_manager.abort(&t2, &lock_manager);
    assert!(upgrader.join().unwrap());
    lock_manager.unlock_table(&t1, TABLE_A).unwrap();
}

#[test]
fn test_deadlock_detection_aborts_youngest() {
    let (txn_manager, lock_manager) = setup();
    let t1 = txn_manager.begin(IsolationLevel::RepeatableRead);
    let t2 = txn_manager.begin(IsolationLevel::RepeatableRead);
    let r1 = Rid::new(5, 1);
    let r2 = Rid::new(5, 2);

    lock_manager.lock_table(&t1, LockMode::IntentionExclusive, TABLE_A).unwrap();
    lock_manager.lock_table(&t2, LockMode::IntentionExclusive, TABLE_A).unwrap();
    assert!(lock_manager.lock_row(&t1, LockMode::Exclusive, TABLE_A, r1).unwrap());
    assert!(lock_manager.lock_row(&t2, LockMode::Exclusive, TABLE_A, r2).unwrap());

    // t1 waits for r2 while t2 waits for r1: a cycle the detector must
    // break by aborting the younger transaction (t2).
    let h1 = {
        let lock_manager = lock_manager.clone();
        let t1 = t1.clone();
        thread::spawn(move || lock_manager.lock_row(&t1, LockMode::Exclusive, TABLE_A, r2).unwrap())
    };
    let h2 = {
        let (txn_manager, lock_manager) = (txn_manager.clone(), lock_manager.clone());
        let t2 = t2.clone();
        thread::spawn(move || {
            let granted = lock_manager.lock_row(&t2, LockMode::Exclusive, TABLE_A, r1).unwrap();
            if !granted {
                // Victim: release everything so the survivor can proceed.
                txn_manager.abort(&t2, &lock_manager);
            }
            granted
        })
    };

    // The victim's wait returns false; the survivor ends up granted.
    assert!(!h2.join().unwrap());
    assert_eq!(t2.state(), TransactionState::Aborted);
    assert!(h1.join().unwrap());
    assert!(t1.holds_row_lock(TABLE_A, r2, LockMode::Exclusive));

    lock_manager.unlock_row(&t1, TABLE_A, r1).unwrap();
    lock_manager.unlock_row(&t1, TABLE_A, r2).unwrap();
    lock_manager.unlock_table(&t1, TABLE_A).unwrap();
}
