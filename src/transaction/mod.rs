pub mod lock_manager;
pub mod transaction;
pub mod transaction_manager;
pub mod wait_for_graph;

pub use lock_manager::LockManager;
pub use transaction::{
    AbortReason, IsolationLevel, LockMode, Transaction, TransactionAbort, TransactionState,
};
pub use transaction_manager::TransactionManager;
pub use wait_for_graph::WaitForGraph;
