// Export public modules
pub mod common;
pub mod container;
pub mod index;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use container::hash::ExtendibleHashTable;
pub use storage::buffer::BufferPoolError;
pub use storage::buffer::BufferPoolManager;
pub use storage::buffer::LruKReplacer;
pub use index::btree::BTreeIndex;
pub use transaction::lock_manager::LockManager;
pub use transaction::transaction_manager::TransactionManager;
pub use transaction::{IsolationLevel, Transaction, TransactionState};
