mod base;
mod delete;
mod insert;
mod iterator;

pub use base::BTreeIndex;
pub use iterator::BTreeIterator;
