pub mod codec;
pub mod error;
pub mod index;
pub mod key;
pub mod node;

pub use error::BTreeError;
pub use index::{BTreeIndex, BTreeIterator};
pub use key::IndexKey;
pub use node::{BTreeNode, NodeType};
