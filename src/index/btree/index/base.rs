use std::marker::PhantomData;
use std::sync::Arc;
use parking_lot::RwLock;

use crate::common::config::{DEFAULT_INTERNAL_MAX_SIZE, DEFAULT_LEAF_MAX_SIZE};
use crate::common::types::{PageId, Rid};
use crate::index::btree::codec::{self, decode_node, encode_node};
use crate::index::btree::error::BTreeError;
use crate::index::btree::key::IndexKey;
use crate::index::btree::node::BTreeNode;
use crate::storage::buffer::BufferPoolManager;

/// Disk-resident B+Tree mapping fixed-width keys to record ids.
///
/// The tree owns no pages: it remembers only the root page id and borrows
/// every node through the buffer pool for the duration of a pinned access.
/// The root pointer doubles as the tree latch — readers share it, mutators
/// hold it exclusively — which is the coarsest correct latching scheme.
pub struct BTreeIndex<K: IndexKey> {
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) root_page_id: RwLock<PageId>,
    pub(crate) leaf_max_size: usize,
    pub(crate) internal_max_size: usize,
    pub(crate) _phantom: PhantomData<K>,
}

impl<K: IndexKey> BTreeIndex<K> {
    /// Create an index with the default node fan-outs.
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, BTreeError> {
        let leaf_max = DEFAULT_LEAF_MAX_SIZE.min(codec::leaf_capacity::<K>());
        let internal_max = DEFAULT_INTERNAL_MAX_SIZE.min(codec::internal_capacity::<K>());
        Self::with_node_sizes(buffer_pool, leaf_max, internal_max)
    }

    /// Create an index with explicit node fan-outs (mostly for tests, which
    /// want small nodes to force splits and merges).
    pub fn with_node_sizes(
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self, BTreeError> {
        assert!(
            (3..=codec::leaf_capacity::<K>()).contains(&leaf_max_size),
            "leaf max size out of range"
        );
        assert!(
            (3..=codec::internal_capacity::<K>()).contains(&internal_max_size),
            "internal max size out of range"
        );

        let (root_page, root_page_id) = buffer_pool.new_page()?;
        let root: BTreeNode<K> = BTreeNode::new_leaf(leaf_max_size, root_page_id);
        encode_node(&root, &mut root_page.write())?;
        buffer_pool.unpin_page(root_page_id, true);

        Ok(Self {
            buffer_pool,
            root_page_id: RwLock::new(root_page_id),
            leaf_max_size,
            internal_max_size,
            _phantom: PhantomData,
        })
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    /// Point lookup.
    pub fn get(&self, key: &K) -> Result<Option<Rid>, BTreeError> {
        let root = self.root_page_id.read();
        let leaf_id = self.find_leaf(*root, key)?;

        let page = self.buffer_pool.fetch_page(leaf_id)?;
        let node = decode_node::<K>(&page.read())?;
        let result = node.leaf_lookup(key);
        self.buffer_pool.unpin_page(leaf_id, false);
        Ok(result)
    }

    /// Descend from `start` to the leaf that may contain `key`.
    pub(crate) fn find_leaf(&self, start: PageId, key: &K) -> Result<PageId, BTreeError> {
        let mut current = start;
        loop {
            let page = self.buffer_pool.fetch_page(current)?;
            let node = decode_node::<K>(&page.read())?;
            self.buffer_pool.unpin_page(current, false);

            if node.is_leaf() {
                return Ok(current);
            }
            current = node.children[node.child_index(key)];
        }
    }

    /// Descend from `start` always taking the leftmost child.
    pub(crate) fn find_leftmost_leaf(&self, start: PageId) -> Result<PageId, BTreeError> {
        let mut current = start;
        loop {
            let page = self.buffer_pool.fetch_page(current)?;
            let node = decode_node::<K>(&page.read())?;
            self.buffer_pool.unpin_page(current, false);

            if node.is_leaf() {
                return Ok(current);
            }
            current = node.children[0];
        }
    }

    /// Fetch and decode a leaf, releasing the pin before returning.
    pub(crate) fn load_leaf(&self, page_id: PageId) -> Result<BTreeNode<K>, BTreeError> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let node = decode_node::<K>(&page.read())?;
        self.buffer_pool.unpin_page(page_id, false);
        if !node.is_leaf() {
            return Err(BTreeError::InvalidPageFormat);
        }
        Ok(node)
    }

    /// Rewrite a node's persisted parent pointer.
    pub(crate) fn set_parent(&self, page_id: PageId, parent: PageId) -> Result<(), BTreeError> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        codec::write_parent_pointer(&mut page.write(), parent);
        self.buffer_pool.unpin_page(page_id, true);
        Ok(())
    }
}
