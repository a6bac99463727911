use crate::common::types::{PageId, Rid};
use crate::index::btree::codec::{decode_node, encode_node};
use crate::index::btree::error::BTreeError;
use crate::index::btree::key::IndexKey;
use crate::index::btree::node::BTreeNode;
use super::base::BTreeIndex;

enum InsertResult<K> {
    Inserted,
    Duplicate,
    /// A child split: `separator` belongs in the parent, pointing at
    /// `right_page_id`.
    Split { separator: K, right_page_id: PageId },
}

impl<K: IndexKey> BTreeIndex<K> {
    /// Insert `key -> rid`. Returns `false` (tree unchanged) when the key is
    /// already present.
    pub fn insert(&self, key: K, rid: Rid) -> Result<bool, BTreeError> {
        let mut root = self.root_page_id.write();

        match self.insert_recursive(*root, key, rid)? {
            InsertResult::Duplicate => Ok(false),
            InsertResult::Inserted => Ok(true),
            InsertResult::Split { separator, right_page_id } => {
                // The old root split: grow the tree by one level.
                let (root_page, new_root_id) = self.buffer_pool.new_page()?;
                let mut new_root: BTreeNode<K> =
                    BTreeNode::new_internal(self.internal_max_size, new_root_id);
                new_root.keys.push(separator);
                new_root.children.push(*root);
                new_root.children.push(right_page_id);
                encode_node(&new_root, &mut root_page.write())?;
                self.buffer_pool.unpin_page(new_root_id, true);

                self.set_parent(*root, new_root_id)?;
                self.set_parent(right_page_id, new_root_id)?;
                *root = new_root_id;
                Ok(true)
            }
        }
    }

    fn insert_recursive(
        &self,
        page_id: PageId,
        key: K,
        rid: Rid,
    ) -> Result<InsertResult<K>, BTreeError> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let mut node = decode_node::<K>(&page.read())?;

        if node.is_leaf() {
            if !node.leaf_insert(key, rid) {
                self.buffer_pool.unpin_page(page_id, false);
                return Ok(InsertResult::Duplicate);
            }
            if node.keys.len() < self.leaf_max_size {
                // Still within the max-1 effective capacity.
                encode_node(&node, &mut page.write())?;
                self.buffer_pool.unpin_page(page_id, true);
                return Ok(InsertResult::Inserted);
            }

            // The insert spilled into the reserved overflow slot: split.
            let (right_page, right_id) = self.buffer_pool.new_page()?;
            let mut right: BTreeNode<K> = BTreeNode::new_leaf(self.leaf_max_size, right_id);
            let separator = node.split_leaf(&mut right);
            encode_node(&right, &mut right_page.write())?;
            self.buffer_pool.unpin_page(right_id, true);
            encode_node(&node, &mut page.write())?;
            self.buffer_pool.unpin_page(page_id, true);
            return Ok(InsertResult::Split { separator, right_page_id: right_id });
        }

        let child_index = node.child_index(&key);
        let child_id = node.children[child_index];
        let outcome = self.insert_recursive(child_id, key, rid)?;

        let (separator, right_child) = match outcome {
            InsertResult::Split { separator, right_page_id } => (separator, right_page_id),
            passthrough => {
                self.buffer_pool.unpin_page(page_id, false);
                return Ok(passthrough);
            }
        };

        node.internal_insert(child_index, separator, right_child);
        if node.children.len() <= self.internal_max_size {
            encode_node(&node, &mut page.write())?;
            self.buffer_pool.unpin_page(page_id, true);
            return Ok(InsertResult::Inserted);
        }

        // This internal node overflowed in turn.
        let (right_page, right_id) = self.buffer_pool.new_page()?;
        let mut right: BTreeNode<K> = BTreeNode::new_internal(self.internal_max_size, right_id);
        let up = node.split_internal(&mut right);
        for &child in &right.children {
            self.set_parent(child, right_id)?;
        }
        encode_node(&right, &mut right_page.write())?;
        self.buffer_pool.unpin_page(right_id, true);
        encode_node(&node, &mut page.write())?;
        self.buffer_pool.unpin_page(page_id, true);
        Ok(InsertResult::Split { separator: up, right_page_id: right_id })
    }
}
