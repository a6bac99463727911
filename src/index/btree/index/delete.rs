use crate::common::types::{PageId, INVALID_PAGE_ID};
use crate::index::btree::codec::{decode_node, encode_node};
use crate::index::btree::error::BTreeError;
use crate::index::btree::key::IndexKey;
use crate::index::btree::node::BTreeNode;
use super::base::BTreeIndex;

impl<K: IndexKey> BTreeIndex<K> {
    /// Remove `key` from the tree. Removing an absent key is a no-op.
    pub fn remove(&self, key: &K) -> Result<(), BTreeError> {
        let mut root = self.root_page_id.write();
        self.remove_recursive(*root, key)?;

        // An internal root left with a single child is replaced by that
        // child; an empty leaf root simply stays as the empty tree.
        let root_page = self.buffer_pool.fetch_page(*root)?;
        let root_node = decode_node::<K>(&root_page.read())?;
        if !root_node.is_leaf() && root_node.children.len() == 1 {
            let only_child = root_node.children[0];
            self.buffer_pool.unpin_page(*root, false);
            self.buffer_pool.delete_page(*root)?;
            self.set_parent(only_child, INVALID_PAGE_ID)?;
            *root = only_child;
        } else {
            self.buffer_pool.unpin_page(*root, false);
        }
        Ok(())
    }

    fn remove_recursive(&self, page_id: PageId, key: &K) -> Result<(), BTreeError> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let mut node = decode_node::<K>(&page.read())?;

        if node.is_leaf() {
            if node.leaf_remove(key) {
                encode_node(&node, &mut page.write())?;
                self.buffer_pool.unpin_page(page_id, true);
            } else {
                self.buffer_pool.unpin_page(page_id, false);
            }
            return Ok(());
        }

        let child_index = node.child_index(key);
        let child_id = node.children[child_index];
        self.remove_recursive(child_id, key)?;

        let child_page = self.buffer_pool.fetch_page(child_id)?;
        let mut child = decode_node::<K>(&child_page.read())?;
        if child.size() >= child.min_size() {
            self.buffer_pool.unpin_page(child_id, false);
            self.buffer_pool.unpin_page(page_id, false);
            return Ok(());
        }

        // The child underflowed. Try to redistribute one entry from an
        // adjacent sibling; failing that, coalesce the two nodes and drop a
        // separator. Either way this node is rewritten, and our own caller
        // performs the same check one level up.
        if child_index > 0 {
            let left_id = node.children[child_index - 1];
            let left_page = self.buffer_pool.fetch_page(left_id)?;
            let mut left = decode_node::<K>(&left_page.read())?;

            if left.size() > left.min_size() {
                self.borrow_from_left(&mut node, child_index, &mut left, &mut child)?;
                encode_node(&left, &mut left_page.write())?;
                self.buffer_pool.unpin_page(left_id, true);
                encode_node(&child, &mut child_page.write())?;
                self.buffer_pool.unpin_page(child_id, true);
            } else {
                self.merge_into_left(&mut node, child_index, &mut left, &mut child)?;
                encode_node(&left, &mut left_page.write())?;
                self.buffer_pool.unpin_page(left_id, true);
                self.buffer_pool.unpin_page(child_id, false);
                self.buffer_pool.delete_page(child_id)?;
            }
        } else {
            let right_id = node.children[1];
            let right_page = self.buffer_pool.fetch_page(right_id)?;
            let mut right = decode_node::<K>(&right_page.read())?;

            if right.size() > right.min_size() {
                self.borrow_from_right(&mut node, child_index, &mut child, &mut right)?;
                encode_node(&right, &mut right_page.write())?;
                self.buffer_pool.unpin_page(right_id, true);
                encode_node(&child, &mut child_page.write())?;
                self.buffer_pool.unpin_page(child_id, true);
            } else {
                // The leftmost child has no left neighbour; pull its right
                // sibling into it instead.
                self.merge_right_into_child(&mut node, &mut child, &mut right)?;
                encode_node(&child, &mut child_page.write())?;
                self.buffer_pool.unpin_page(child_id, true);
                self.buffer_pool.unpin_page(right_id, false);
                self.buffer_pool.delete_page(right_id)?;
            }
        }

        encode_node(&node, &mut page.write())?;
        self.buffer_pool.unpin_page(page_id, true);
        Ok(())
    }

    /// Move the last entry of `left` to the front of `child` and refresh the
    /// separator between them.
    fn borrow_from_left(
        &self,
        parent: &mut BTreeNode<K>,
        child_index: usize,
        left: &mut BTreeNode<K>,
        child: &mut BTreeNode<K>,
    ) -> Result<(), BTreeError> {
        if child.is_leaf() {
            let last = left.keys.len() - 1;
            let key = left.keys.remove(last);
            let value = left.values.remove(last);
            child.keys.insert(0, key);
            child.values.insert(0, value);
            parent.keys[child_index - 1] = key;
        } else {
            // Rotate through the parent separator.
            child.keys.insert(0, parent.keys[child_index - 1]);
            let moved = left.children.remove(left.children.len() - 1);
            child.children.insert(0, moved);
            parent.keys[child_index - 1] = left.keys.remove(left.keys.len() - 1);
            self.set_parent(moved, child.page_id)?;
        }
        Ok(())
    }

    /// Move the first entry of `right` to the end of `child` and refresh the
    /// separator between them.
    fn borrow_from_right(
        &self,
        parent: &mut BTreeNode<K>,
        child_index: usize,
        child: &mut BTreeNode<K>,
        right: &mut BTreeNode<K>,
    ) -> Result<(), BTreeError> {
        if child.is_leaf() {
            let key = right.keys.remove(0);
            let value = right.values.remove(0);
            child.keys.push(key);
            child.values.push(value);
            parent.keys[child_index] = right.keys[0];
        } else {
            child.keys.push(parent.keys[child_index]);
            let moved = right.children.remove(0);
            child.children.push(moved);
            parent.keys[child_index] = right.keys.remove(0);
            self.set_parent(moved, child.page_id)?;
        }
        Ok(())
    }

    /// Merge `child` into its left sibling and drop the separator between
    /// them from `parent`. The caller deletes `child`'s page.
    fn merge_into_left(
        &self,
        parent: &mut BTreeNode<K>,
        child_index: usize,
        left: &mut BTreeNode<K>,
        child: &mut BTreeNode<K>,
    ) -> Result<(), BTreeError> {
        if child.is_leaf() {
            left.keys.append(&mut child.keys);
            left.values.append(&mut child.values);
            left.next_page_id = child.next_page_id;
        } else {
            left.keys.push(parent.keys[child_index - 1]);
            left.keys.append(&mut child.keys);
            for &grandchild in &child.children {
                self.set_parent(grandchild, left.page_id)?;
            }
            left.children.append(&mut child.children);
        }
        parent.keys.remove(child_index - 1);
        parent.children.remove(child_index);
        Ok(())
    }

    /// Merge the right sibling into the leftmost `child` and drop the first
    /// separator from `parent`. The caller deletes `right`'s page.
    fn merge_right_into_child(
        &self,
        parent: &mut BTreeNode<K>,
        child: &mut BTreeNode<K>,
        right: &mut BTreeNode<K>,
    ) -> Result<(), BTreeError> {
        if child.is_leaf() {
            child.keys.append(&mut right.keys);
            child.values.append(&mut right.values);
            child.next_page_id = right.next_page_id;
        } else {
            child.keys.push(parent.keys[0]);
            child.keys.append(&mut right.keys);
            for &grandchild in &right.children {
                self.set_parent(grandchild, child.page_id)?;
            }
            child.children.append(&mut right.children);
        }
        parent.keys.remove(0);
        parent.children.remove(1);
        Ok(())
    }
}
