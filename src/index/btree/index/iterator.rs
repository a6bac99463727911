use parking_lot::RwLockReadGuard;

use crate::common::types::{PageId, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::key::IndexKey;
use super::base::BTreeIndex;

/// Forward scan over the leaf chain.
///
/// Holds the tree latch shared for the duration of the scan and materializes
/// one leaf's entries at a time, so at most one leaf page is pinned at any
/// moment (and only while it is being loaded). Exhaustion is the iterator's
/// natural end; an I/O failure is yielded once as an `Err` and terminates
/// the scan.
pub struct BTreeIterator<'a, K: IndexKey> {
    tree: &'a BTreeIndex<K>,
    _latch: RwLockReadGuard<'a, PageId>,
    entries: std::vec::IntoIter<(K, Rid)>,
    next_page_id: PageId,
    failed: bool,
}

impl<K: IndexKey> Iterator for BTreeIterator<'_, K> {
    type Item = Result<(K, Rid), BTreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.entries.next() {
                return Some(Ok(entry));
            }
            if self.failed || self.next_page_id == INVALID_PAGE_ID {
                return None;
            }
            match self.tree.load_leaf(self.next_page_id) {
                Ok(leaf) => {
                    self.next_page_id = leaf.next_page_id;
                    let entries: Vec<_> = leaf.keys.into_iter().zip(leaf.values).collect();
                    self.entries = entries.into_iter();
                }
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<K: IndexKey> BTreeIndex<K> {
    /// Iterate from the smallest key in the tree.
    pub fn scan(&self) -> Result<BTreeIterator<'_, K>, BTreeError> {
        let latch = self.root_page_id.read();
        let leftmost = self.find_leftmost_leaf(*latch)?;
        Ok(BTreeIterator {
            tree: self,
            _latch: latch,
            entries: Vec::new().into_iter(),
            next_page_id: leftmost,
            failed: false,
        })
    }

    /// Iterate from the first entry whose key is `>= key`.
    pub fn scan_from(&self, key: &K) -> Result<BTreeIterator<'_, K>, BTreeError> {
        let latch = self.root_page_id.read();
        let leaf_id = self.find_leaf(*latch, key)?;
        let leaf = self.load_leaf(leaf_id)?;

        let start = match leaf.keys.binary_search(key) {
            Ok(pos) | Err(pos) => pos,
        };
        let next_page_id = leaf.next_page_id;
        let entries: Vec<_> = leaf
            .keys
            .into_iter()
            .zip(leaf.values)
            .skip(start)
            .collect();

        Ok(BTreeIterator {
            tree: self,
            _latch: latch,
            entries: entries.into_iter(),
            next_page_id,
            failed: false,
        })
    }

    /// Collect the record ids of every entry with key in `[low, high]`.
    pub fn range_scan(&self, low: &K, high: &K) -> Result<Vec<Rid>, BTreeError> {
        let mut result = Vec::new();
        if low > high {
            return Ok(result);
        }
        for entry in self.scan_from(low)? {
            let (key, rid) = entry?;
            if &key > high {
                break;
            }
            result.push(rid);
        }
        Ok(result)
    }
}
