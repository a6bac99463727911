use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, Rid, PAGE_SIZE};
use crate::index::btree::error::BTreeError;
use crate::index::btree::key::IndexKey;
use crate::index::btree::node::{BTreeNode, NodeType};

// Shared 24-byte node header:
//   page_type (4) | size (4) | max_size (4) | parent_page_id (4) |
//   page_id (4) | reserved (4)
// Leaves add next_page_id (4) at offset 24, entries follow at 28.
// Internal entries start at 24; the first entry's key slot is unused.
pub(crate) const HEADER_SIZE: usize = 24;

const PAGE_TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const MAX_SIZE_OFFSET: usize = 8;
const PARENT_OFFSET: usize = 12;
const PAGE_ID_OFFSET: usize = 16;
const LEAF_NEXT_OFFSET: usize = HEADER_SIZE;
const LEAF_ENTRIES_OFFSET: usize = HEADER_SIZE + 4;
const INTERNAL_ENTRIES_OFFSET: usize = HEADER_SIZE;

const LEAF_PAGE_TYPE: u32 = 1;
const INTERNAL_PAGE_TYPE: u32 = 2;

/// Width of an encoded Rid: heap page id + slot number.
const RID_LEN: usize = 8;

/// Largest leaf `max_size` whose entries fit in one page.
pub fn leaf_capacity<K: IndexKey>() -> usize {
    (PAGE_SIZE - LEAF_ENTRIES_OFFSET) / (K::ENCODED_LEN + RID_LEN)
}

/// Largest internal `max_size` (child count) whose entries fit in one page.
pub fn internal_capacity<K: IndexKey>() -> usize {
    (PAGE_SIZE - INTERNAL_ENTRIES_OFFSET) / (K::ENCODED_LEN + 4)
}

/// Serialize a node into its page image.
pub fn encode_node<K: IndexKey>(node: &BTreeNode<K>, page: &mut Page) -> Result<(), BTreeError> {
    page.data.fill(0);

    let (tag, size) = match node.node_type {
        NodeType::Leaf => (LEAF_PAGE_TYPE, node.keys.len()),
        NodeType::Internal => (INTERNAL_PAGE_TYPE, node.children.len()),
    };
    LittleEndian::write_u32(&mut page.data[PAGE_TYPE_OFFSET..], tag);
    LittleEndian::write_u32(&mut page.data[SIZE_OFFSET..], size as u32);
    LittleEndian::write_u32(&mut page.data[MAX_SIZE_OFFSET..], node.max_size as u32);
    LittleEndian::write_u32(&mut page.data[PARENT_OFFSET..], node.parent_page_id);
    LittleEndian::write_u32(&mut page.data[PAGE_ID_OFFSET..], node.page_id);

    match node.node_type {
        NodeType::Leaf => {
            LittleEndian::write_u32(&mut page.data[LEAF_NEXT_OFFSET..], node.next_page_id);
            let width = K::ENCODED_LEN + RID_LEN;
            if LEAF_ENTRIES_OFFSET + size * width > PAGE_SIZE {
                return Err(BTreeError::NodeTooLarge);
            }
            let mut offset = LEAF_ENTRIES_OFFSET;
            for (key, rid) in node.keys.iter().zip(&node.values) {
                key.encode(&mut page.data[offset..offset + K::ENCODED_LEN]);
                offset += K::ENCODED_LEN;
                LittleEndian::write_u32(&mut page.data[offset..], rid.page_id);
                LittleEndian::write_u32(&mut page.data[offset + 4..], rid.slot_num);
                offset += RID_LEN;
            }
        }
        NodeType::Internal => {
            let width = K::ENCODED_LEN + 4;
            if INTERNAL_ENTRIES_OFFSET + size * width > PAGE_SIZE {
                return Err(BTreeError::NodeTooLarge);
            }
            let mut offset = INTERNAL_ENTRIES_OFFSET;
            for (i, child) in node.children.iter().enumerate() {
                // Entry 0's key slot stays zeroed.
                if i > 0 {
                    node.keys[i - 1].encode(&mut page.data[offset..offset + K::ENCODED_LEN]);
                }
                LittleEndian::write_u32(&mut page.data[offset + K::ENCODED_LEN..], *child);
                offset += width;
            }
        }
    }

    Ok(())
}

/// Deserialize a node from its page image.
pub fn decode_node<K: IndexKey>(page: &Page) -> Result<BTreeNode<K>, BTreeError> {
    let tag = LittleEndian::read_u32(&page.data[PAGE_TYPE_OFFSET..]);
    let size = LittleEndian::read_u32(&page.data[SIZE_OFFSET..]) as usize;
    let max_size = LittleEndian::read_u32(&page.data[MAX_SIZE_OFFSET..]) as usize;
    let parent_page_id = LittleEndian::read_u32(&page.data[PARENT_OFFSET..]);
    let page_id = LittleEndian::read_u32(&page.data[PAGE_ID_OFFSET..]);

    match tag {
        LEAF_PAGE_TYPE => {
            let width = K::ENCODED_LEN + RID_LEN;
            if LEAF_ENTRIES_OFFSET + size * width > PAGE_SIZE {
                return Err(BTreeError::InvalidPageFormat);
            }
            let mut node = BTreeNode::new_leaf(max_size, page_id);
            node.parent_page_id = parent_page_id;
            node.next_page_id = LittleEndian::read_u32(&page.data[LEAF_NEXT_OFFSET..]);
            let mut offset = LEAF_ENTRIES_OFFSET;
            for _ in 0..size {
                node.keys.push(K::decode(&page.data[offset..offset + K::ENCODED_LEN]));
                offset += K::ENCODED_LEN;
                let rid_page = LittleEndian::read_u32(&page.data[offset..]);
                let rid_slot = LittleEndian::read_u32(&page.data[offset + 4..]);
                node.values.push(Rid::new(rid_page, rid_slot));
                offset += RID_LEN;
            }
            Ok(node)
        }
        INTERNAL_PAGE_TYPE => {
            let width = K::ENCODED_LEN + 4;
            if INTERNAL_ENTRIES_OFFSET + size * width > PAGE_SIZE {
                return Err(BTreeError::InvalidPageFormat);
            }
            let mut node = BTreeNode::new_internal(max_size, page_id);
            node.parent_page_id = parent_page_id;
            let mut offset = INTERNAL_ENTRIES_OFFSET;
            for i in 0..size {
                if i > 0 {
                    node.keys.push(K::decode(&page.data[offset..offset + K::ENCODED_LEN]));
                }
                node.children
                    .push(LittleEndian::read_u32(&page.data[offset + K::ENCODED_LEN..]));
                offset += width;
            }
            Ok(node)
        }
        _ => Err(BTreeError::InvalidPageFormat),
    }
}

/// Rewrite just the parent pointer in a node's page image.
pub fn write_parent_pointer(page: &mut Page, parent_page_id: PageId) {
    LittleEndian::write_u32(&mut page.data[PARENT_OFFSET..], parent_page_id);
}
