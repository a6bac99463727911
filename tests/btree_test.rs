use anyhow::Result;
use rand::prelude::*;

use cairndb::common::types::Rid;
use cairndb::index::btree::BTreeIndex;

mod common;
use common::create_test_buffer_pool;

fn rid(key: i32) -> Rid {
    Rid::new(1, key as u32)
}

#[test]
fn test_insert_and_get_without_split() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(16)?;
    let btree = BTreeIndex::<i32>::with_node_sizes(buffer_pool, 4, 4)?;

    assert!(btree.insert(2, rid(2))?);
    assert!(btree.insert(1, rid(1))?);
    assert!(btree.insert(3, rid(3))?);

    assert_eq!(btree.get(&1)?, Some(rid(1)));
    assert_eq!(btree.get(&2)?, Some(rid(2)));
    assert_eq!(btree.get(&3)?, Some(rid(3)));
    assert_eq!(btree.get(&4)?, None);
    Ok(())
}

#[test]
fn test_duplicate_insert_returns_false() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(16)?;
    let btree = BTreeIndex::<i32>::with_node_sizes(buffer_pool, 4, 4)?;

    assert!(btree.insert(7, rid(7))?);
    assert!(!btree.insert(7, Rid::new(9, 9))?);
    // The original mapping is untouched.
    assert_eq!(btree.get(&7)?, Some(rid(7)));
    Ok(())
}

#[test]
fn test_leaf_split_on_fourth_insert() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(16)?;
    let btree = BTreeIndex::<i32>::with_node_sizes(buffer_pool, 4, 4)?;

    let leaf_root = btree.root_page_id();
    for key in 1..=3 {
        assert!(btree.insert(key, rid(key))?);
    }
    // Three entries fit in a single leaf (effective capacity max-1).
    assert_eq!(btree.root_page_id(), leaf_root);

    // The fourth overflows the leaf and grows an internal root above two
    // linked leaves.
    assert!(btree.insert(4, rid(4))?);
    assert_ne!(btree.root_page_id(), leaf_root);

    for key in 1..=4 {
        assert_eq!(btree.get(&key)?, Some(rid(key)));
    }

    let entries: Vec<_> = btree.scan()?.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(
        entries,
        vec![(1, rid(1)), (2, rid(2)), (3, rid(3)), (4, rid(4))]
    );
    Ok(())
}

#[test]
fn test_coalesce_collapses_root() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(16)?;
    let btree = BTreeIndex::<i32>::with_node_sizes(buffer_pool, 4, 4)?;

    for key in 1..=4 {
        btree.insert(key, rid(key))?;
    }
    let split_root = btree.root_page_id();

    // Deleting 1 underflows the left leaf and its sibling is at minimum, so
    // the two leaves merge and the internal root collapses to a single leaf.
    btree.remove(&1)?;
    btree.remove(&2)?;
    assert_ne!(btree.root_page_id(), split_root);

    assert_eq!(btree.get(&1)?, None);
    assert_eq!(btree.get(&2)?, None);
    assert_eq!(btree.get(&3)?, Some(rid(3)));
    assert_eq!(btree.get(&4)?, Some(rid(4)));

    let entries: Vec<_> = btree.scan()?.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(entries, vec![(3, rid(3)), (4, rid(4))]);
    Ok(())
}

#[test]
fn test_remove_absent_key_is_noop() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(16)?;
    let btree = BTreeIndex::<i32>::with_node_sizes(buffer_pool, 4, 4)?;

    btree.insert(1, rid(1))?;
    btree.remove(&99)?;
    btree.remove(&99)?;
    assert_eq!(btree.get(&1)?, Some(rid(1)));
    Ok(())
}

#[test]
fn test_remove_until_empty_and_reinsert() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(16)?;
    let btree = BTreeIndex::<i32>::with_node_sizes(buffer_pool, 4, 4)?;

    for key in 1..=10 {
        btree.insert(key, rid(key))?;
    }
    for key in 1..=10 {
        btree.remove(&key)?;
        assert_eq!(btree.get(&key)?, None);
    }
    assert!(btree.scan()?.next().is_none());

    // The empty tree accepts fresh inserts.
    btree.insert(5, rid(5))?;
    assert_eq!(btree.get(&5)?, Some(rid(5)));
    Ok(())
}

#[test]
fn test_sequential_inserts_stay_sorted() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(32)?;
    let btree = BTreeIndex::<i32>::with_node_sizes(buffer_pool, 5, 4)?;

    for key in 0..100 {
        assert!(btree.insert(key, rid(key))?);
    }
    for key in (100..200).rev() {
        assert!(btree.insert(key, rid(key))?);
    }

    for key in 0..200 {
        assert_eq!(btree.get(&key)?, Some(rid(key)));
    }

    let keys: Vec<i32> = btree
        .scan()?
        .map(|entry| entry.map(|(k, _)| k))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(keys, (0..200).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_scan_from_and_range_scan() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(32)?;
    let btree = BTreeIndex::<i32>::with_node_sizes(buffer_pool, 4, 4)?;

    for key in (0..50).map(|k| k * 2) {
        btree.insert(key, rid(key))?;
    }

    // scan_from positions at the first key >= the probe, present or not.
    let first = btree.scan_from(&10)?.next().unwrap()?;
    assert_eq!(first.0, 10);
    let first = btree.scan_from(&11)?.next().unwrap()?;
    assert_eq!(first.0, 12);

    let rids = btree.range_scan(&10, &20)?;
    assert_eq!(
        rids,
        vec![rid(10), rid(12), rid(14), rid(16), rid(18), rid(20)]
    );

    // Inverted and out-of-range bounds yield nothing.
    assert!(btree.range_scan(&20, &10)?.is_empty());
    assert!(btree.range_scan(&200, &300)?.is_empty());
    Ok(())
}

#[test]
fn test_randomized_workload() -> Result<()> {
    let (buffer_pool, _file) = create_test_buffer_pool(32)?;
    let btree = BTreeIndex::<i32>::with_node_sizes(buffer_pool, 5, 5)?;
    let mut rng = StdRng::seed_from_u64(0xCA1D);

    let mut keys: Vec<i32> = (0..300).collect();
    keys.shuffle(&mut rng);
    for &key in &keys {
        assert!(btree.insert(key, rid(key))?);
    }
    for &key in &keys {
        assert_eq!(btree.get(&key)?, Some(rid(key)));
    }

    // Remove a random half and verify both halves.
    keys.shuffle(&mut rng);
    let (removed, kept) = keys.split_at(150);
    for &key in removed {
        btree.remove(&key)?;
    }
    for &key in removed {
        assert_eq!(btree.get(&key)?, None);
    }
    for &key in kept {
        assert_eq!(btree.get(&key)?, Some(rid(key)));
    }

    // The leaf chain stays globally sorted.
    let mut expected: Vec<i32> = kept.to_vec();
    expected.sort_unstable();
    let scanned: Vec<i32> = btree
        .scan()?
        .map(|entry| entry.map(|(k, _)| k))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(scanned, expected);
    Ok(())
}
