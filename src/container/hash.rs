use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use parking_lot::Mutex;

/// Directory-and-bucket extendible hash table.
///
/// The directory holds `2^global_depth` slots; each slot points at a bucket
/// whose `local_depth <= global_depth`. A key lands in the bucket selected by
/// the low `global_depth` bits of its hash. Overflowing a bucket splits only
/// that bucket, doubling the directory first when the bucket is already at
/// global depth. Buckets are never merged back.
///
/// Serves as the buffer pool's page table; all operations go through one
/// table-level mutex.
pub struct ExtendibleHashTable<K, V> {
    inner: Mutex<Inner<K, V>>,
}

struct Inner<K, V> {
    global_depth: usize,
    bucket_size: usize,
    /// Bucket arena; never shrinks. `dir` entries are indices into it.
    buckets: Vec<Bucket<K, V>>,
    dir: Vec<usize>,
}

struct Bucket<K, V> {
    local_depth: usize,
    items: Vec<(K, V)>,
}

fn hash_of<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket_size must be positive");
        Self {
            inner: Mutex::new(Inner {
                global_depth: 0,
                bucket_size,
                buckets: vec![Bucket { local_depth: 0, items: Vec::new() }],
                dir: vec![0],
            }),
        }
    }

    /// Look up the value stored under `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let slot = inner.dir_slot(hash_of(key));
        inner.buckets[slot]
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Insert `key -> value`, overwriting any existing entry for the key.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        let hash = hash_of(&key);
        // A single insert may need several splits when every colliding key
        // keeps landing on the same side of the new discriminating bit.
        loop {
            let slot = inner.dir_slot(hash);
            let bucket_size = inner.bucket_size;
            let bucket = &mut inner.buckets[slot];
            if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| k == &key) {
                entry.1 = value;
                return;
            }
            if bucket.items.len() < bucket_size {
                bucket.items.push((key, value));
                return;
            }

            if inner.buckets[slot].local_depth == inner.global_depth {
                inner.grow_directory();
            }
            inner.split_bucket(slot);
        }
    }

    /// Remove the entry for `key`, reporting whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let slot = inner.dir_slot(hash_of(key));
        let bucket = &mut inner.buckets[slot];
        if let Some(pos) = bucket.items.iter().position(|(k, _)| k == key) {
            bucket.items.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn global_depth(&self) -> usize {
        self.inner.lock().global_depth
    }

    pub fn local_depth(&self, dir_index: usize) -> usize {
        let inner = self.inner.lock();
        inner.buckets[inner.dir[dir_index]].local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    pub fn dir_size(&self) -> usize {
        self.inner.lock().dir.len()
    }
}

impl<K, V> Inner<K, V>
where
    K: Hash + Eq,
{
    fn dir_slot(&self, hash: u64) -> usize {
        let mask = (1usize << self.global_depth) - 1;
        self.dir[(hash as usize) & mask]
    }

    /// Double the directory; each new slot aliases its low-half counterpart.
    fn grow_directory(&mut self) {
        let old = self.dir.clone();
        self.dir.extend(old);
        self.global_depth += 1;
    }

    /// Split the bucket at arena index `slot` into itself and a fresh bucket,
    /// one local-depth level deeper. Entries whose hash has the new
    /// discriminating bit set move to the new bucket, as do the directory
    /// slots addressing that half of the old equivalence class.
    fn split_bucket(&mut self, slot: usize) {
        let depth = self.buckets[slot].local_depth;
        self.buckets[slot].local_depth += 1;

        let new_slot = self.buckets.len();
        self.buckets.push(Bucket {
            local_depth: depth + 1,
            items: Vec::new(),
        });

        // All slots of the old class agree on the low `depth` bits, so bit
        // `depth` of the slot index picks the half that moves.
        for i in 0..self.dir.len() {
            if self.dir[i] == slot && (i >> depth) & 1 == 1 {
                self.dir[i] = new_slot;
            }
        }

        let items = std::mem::take(&mut self.buckets[slot].items);
        for (k, v) in items {
            if (hash_of(&k) >> depth) & 1 == 1 {
                self.buckets[new_slot].items.push((k, v));
            } else {
                self.buckets[slot].items.push((k, v));
            }
        }
    }
}
