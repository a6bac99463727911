use std::collections::{HashMap, VecDeque};

use crate::common::types::FrameId;

/// LRU-K page replacement policy.
///
/// Frames with fewer than `k` recorded accesses have infinite backward
/// k-distance and live in `history`, ordered by first access; frames with at
/// least `k` accesses live in `cache`, ordered by recency. Eviction prefers
/// the least recently arrived evictable frame in `history`, falling back to
/// the least recently used evictable frame in `cache`.
///
/// Not internally synchronized; the buffer pool serializes all calls under
/// its own latch.
pub struct LruKReplacer {
    num_frames: usize,
    k: usize,
    /// Most recent at the front; eviction scans from the back.
    history: VecDeque<FrameId>,
    cache: VecDeque<FrameId>,
    entries: HashMap<FrameId, FrameEntry>,
    evictable_count: usize,
}

struct FrameEntry {
    access_count: usize,
    evictable: bool,
    in_history: bool,
}

fn detach(list: &mut VecDeque<FrameId>, frame_id: FrameId) {
    if let Some(pos) = list.iter().position(|&id| id == frame_id) {
        list.remove(pos);
    }
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            num_frames,
            k,
            history: VecDeque::with_capacity(num_frames),
            cache: VecDeque::with_capacity(num_frames),
            entries: HashMap::with_capacity(num_frames),
            evictable_count: 0,
        }
    }

    /// Record an access to `frame_id`. Reaching `k` accesses migrates the
    /// frame from the history list to the cache list; later accesses refresh
    /// its cache position. An unknown frame is ignored when every slot is
    /// already tracked (the buffer pool never lets that happen).
    pub fn record_access(&mut self, frame_id: FrameId) {
        if !self.entries.contains_key(&frame_id) {
            if self.entries.len() >= self.num_frames {
                return;
            }
            self.entries.insert(
                frame_id,
                FrameEntry {
                    access_count: 0,
                    evictable: false,
                    in_history: true,
                },
            );
            self.history.push_front(frame_id);
        }

        let entry = match self.entries.get_mut(&frame_id) {
            Some(entry) => entry,
            None => return,
        };
        entry.access_count += 1;
        if entry.access_count < self.k {
            // Below k accesses the frame keeps its arrival position.
            return;
        }

        if entry.in_history {
            entry.in_history = false;
            detach(&mut self.history, frame_id);
        } else {
            detach(&mut self.cache, frame_id);
        }
        self.cache.push_front(frame_id);
    }

    /// Toggle whether `frame_id` may be evicted. No-op for unknown frames.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let entry = match self.entries.get_mut(&frame_id) {
            Some(entry) => entry,
            None => return,
        };
        if entry.evictable && !evictable {
            self.evictable_count -= 1;
        } else if !entry.evictable && evictable {
            self.evictable_count += 1;
        }
        entry.evictable = evictable;
    }

    /// Drop `frame_id` from the replacer entirely. The frame must be
    /// evictable; removing an unknown frame is a no-op.
    pub fn remove(&mut self, frame_id: FrameId) {
        let entry = match self.entries.remove(&frame_id) {
            Some(entry) => entry,
            None => return,
        };
        debug_assert!(entry.evictable, "only evictable frames may be removed");
        if entry.in_history {
            detach(&mut self.history, frame_id);
        } else {
            detach(&mut self.cache, frame_id);
        }
        if entry.evictable {
            self.evictable_count -= 1;
        }
    }

    /// Select and remove the evictable frame with the largest backward
    /// k-distance, or `None` when no frame is evictable.
    pub fn evict(&mut self) -> Option<FrameId> {
        let from_history = Self::pick_lru(&self.history, &self.entries);
        let victim = from_history.or_else(|| Self::pick_lru(&self.cache, &self.entries))?;

        let entry = self.entries.remove(&victim)?;
        if entry.in_history {
            detach(&mut self.history, victim);
        } else {
            detach(&mut self.cache, victim);
        }
        self.evictable_count -= 1;
        Some(victim)
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.evictable_count
    }

    fn pick_lru(list: &VecDeque<FrameId>, entries: &HashMap<FrameId, FrameEntry>) -> Option<FrameId> {
        list.iter()
            .rev()
            .find(|id| entries.get(id).is_some_and(|e| e.evictable))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_beats_cache() {
        let mut replacer = LruKReplacer::new(3, 2);
        replacer.record_access(1);
        replacer.record_access(2);
        replacer.record_access(3);
        for f in 1..=3 {
            replacer.set_evictable(f, true);
        }
        assert_eq!(replacer.size(), 3);

        // Frame 1 reaches k accesses and moves to the cache list; the
        // remaining history frames (infinite distance) are preferred victims.
        replacer.record_access(1);
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(3));
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_pinned_frames_are_skipped() {
        let mut replacer = LruKReplacer::new(3, 2);
        replacer.record_access(1);
        replacer.record_access(2);
        replacer.set_evictable(1, false);
        replacer.set_evictable(2, true);
        assert_eq!(replacer.size(), 1);

        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(1, true);
        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    fn test_cache_is_lru_ordered() {
        let mut replacer = LruKReplacer::new(3, 2);
        // All three frames reach the cache list.
        for f in 1..=3 {
            replacer.record_access(f);
            replacer.record_access(f);
            replacer.set_evictable(f, true);
        }
        // Touch frame 1 again so frame 2 is the coldest.
        replacer.record_access(1);
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), Some(3));
        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    fn test_unknown_frame_is_ignored_when_full() {
        let mut replacer = LruKReplacer::new(2, 2);
        replacer.record_access(1);
        replacer.record_access(2);
        // Every slot is tracked; a third frame is dropped on the floor.
        replacer.record_access(3);
        replacer.set_evictable(3, true);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut replacer = LruKReplacer::new(2, 2);
        replacer.remove(42);
        assert_eq!(replacer.size(), 0);

        replacer.record_access(1);
        replacer.set_evictable(1, true);
        replacer.remove(1);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }
}
