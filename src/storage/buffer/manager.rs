use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::common::config::DEFAULT_BUCKET_SIZE;
use crate::common::types::{Frame, FrameId, FramePtr, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::container::hash::ExtendibleHashTable;
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruKReplacer;
use crate::storage::disk::DiskManager;

/// Fixed-size page cache over the disk manager.
///
/// Frames live in a fixed array; every piece of bookkeeping — the free list,
/// the LRU-K replacer, the extendible-hash page table and the page id
/// counter — sits behind one pool-level mutex. A page with a positive pin
/// count is never offered to the replacer, so disk-backed handles stay valid
/// for as long as their holder keeps the pin.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<FramePtr>,
    disk_manager: Arc<DiskManager>,
    inner: Mutex<PoolInner>,
}

struct PoolInner {
    free_list: VecDeque<FrameId>,
    replacer: LruKReplacer,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    next_page_id: PageId,
}

impl BufferPoolManager {
    pub fn new(
        pool_size: usize,
        replacer_k: usize,
        db_path: impl AsRef<Path>,
    ) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = i as FrameId;
            let page = Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID)));
            frames.push(Arc::new(RwLock::new(Frame::new(frame_id, page))));
            free_list.push_back(frame_id);
        }

        Ok(Self {
            pool_size,
            frames,
            disk_manager,
            inner: Mutex::new(PoolInner {
                free_list,
                replacer: LruKReplacer::new(pool_size, replacer_k),
                page_table: ExtendibleHashTable::new(DEFAULT_BUCKET_SIZE),
                next_page_id: 1,
            }),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Allocate a brand-new page and pin it into a frame.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut inner = self.inner.lock();
        let frame_id = self.acquire_frame(&mut inner)?;

        let page_id = inner.next_page_id;
        inner.next_page_id += 1;
        debug!("allocating page {} into frame {}", page_id, frame_id);

        self.bind_frame(&mut inner, frame_id, page_id, false)?;
        let page = self.frames[frame_id as usize].read().page.clone();
        Ok((page, page_id))
    }

    /// Fetch a page, reading it from disk on a cache miss. The returned
    /// handle is pinned; callers must balance it with `unpin_page`.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        let mut inner = self.inner.lock();

        if let Some(frame_id) = inner.page_table.find(&page_id) {
            let frame = &self.frames[frame_id as usize];
            frame.write().pin_count += 1;
            inner.replacer.record_access(frame_id);
            inner.replacer.set_evictable(frame_id, false);
            return Ok(frame.read().page.clone());
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        self.bind_frame(&mut inner, frame_id, page_id, true)?;
        Ok(self.frames[frame_id as usize].read().page.clone())
    }

    /// Drop one pin on `page_id`, ORing in the caller's dirty flag. Returns
    /// `false` when the page is not resident or its pin count is already 0.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut inner = self.inner.lock();
        let frame_id = match inner.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return false,
        };

        let frame = &self.frames[frame_id as usize];
        let remaining = {
            let mut guard = frame.write();
            if guard.pin_count == 0 {
                return false;
            }
            guard.pin_count -= 1;
            guard.is_dirty |= is_dirty;
            guard.pin_count
        };

        if remaining == 0 {
            inner.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Write `page_id` through to disk regardless of its dirty flag.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let inner = self.inner.lock();
        let frame_id = inner
            .page_table
            .find(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;
        self.flush_frame(frame_id)
    }

    /// Write every resident page through to disk.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let _inner = self.inner.lock();
        for frame_id in 0..self.pool_size {
            let bound = self.frames[frame_id].read().page.read().page_id != INVALID_PAGE_ID;
            if bound {
                self.flush_frame(frame_id as FrameId)?;
            }
        }
        Ok(())
    }

    /// Evict `page_id` from the pool and release its on-disk storage.
    /// Returns `Ok(true)` when the page is gone (or was never resident) and
    /// `Ok(false)` when a pin prevents the deletion.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let mut inner = self.inner.lock();
        let frame_id = match inner.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(true),
        };

        let frame = &self.frames[frame_id as usize];
        {
            let mut guard = frame.write();
            if guard.pin_count > 0 {
                return Ok(false);
            }
            guard.page.write().reset();
            guard.is_dirty = false;
        }

        inner.replacer.remove(frame_id);
        inner.page_table.remove(&page_id);
        inner.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);
        Ok(true)
    }

    /// Obtain a usable frame: from the free list if possible, otherwise by
    /// evicting a replacer victim (writing it back first when dirty).
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let victim = inner.replacer.evict().ok_or(BufferPoolError::NoFreeFrames)?;
        let frame = &self.frames[victim as usize];
        let (old_page_id, dirty) = {
            let guard = frame.read();
            let page_id = guard.page.read().page_id;
            (page_id, guard.is_dirty)
        };
        debug!("evicting page {} from frame {}", old_page_id, victim);

        if dirty {
            let page_copy = frame.read().page.read().clone();
            self.disk_manager.write_page(&page_copy)?;
        }

        {
            let mut guard = frame.write();
            guard.page.write().reset();
            guard.is_dirty = false;
            guard.pin_count = 0;
        }
        inner.page_table.remove(&old_page_id);
        Ok(victim)
    }

    /// Bind `page_id` to `frame_id` with an initial pin, optionally filling
    /// the frame from disk.
    fn bind_frame(
        &self,
        inner: &mut PoolInner,
        frame_id: FrameId,
        page_id: PageId,
        load_from_disk: bool,
    ) -> Result<(), BufferPoolError> {
        let frame = &self.frames[frame_id as usize];
        {
            let mut guard = frame.write();
            {
                let mut page = guard.page.write();
                page.reset();
                page.page_id = page_id;
                if load_from_disk {
                    self.disk_manager.read_page(page_id, &mut page)?;
                }
            }
            guard.pin_count = 1;
            guard.is_dirty = false;
        }

        inner.page_table.insert(page_id, frame_id);
        inner.replacer.record_access(frame_id);
        inner.replacer.set_evictable(frame_id, false);
        Ok(())
    }

    fn flush_frame(&self, frame_id: FrameId) -> Result<(), BufferPoolError> {
        let frame = &self.frames[frame_id as usize];
        let page_copy = frame.read().page.read().clone();
        self.disk_manager.write_page(&page_copy)?;
        frame.write().is_dirty = false;
        Ok(())
    }
}
