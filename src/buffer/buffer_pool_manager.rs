use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::{
    AccessType, FrameId, PageId, Result, SiltError, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::page_guard::ReleaseCallback;
use super::{BasicPageGuard, FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Bookkeeping protected by the pool latch.
///
/// Every frame is either in `free_list` or the image of exactly one page id in
/// `page_table`; the pool holds the latch for the full duration of each public
/// operation, including waits on disk I/O.
struct PoolInner {
    /// Maps resident page ids to their frames
    page_table: HashMap<PageId, FrameId>,
    /// Frames not bound to any page, used as a stack
    free_list: Vec<FrameId>,
    /// Next page id to hand out
    next_page_id: u32,
}

/// State shared between the pool and its page guards.
struct PoolState {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    /// The pool latch
    latch: Mutex<PoolInner>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
    /// Disk scheduler for page I/O
    disk_scheduler: DiskScheduler,
}

impl PoolState {
    /// Obtains an unbound frame: pops the free list, or evicts a victim,
    /// writing its contents back first if dirty. The old binding is removed
    /// from the page table and the frame is reset.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.evict().ok_or(SiltError::BufferPoolFull)?;
        let frame = &self.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            debug!("evicting dirty page {old_page_id}, writing back");
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
        }

        inner.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }

    /// Decrements a page's pin count, ORing in the dirty flag. Marks the
    /// frame evictable when the count reaches zero. Returns false when the
    /// page is absent or was not pinned.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.latch.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];

        if is_dirty {
            frame.set_dirty(true);
        }
        match frame.unpin() {
            None => false,
            Some(0) => {
                self.replacer.set_evictable(frame_id, true);
                true
            }
            Some(_) => true,
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed set of in-memory frames.
///
/// Pages are pinned while in use; unpinned pages become candidates for
/// eviction under the LRU-K policy. A single coarse latch serializes all pool
/// operations - correctness over throughput, by construction.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Shared with outstanding page guards
    state: Arc<PoolState>,
}

impl BufferPoolManager {
    /// Creates a pool with `pool_size` frames, LRU-`k` replacement, and the
    /// given disk manager.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let frames = (0..pool_size)
            .map(|i| Arc::new(FrameHeader::new(FrameId::new(i as u32))))
            .collect();
        // Stack order: frame 0 is handed out first
        let free_list = (0..pool_size).rev().map(|i| FrameId::new(i as u32)).collect();

        let state = Arc::new(PoolState {
            frames,
            latch: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
                next_page_id: 0,
            }),
            replacer: LruKReplacer::new(k, pool_size),
            disk_scheduler: DiskScheduler::new(disk_manager),
        });

        Self { pool_size, state }
    }

    /// Allocates a fresh page id and binds it to a frame. The frame comes
    /// back pinned (`pin_count == 1`) and non-evictable; the caller owns the
    /// pin and must release it with [`unpin_page`](Self::unpin_page) or by
    /// obtaining the page through a guard.
    pub fn new_page(&self) -> Result<PageId> {
        Ok(self.new_page_internal()?.0)
    }

    fn new_page_internal(&self) -> Result<(PageId, FrameId)> {
        let mut inner = self.state.latch.lock();
        let frame_id = self.state.acquire_frame(&mut inner)?;

        let page_id = PageId::new(inner.next_page_id);
        inner.next_page_id += 1;

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.set_page_id(page_id);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);

        self.state.replacer.record_access(frame_id, AccessType::Unknown);
        self.state.replacer.set_evictable(frame_id, false);

        Ok((page_id, frame_id))
    }

    /// Pins a page, loading it from disk on a miss. Returns the frame it
    /// occupies. The public surface for page access is the guard
    /// constructors below.
    fn fetch_page(&self, page_id: PageId, access_type: AccessType) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(SiltError::InvalidPageId(page_id));
        }

        let mut inner = self.state.latch.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id, access_type);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(frame_id);
        }

        let frame_id = self.state.acquire_frame(&mut inner)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.state.disk_scheduler.schedule_read_sync(page_id, &mut data)?;

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);

        self.state.replacer.record_access(frame_id, access_type);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(frame_id)
    }

    /// Releases one pin on a page. `is_dirty` is ORed into the frame's dirty
    /// bit. Returns false when the page is absent or its pin count is
    /// already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin_page(page_id, is_dirty)
    }

    /// Writes a page's current contents to disk and clears its dirty bit,
    /// regardless of pin state. Returns `Ok(false)` when the id is invalid
    /// or the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let inner = self.state.latch.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        self.state.disk_scheduler.schedule_write_sync(page_id, &data)?;
        frame.set_dirty(false);

        Ok(true)
    }

    /// Flushes every frame currently bound to a valid page id.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _inner = self.state.latch.lock();

        for frame in &self.state.frames {
            let page_id = frame.page_id();
            if page_id == INVALID_PAGE_ID {
                continue;
            }
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.state.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);
        }

        Ok(())
    }

    /// Drops a page from the pool and tells the disk layer to deallocate it.
    /// Returns `Ok(true)` when the page is gone (including the
    /// absent/invalid cases) and `Ok(false)` when it is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(true);
        }

        let mut inner = self.state.latch.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            self.state.disk_scheduler.disk_manager().deallocate_page(page_id)?;
            return Ok(true);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Ok(false);
        }

        inner.page_table.remove(&page_id);
        inner.free_list.push(frame_id);
        self.state.replacer.remove(frame_id);
        frame.reset();
        self.state.disk_scheduler.disk_manager().deallocate_page(page_id)?;

        Ok(true)
    }

    /// Pins a page without taking its latch.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<BasicPageGuard> {
        let frame_id = self.fetch_page(page_id, AccessType::Unknown)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(BasicPageGuard::new(page_id, frame, self.release_callback()))
    }

    /// Pins a page and acquires its shared latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_page(page_id, AccessType::Unknown)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { ReadPageGuard::new(page_id, frame, self.release_callback()) })
    }

    /// Pins a page and acquires its exclusive latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_page(page_id, AccessType::Unknown)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { WritePageGuard::new(page_id, frame, self.release_callback()) })
    }

    /// Allocates a new page and returns it behind a basic guard; upgrade to
    /// a write guard before touching the bytes.
    pub fn new_page_guarded(&self) -> Result<BasicPageGuard> {
        let (page_id, frame_id) = self.new_page_internal()?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(BasicPageGuard::new(page_id, frame, self.release_callback()))
    }

    fn release_callback(&self) -> ReleaseCallback {
        let state = Arc::clone(&self.state);
        Box::new(move |page_id, is_dirty| {
            state.unpin_page(page_id, is_dirty);
        })
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.state.latch.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of unbound frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.latch.lock().free_list.len()
    }
}
