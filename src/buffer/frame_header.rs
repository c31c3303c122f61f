use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// A single buffer frame: metadata plus the page bytes it currently holds.
///
/// The data buffer sits behind its own read-write latch (the per-page latch);
/// pin count and dirty bit are atomics mutated under the pool latch.
pub struct FrameHeader {
    /// The frame ID (index in the buffer pool)
    frame_id: FrameId,
    /// The page ID bound to this frame (INVALID_PAGE_ID if none)
    page_id: RwLock<PageId>,
    /// Number of callers currently pinning this frame
    pin_count: AtomicU32,
    /// Whether the page has been modified since it was read from disk
    is_dirty: AtomicBool,
    /// The page bytes (pub(crate) for page guard latch acquisition)
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: RwLock::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        *self.page_id.read()
    }

    pub fn set_page_id(&self, page_id: PageId) {
        *self.page_id.write() = page_id;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub fn unpin(&self) -> Option<u32> {
        loop {
            let current = self.pin_count.load(Ordering::Acquire);
            if current == 0 {
                return None;
            }
            if self
                .pin_count
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(current - 1);
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Copies data from the given slice into the frame.
    pub fn copy_from(&self, data: &[u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        self.data.write().copy_from_slice(data);
    }

    /// Copies the frame's bytes into the given slice.
    pub fn copy_to(&self, data: &mut [u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        data.copy_from_slice(&**self.data.read());
    }

    /// Resets the frame to its unbound state: no page id, no pins, clean,
    /// zeroed bytes.
    pub fn reset(&self) {
        *self.page_id.write() = INVALID_PAGE_ID;
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}
