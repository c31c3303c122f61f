use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::FrameHeader;

/// Callback invoked exactly once when a guard releases its page.
/// Receives the page id and whether the guard dirtied the page.
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// Common guard state: the pinned frame and the pending release.
struct PageGuardBase {
    page_id: PageId,
    /// Keeps the frame alive for the guard's lifetime
    frame: Arc<FrameHeader>,
    /// Taken on release; a guard whose callback was moved out is a no-op
    release_callback: Option<ReleaseCallback>,
    /// Whether this guard handed out mutable access to the page bytes
    is_dirty: bool,
}

impl PageGuardBase {
    fn new(page_id: PageId, frame: Arc<FrameHeader>, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            frame,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    fn release(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.is_dirty);
        }
    }
}

/// Guard holding a pin on a page without any page latch.
///
/// Obtained from `BufferPoolManager::new_page_guarded` or `fetch_page_basic`;
/// upgrade to a read or write guard to access the page bytes. Upgrading moves
/// ownership of the pin, leaving this guard empty.
pub struct BasicPageGuard {
    base: PageGuardBase,
}

impl BasicPageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Acquires the page's shared latch, converting this guard into a read
    /// guard.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let frame = Arc::clone(&self.base.frame);
        let callback = self
            .base
            .release_callback
            .take()
            .expect("guard already released");
        unsafe { ReadPageGuard::new(self.base.page_id, frame, callback) }
    }

    /// Acquires the page's exclusive latch, converting this guard into a
    /// write guard.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let frame = Arc::clone(&self.base.frame);
        let callback = self
            .base
            .release_callback
            .take()
            .expect("guard already released");
        unsafe { WritePageGuard::new(self.base.page_id, frame, callback) }
    }

    /// Drops this guard, unpinning the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Drop for BasicPageGuard {
    fn drop(&mut self) {
        self.base.release();
    }
}

/// RAII guard for read-only access to a page. Holds the page's shared latch
/// and unpins the page when dropped.
pub struct ReadPageGuard {
    base: PageGuardBase,
    /// Shared latch on the page bytes; taken on drop before the unpin
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// Creates a new ReadPageGuard, acquiring the page's shared latch.
    /// # Safety
    /// The frame must stay alive for the guard's lifetime; the Arc stored in
    /// the base guarantees this, which is what makes the lifetime extension
    /// of the lock guard sound.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.read();
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Drops this guard, releasing the latch and unpinning the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the latch before the unpin callback runs
        self.data_guard.take();
        self.base.release();
    }
}

/// RAII guard for mutable access to a page. Holds the page's exclusive latch;
/// taking a mutable reference marks the page dirty. On drop the latch is
/// released before the page is unpinned.
pub struct WritePageGuard {
    base: PageGuardBase,
    /// Exclusive latch on the page bytes; taken on drop before the unpin
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// Creates a new WritePageGuard, acquiring the page's exclusive latch.
    /// # Safety
    /// Same argument as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            base: PageGuardBase::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Returns the page bytes mutably, marking the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }

    /// Drops this guard, releasing the latch and unpinning the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Release the latch before the unpin callback runs
        self.data_guard.take();
        self.base.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FrameId;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn tracking_callback() -> (ReleaseCallback, Arc<AtomicU32>, Arc<AtomicBool>) {
        let releases = Arc::new(AtomicU32::new(0));
        let dirty = Arc::new(AtomicBool::new(false));
        let releases_cb = Arc::clone(&releases);
        let dirty_cb = Arc::clone(&dirty);
        let callback: ReleaseCallback = Box::new(move |_, is_dirty| {
            releases_cb.fetch_add(1, Ordering::SeqCst);
            dirty_cb.store(is_dirty, Ordering::SeqCst);
        });
        (callback, releases, dirty)
    }

    #[test]
    fn test_read_guard_releases_once() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        frame.set_page_id(PageId::new(1));
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        frame.copy_from(&data);

        let (callback, releases, dirty) = tracking_callback();
        let guard = unsafe { ReadPageGuard::new(PageId::new(1), Arc::clone(&frame), callback) };

        assert_eq!(guard.page_id(), PageId::new(1));
        assert_eq!(guard.data()[0], 42);
        assert_eq!(releases.load(Ordering::SeqCst), 0);

        drop(guard);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!dirty.load(Ordering::SeqCst));
    }

    #[test]
    fn test_write_guard_reports_dirty() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        frame.set_page_id(PageId::new(1));

        let (callback, releases, dirty) = tracking_callback();
        let mut guard = unsafe { WritePageGuard::new(PageId::new(1), Arc::clone(&frame), callback) };

        guard.data_mut()[0] = 7;
        drop(guard);

        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(dirty.load(Ordering::SeqCst));

        let mut out = [0u8; PAGE_SIZE];
        frame.copy_to(&mut out);
        assert_eq!(out[0], 7);
    }

    #[test]
    fn test_write_guard_without_mutation_stays_clean() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let (callback, _, dirty) = tracking_callback();
        let guard = unsafe { WritePageGuard::new(PageId::new(1), frame, callback) };

        assert_eq!(guard.data()[0], 0);
        drop(guard);
        assert!(!dirty.load(Ordering::SeqCst));
    }

    #[test]
    fn test_upgrade_moves_release_ownership() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));
        let (callback, releases, dirty) = tracking_callback();

        let basic = BasicPageGuard::new(PageId::new(2), frame, callback);
        let mut write = basic.upgrade_write();
        // The emptied basic guard has dropped already without releasing
        assert_eq!(releases.load(Ordering::SeqCst), 0);

        write.data_mut()[10] = 1;
        drop(write);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(dirty.load(Ordering::SeqCst));
    }
}
