use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver as RequestReceiver, Sender as RequestSender};
use log::error;

use crate::common::{PageId, Result, SiltError, PAGE_SIZE};

use super::DiskManager;

/// A page I/O request handed to the scheduler's worker thread.
pub struct DiskRequest {
    /// Write (true) or read (false)
    pub is_write: bool,
    /// The page to read or write
    pub page_id: PageId,
    /// Buffer of PAGE_SIZE bytes; the source of a write, the destination of
    /// a read
    pub data: *mut u8,
    /// Promise completed (with the success flag) once the request finishes
    pub promise: Option<Sender<bool>>,
}

// Safety: the worker thread is the only consumer of the request, and callers
// of schedule() keep the data buffer alive and unaliased until the promise
// completes.
unsafe impl Send for DiskRequest {}

impl DiskRequest {
    pub fn read(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: false,
            page_id,
            data,
            promise: None,
        }
    }

    pub fn write(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: true,
            page_id,
            data,
            promise: None,
        }
    }

    pub fn with_promise(mut self, promise: Sender<bool>) -> Self {
        self.promise = Some(promise);
        self
    }
}

/// DiskScheduler queues page I/O requests for a background worker thread.
/// Completion is signaled through the request's promise; the sync wrappers
/// below schedule and wait in one call.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: RequestSender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a scheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm = Arc::clone(&disk_manager);
        let shutdown_flag = Arc::clone(&shutdown);
        let worker_handle = thread::spawn(move || {
            Self::worker_loop(dm, receiver, shutdown_flag);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Creates a promise/future pair for a request.
    pub fn create_promise() -> (Sender<bool>, Receiver<bool>) {
        std::sync::mpsc::channel()
    }

    /// Queues a request for the worker thread.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| SiltError::DiskScheduler(format!("failed to schedule request: {e}")))
    }

    /// Schedules a read and blocks until it completes.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (promise, future) = Self::create_promise();
        self.schedule(DiskRequest::read(page_id, data.as_mut_ptr()).with_promise(promise))?;
        Self::wait(page_id, &future)
    }

    /// Schedules a write and blocks until it completes.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (promise, future) = Self::create_promise();
        // The worker only reads through the pointer for a write request
        let request = DiskRequest::write(page_id, data.as_ptr() as *mut u8).with_promise(promise);
        self.schedule(request)?;
        Self::wait(page_id, &future)
    }

    fn wait(page_id: PageId, future: &Receiver<bool>) -> Result<()> {
        let success = future
            .recv()
            .map_err(|e| SiltError::DiskScheduler(format!("failed to receive completion: {e}")))?;
        if success {
            Ok(())
        } else {
            Err(SiltError::DiskScheduler(format!("I/O failed for {page_id}")))
        }
    }

    /// Worker thread: processes requests until shutdown, then drains the
    /// queue before exiting.
    fn worker_loop(
        disk_manager: Arc<DiskManager>,
        receiver: RequestReceiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(request) => Self::process_request(&disk_manager, request),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        let result = if request.is_write {
            // Safety: caller keeps the buffer valid until the promise fires
            let data = unsafe { std::slice::from_raw_parts(request.data, PAGE_SIZE) };
            disk_manager.write_page(request.page_id, data)
        } else {
            // Safety: as above
            let data = unsafe { std::slice::from_raw_parts_mut(request.data, PAGE_SIZE) };
            disk_manager.read_page(request.page_id, data)
        };

        if let Err(e) = &result {
            error!(
                "disk {} for {} failed: {e}",
                if request.is_write { "write" } else { "read" },
                request.page_id
            );
        }

        if let Some(promise) = request.promise {
            let _ = promise.send(result.is_ok());
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
