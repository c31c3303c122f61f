use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// DiskManager reads and writes pages of a single database file, addressed
/// by page id. Reads past the end of the file come back zero-filled; writes
/// extend the file as needed and go through to disk.
pub struct DiskManager {
    /// The database file; the mutex also guards the file cursor
    file: Mutex<File>,
    db_path: PathBuf,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (or creates) the database file at the given path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        Ok(Self {
            file: Mutex::new(file),
            db_path,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads a page from disk into the provided buffer.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");

        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Advisory page deallocation. The file is not shrunk and the space is
    /// not reused; a freed page simply stops being referenced.
    pub fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        Ok(())
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Forces file contents to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}
