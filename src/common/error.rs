use thiserror::Error;

use super::types::PageId;

/// Storage engine error types
#[derive(Error, Debug)]
pub enum SiltError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),
}

pub type Result<T> = std::result::Result<T, SiltError>;
