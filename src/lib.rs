//! Silt - the storage-engine core of an educational relational database
//!
//! The crate centers on a disk-backed buffer pool and the structures built
//! on top of it:
//!
//! - **Storage Layer** (`storage`): disk I/O and on-disk page layouts
//!   - `DiskManager`: page-granular reads and writes against the database file
//!   - `DiskScheduler`: background worker thread with promise-based completion
//!   - `HeaderPage`/`DirectoryPage`/`BucketPage`: extendible-hashing page
//!     formats
//!
//! - **Buffer Pool** (`buffer`): fixed-capacity page cache
//!   - `BufferPoolManager`: pins pages into frames, writes dirty victims back
//!   - `LruKReplacer`: LRU-K eviction policy
//!   - `FrameHeader`: per-frame metadata and the page bytes
//!   - `BasicPageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII pin + latch
//!     management
//!
//! - **Index** (`index`): `ExtendibleHashIndex`, a disk-resident hash table
//!   with directory growth/shrink and bucket split/merge
//!
//! - **Trie** (`trie`): an in-memory persistent trie with structural sharing
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use silt::buffer::BufferPoolManager;
//! use silt::index::{ExtendibleHashIndex, Fnv1aHasher, IntegerComparator};
//! use silt::storage::disk::DiskManager;
//! use silt::{RecordId, PageId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(100, 2, disk_manager));
//!
//! let index = ExtendibleHashIndex::new(
//!     Arc::clone(&bpm),
//!     Box::new(IntegerComparator),
//!     Box::new(Fnv1aHasher),
//!     1, // header depth
//!     4, // directory depth
//!     16, // bucket size
//! )
//! .unwrap();
//!
//! let value = RecordId::new(PageId::new(7), SlotId::new(0));
//! index.insert(42, value).unwrap();
//! assert_eq!(index.get(42).unwrap(), Some(value));
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;
pub mod trie;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SiltError, SlotId};
pub use trie::Trie;
