use std::sync::Arc;

use log::debug;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{PageId, RecordId, Result, INVALID_PAGE_ID};
use crate::storage::page::{
    BucketPage, BucketPageRef, DirectoryPage, DirectoryPageRef, HeaderPage, HeaderPageRef,
    BUCKET_ARRAY_CAPACITY, DIRECTORY_MAX_DEPTH, HEADER_MAX_DEPTH,
};

use super::{KeyComparator, KeyHasher};

/// Disk-backed extendible hash index mapping fixed-width keys to record ids.
///
/// A lookup hashes the key, picks a directory by the hash's top bits
/// (header page), a bucket by its low bits (directory page), and scans the
/// bucket. Inserts split overfull buckets, doubling the directory when the
/// splitting bucket already uses every directory bit; removals merge empty
/// buckets with their split images and shrink the directory when no bucket
/// needs its full width.
pub struct ExtendibleHashIndex {
    bpm: Arc<BufferPoolManager>,
    cmp: Box<dyn KeyComparator>,
    hasher: Box<dyn KeyHasher>,
    header_page_id: PageId,
    directory_max_depth: u32,
    bucket_max_size: u32,
}

impl ExtendibleHashIndex {
    /// Creates a new index, allocating and initializing its header page.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        cmp: Box<dyn KeyComparator>,
        hasher: Box<dyn KeyHasher>,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        assert!(header_max_depth <= HEADER_MAX_DEPTH);
        assert!(directory_max_depth <= DIRECTORY_MAX_DEPTH);
        assert!(bucket_max_size as usize <= BUCKET_ARRAY_CAPACITY);

        let header_page_id = {
            let mut header_guard = bpm.new_page_guarded()?.upgrade_write();
            HeaderPage::new(header_guard.data_mut()).init(header_max_depth);
            header_guard.page_id()
        };

        Ok(Self {
            bpm,
            cmp,
            hasher,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
        })
    }

    /// Re-attaches to an index whose header page already exists.
    pub fn open(
        header_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        cmp: Box<dyn KeyComparator>,
        hasher: Box<dyn KeyHasher>,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Self {
        Self {
            bpm,
            cmp,
            hasher,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
        }
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Looks up a key. Each level's guard is dropped before the next fetch.
    pub fn get(&self, key: u32) -> Result<Option<RecordId>> {
        let key_bytes = key.to_le_bytes();
        let hash = self.hasher.hash_key(&key_bytes);

        let directory_page_id = {
            let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
            let header = HeaderPageRef::new(header_guard.data());
            header.directory_page_id(header.hash_to_directory_index(hash))
        };
        if directory_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let bucket_page_id = {
            let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
            let directory = DirectoryPageRef::new(directory_guard.data());
            directory.bucket_page_id(directory.hash_to_bucket_index(hash))
        };
        if bucket_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
        Ok(BucketPageRef::new(bucket_guard.data()).lookup(&key_bytes, self.cmp.as_ref()))
    }

    /// Inserts a key/value pair. Returns false when the key is already
    /// present, or when the bucket is full and the directory cannot grow
    /// any further.
    pub fn insert(&self, key: u32, value: RecordId) -> Result<bool> {
        if self.get(key)?.is_some() {
            return Ok(false);
        }

        let key_bytes = key.to_le_bytes();
        let hash = self.hasher.hash_key(&key_bytes);

        // Each failed round splits a bucket, raising a local depth bounded
        // by directory_max_depth, so this terminates.
        loop {
            if let Some(inserted) = self.try_insert(hash, &key_bytes, value)? {
                return Ok(inserted);
            }
        }
    }

    /// One insertion attempt. `Ok(None)` means a bucket was split and the
    /// caller should retry.
    fn try_insert(&self, hash: u32, key: &[u8], value: RecordId) -> Result<Option<bool>> {
        let mut header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let (directory_idx, directory_page_id) = {
            let header = HeaderPageRef::new(header_guard.data());
            let idx = header.hash_to_directory_index(hash);
            (idx, header.directory_page_id(idx))
        };

        if directory_page_id == INVALID_PAGE_ID {
            return self
                .insert_to_new_directory(&mut header_guard, directory_idx, hash, key, value)
                .map(Some);
        }
        drop(header_guard);

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        let (bucket_idx, bucket_page_id) = {
            let directory = DirectoryPageRef::new(directory_guard.data());
            let idx = directory.hash_to_bucket_index(hash);
            (idx, directory.bucket_page_id(idx))
        };

        if bucket_page_id == INVALID_PAGE_ID {
            return self
                .insert_to_new_bucket(&mut directory_guard, bucket_idx, key, value)
                .map(Some);
        }

        let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
        {
            let mut bucket = BucketPage::new(bucket_guard.data_mut());
            if bucket.insert(key, value, self.cmp.as_ref()) {
                return Ok(Some(true));
            }
        }

        // Bucket full. Refuse when it already uses every directory bit and
        // the directory is maxed out; otherwise split and retry.
        {
            let directory = DirectoryPageRef::new(directory_guard.data());
            if directory.local_depth(bucket_idx) == directory.global_depth()
                && directory.global_depth() >= directory.max_depth()
            {
                return Ok(Some(false));
            }
        }

        self.split_bucket(&mut directory_guard, &mut bucket_guard, hash, bucket_page_id)?;
        Ok(None)
    }

    /// Allocates and initializes a directory for an empty header slot, then
    /// delegates to a fresh bucket.
    fn insert_to_new_directory(
        &self,
        header_guard: &mut WritePageGuard,
        directory_idx: u32,
        hash: u32,
        key: &[u8],
        value: RecordId,
    ) -> Result<bool> {
        let mut directory_guard = self.bpm.new_page_guarded()?.upgrade_write();
        let directory_page_id = directory_guard.page_id();

        let bucket_idx = {
            let mut directory = DirectoryPage::new(directory_guard.data_mut());
            directory.init(self.directory_max_depth);
            directory.hash_to_bucket_index(hash)
        };
        HeaderPage::new(header_guard.data_mut())
            .set_directory_page_id(directory_idx, directory_page_id);

        debug!("created directory {directory_page_id} for header slot {directory_idx}");
        self.insert_to_new_bucket(&mut directory_guard, bucket_idx, key, value)
    }

    /// Allocates a bucket for an empty directory slot and inserts into it.
    fn insert_to_new_bucket(
        &self,
        directory_guard: &mut WritePageGuard,
        bucket_idx: u32,
        key: &[u8],
        value: RecordId,
    ) -> Result<bool> {
        let mut bucket_guard = self.bpm.new_page_guarded()?.upgrade_write();
        let bucket_page_id = bucket_guard.page_id();

        let mut bucket = BucketPage::new(bucket_guard.data_mut());
        bucket.init(self.bucket_max_size);
        DirectoryPage::new(directory_guard.data_mut()).set_bucket_page_id(bucket_idx, bucket_page_id);

        debug!("created bucket {bucket_page_id} at slot {bucket_idx}");
        Ok(bucket.insert(key, value, self.cmp.as_ref()))
    }

    /// Splits a full bucket: grows the directory when the bucket uses every
    /// active bit, raises the local depth on every slot referencing it,
    /// points the image slots at a fresh bucket, and rehashes the entries
    /// across the pair.
    fn split_bucket(
        &self,
        directory_guard: &mut WritePageGuard,
        bucket_guard: &mut WritePageGuard,
        hash: u32,
        old_page_id: PageId,
    ) -> Result<()> {
        let mut image_guard = self.bpm.new_page_guarded()?.upgrade_write();
        let image_page_id = image_guard.page_id();
        BucketPage::new(image_guard.data_mut()).init(self.bucket_max_size);

        let mut directory = DirectoryPage::new(directory_guard.data_mut());
        if directory.local_depth(directory.hash_to_bucket_index(hash)) == directory.global_depth() {
            directory.incr_global_depth();
        }

        let bucket_idx = directory.hash_to_bucket_index(hash);
        let new_local_depth = directory.local_depth(bucket_idx) + 1;
        let image_bit = 1u32 << (new_local_depth - 1);

        debug!(
            "splitting bucket {old_page_id} (slot {bucket_idx}) to depth {new_local_depth}, \
             image {image_page_id}"
        );

        // Every slot that referenced the old bucket moves to the new depth;
        // the half on the image side of the new bit gets the new page.
        for i in 0..directory.size() {
            if directory.bucket_page_id(i) == old_page_id {
                directory.set_local_depth(i, new_local_depth as u8);
                if (i & image_bit) != (bucket_idx & image_bit) {
                    directory.set_bucket_page_id(i, image_page_id);
                }
            }
        }

        // Redistribute the old entries under the updated directory
        let mut old_bucket = BucketPage::new(bucket_guard.data_mut());
        let mut image_bucket = BucketPage::new(image_guard.data_mut());

        let entries: Vec<(Vec<u8>, RecordId)> = (0..old_bucket.size())
            .map(|i| {
                let (k, v) = old_bucket.entry_at(i);
                (k.to_vec(), v)
            })
            .collect();
        old_bucket.clear();

        for (entry_key, entry_value) in entries {
            let target_idx = directory.hash_to_bucket_index(self.hasher.hash_key(&entry_key));
            let target_page_id = directory.bucket_page_id(target_idx);
            debug_assert!(
                target_page_id == old_page_id || target_page_id == image_page_id,
                "rehashed entry escaped the split pair"
            );
            let target = if target_page_id == old_page_id {
                &mut old_bucket
            } else {
                &mut image_bucket
            };
            target.insert(&entry_key, entry_value, self.cmp.as_ref());
        }

        Ok(())
    }

    /// Removes a key. After a successful removal, empty buckets merge with
    /// their split images while depths allow, and the directory shrinks
    /// while every bucket fits in half the slots.
    pub fn remove(&self, key: u32) -> Result<bool> {
        let key_bytes = key.to_le_bytes();
        let hash = self.hasher.hash_key(&key_bytes);

        let directory_page_id = {
            let header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
            let header = HeaderPageRef::new(header_guard.data());
            header.directory_page_id(header.hash_to_directory_index(hash))
        };
        if directory_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        let (mut bucket_idx, bucket_page_id) = {
            let directory = DirectoryPageRef::new(directory_guard.data());
            let idx = directory.hash_to_bucket_index(hash);
            (idx, directory.bucket_page_id(idx))
        };
        if bucket_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let removed = {
            let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
            BucketPage::new(bucket_guard.data_mut()).remove(&key_bytes, self.cmp.as_ref())
        };
        if !removed {
            return Ok(false);
        }

        let mut current_page_id = bucket_page_id;
        loop {
            let (local_depth, merge_local_depth, merge_page_id) = {
                let directory = DirectoryPageRef::new(directory_guard.data());
                let ld = directory.local_depth(bucket_idx);
                if ld == 0 {
                    break;
                }
                let merge_idx = bucket_idx ^ (1 << (ld - 1));
                (
                    ld,
                    directory.local_depth(merge_idx),
                    directory.bucket_page_id(merge_idx),
                )
            };
            if merge_local_depth != local_depth {
                break;
            }

            let current_empty = {
                let guard = self.bpm.fetch_page_read(current_page_id)?;
                BucketPageRef::new(guard.data()).is_empty()
            };
            let merge_empty = {
                let guard = self.bpm.fetch_page_read(merge_page_id)?;
                BucketPageRef::new(guard.data()).is_empty()
            };
            if !current_empty && !merge_empty {
                break;
            }

            // Keep the non-empty side; when both are empty, drop the current
            let (dead_page_id, survivor_page_id) = if current_empty {
                (current_page_id, merge_page_id)
            } else {
                (merge_page_id, current_page_id)
            };

            let new_local_depth = local_depth - 1;
            {
                let mut directory = DirectoryPage::new(directory_guard.data_mut());
                for i in 0..directory.size() {
                    let page_id = directory.bucket_page_id(i);
                    if page_id == dead_page_id || page_id == survivor_page_id {
                        directory.set_bucket_page_id(i, survivor_page_id);
                        directory.set_local_depth(i, new_local_depth as u8);
                    }
                }
            }

            debug!("merged bucket {dead_page_id} into {survivor_page_id} at depth {new_local_depth}");
            self.bpm.delete_page(dead_page_id)?;

            current_page_id = survivor_page_id;
            bucket_idx &= (1 << new_local_depth) - 1;
        }

        {
            let mut directory = DirectoryPage::new(directory_guard.data_mut());
            while directory.can_shrink() {
                directory.decr_global_depth();
            }
        }

        Ok(true)
    }

    /// Walks every reachable directory and asserts its structural
    /// invariants. Meant for tests.
    pub fn verify_integrity(&self) -> Result<()> {
        let directory_ids: Vec<PageId> = {
            let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
            let header = HeaderPageRef::new(header_guard.data());
            (0..header.max_size())
                .map(|i| header.directory_page_id(i))
                .filter(|&id| id != INVALID_PAGE_ID)
                .collect()
        };

        for directory_page_id in directory_ids {
            let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
            DirectoryPageRef::new(directory_guard.data()).verify_integrity();
        }
        Ok(())
    }
}
