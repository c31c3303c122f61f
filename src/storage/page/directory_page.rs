use crate::common::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

const GLOBAL_DEPTH_OFFSET: usize = 0;
const MAX_DEPTH_OFFSET: usize = 4;
const LOCAL_DEPTHS_OFFSET: usize = 8;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;

/// Number of bucket slots in a directory page
pub const DIRECTORY_ARRAY_SIZE: usize = 512;
/// Upper bound on a directory page's depth (2^9 = 512 slots)
pub const DIRECTORY_MAX_DEPTH: u32 = 9;

/// Mutable view of an extendible-hashing directory page.
///
/// Layout: `global_depth` (u32), `max_depth` (u32),
/// `local_depths[DIRECTORY_ARRAY_SIZE]` (u8),
/// `bucket_page_ids[DIRECTORY_ARRAY_SIZE]` (4-byte page ids, all-ones when
/// unused). The active slot range is `0..1 << global_depth`.
pub struct DirectoryPage<'a> {
    data: &'a mut [u8],
}

impl<'a> DirectoryPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, max_depth: u32) {
        assert!(max_depth <= DIRECTORY_MAX_DEPTH);
        self.data.fill(0);
        self.data[MAX_DEPTH_OFFSET..MAX_DEPTH_OFFSET + 4]
            .copy_from_slice(&max_depth.to_le_bytes());
        for i in 0..DIRECTORY_ARRAY_SIZE as u32 {
            self.set_bucket_page_id(i, INVALID_PAGE_ID);
        }
    }

    pub fn global_depth(&self) -> u32 {
        read_u32(self.data, GLOBAL_DEPTH_OFFSET)
    }

    fn set_global_depth(&mut self, depth: u32) {
        self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
            .copy_from_slice(&depth.to_le_bytes());
    }

    pub fn max_depth(&self) -> u32 {
        read_u32(self.data, MAX_DEPTH_OFFSET)
    }

    /// Number of active slots.
    pub fn size(&self) -> u32 {
        1 << self.global_depth()
    }

    pub fn global_depth_mask(&self) -> u32 {
        (1 << self.global_depth()) - 1
    }

    pub fn local_depth_mask(&self, bucket_idx: u32) -> u32 {
        (1 << self.local_depth(bucket_idx)) - 1
    }

    /// Maps a hash to a slot using its low `global_depth` bits.
    pub fn hash_to_bucket_index(&self, hash: u32) -> u32 {
        hash & self.global_depth_mask()
    }

    pub fn bucket_page_id(&self, bucket_idx: u32) -> PageId {
        bucket_page_id(self.data, bucket_idx)
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: u32, page_id: PageId) {
        assert!((bucket_idx as usize) < DIRECTORY_ARRAY_SIZE);
        let off = BUCKET_PAGE_IDS_OFFSET + bucket_idx as usize * 4;
        self.data[off..off + 4].copy_from_slice(&page_id.as_u32().to_le_bytes());
    }

    pub fn local_depth(&self, bucket_idx: u32) -> u32 {
        local_depth(self.data, bucket_idx)
    }

    pub fn set_local_depth(&mut self, bucket_idx: u32, depth: u8) {
        assert!((bucket_idx as usize) < DIRECTORY_ARRAY_SIZE);
        self.data[LOCAL_DEPTHS_OFFSET + bucket_idx as usize] = depth;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: u32) {
        let depth = self.local_depth(bucket_idx);
        if depth < self.global_depth() {
            self.set_local_depth(bucket_idx, (depth + 1) as u8);
        }
    }

    pub fn decr_local_depth(&mut self, bucket_idx: u32) {
        let depth = self.local_depth(bucket_idx);
        if depth > 0 {
            self.set_local_depth(bucket_idx, (depth - 1) as u8);
        }
    }

    /// The slot differing from `bucket_idx` in the top-most active bit.
    pub fn get_split_image_index(&self, bucket_idx: u32) -> u32 {
        bucket_idx ^ (1 << (self.global_depth() - 1))
    }

    /// Doubles the directory: copies every active slot's mapping to its new
    /// upper-half twin, then bumps the depth. No-op at `max_depth`.
    pub fn incr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        if global_depth >= self.max_depth() {
            return;
        }
        let size = 1u32 << global_depth;
        for i in 0..size {
            let page_id = self.bucket_page_id(i);
            let depth = self.local_depth(i) as u8;
            self.set_bucket_page_id(size + i, page_id);
            self.set_local_depth(size + i, depth);
        }
        self.set_global_depth(global_depth + 1);
    }

    pub fn decr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        if global_depth > 0 {
            self.set_global_depth(global_depth - 1);
        }
    }

    /// True when every active slot's local depth is strictly below the
    /// global depth, so halving the directory loses nothing.
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.global_depth();
        if global_depth == 0 {
            return false;
        }
        (0..self.size()).all(|i| self.local_depth(i) < global_depth)
    }

    /// Asserts the directory's structural invariants; see
    /// [`DirectoryPageRef::verify_integrity`].
    pub fn verify_integrity(&self) {
        verify_integrity(self.data);
    }
}

/// Read-only view of an extendible-hashing directory page.
pub struct DirectoryPageRef<'a> {
    data: &'a [u8],
}

impl<'a> DirectoryPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn global_depth(&self) -> u32 {
        read_u32(self.data, GLOBAL_DEPTH_OFFSET)
    }

    pub fn max_depth(&self) -> u32 {
        read_u32(self.data, MAX_DEPTH_OFFSET)
    }

    pub fn size(&self) -> u32 {
        1 << self.global_depth()
    }

    pub fn hash_to_bucket_index(&self, hash: u32) -> u32 {
        hash & ((1 << self.global_depth()) - 1)
    }

    pub fn bucket_page_id(&self, bucket_idx: u32) -> PageId {
        bucket_page_id(self.data, bucket_idx)
    }

    pub fn local_depth(&self, bucket_idx: u32) -> u32 {
        local_depth(self.data, bucket_idx)
    }

    /// Asserts the directory's structural invariants: local depths bounded
    /// by the global depth, slots sharing a bucket page agreeing on local
    /// depth and congruent modulo 2^local_depth, and each bucket referenced
    /// by exactly 2^(global_depth - local_depth) slots.
    pub fn verify_integrity(&self) {
        verify_integrity(self.data);
    }
}

fn verify_integrity(data: &[u8]) {
    use std::collections::HashMap;

    let global_depth = read_u32(data, GLOBAL_DEPTH_OFFSET);
    let size = 1u32 << global_depth;
    let mut counts: HashMap<PageId, (u32, u32, u32)> = HashMap::new();

    for i in 0..size {
        let page_id = bucket_page_id(data, i);
        if page_id == INVALID_PAGE_ID {
            continue;
        }
        let depth = local_depth(data, i);
        assert!(
            depth <= global_depth,
            "slot {i}: local depth {depth} exceeds global depth {global_depth}"
        );

        let entry = counts.entry(page_id).or_insert((depth, i, 0));
        assert_eq!(
            entry.0, depth,
            "slots {} and {i} share {page_id} with differing local depths",
            entry.1
        );
        assert_eq!(
            entry.1 & ((1 << depth) - 1),
            i & ((1 << depth) - 1),
            "slots {} and {i} share {page_id} but are not congruent mod 2^{depth}",
            entry.1
        );
        entry.2 += 1;
    }

    for (page_id, (depth, _, count)) in counts {
        assert_eq!(
            count,
            1 << (global_depth - depth),
            "{page_id} at depth {depth} referenced by {count} slots"
        );
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    u32::from_le_bytes(bytes)
}

fn bucket_page_id(data: &[u8], bucket_idx: u32) -> PageId {
    assert!((bucket_idx as usize) < DIRECTORY_ARRAY_SIZE);
    PageId::new(read_u32(data, BUCKET_PAGE_IDS_OFFSET + bucket_idx as usize * 4))
}

fn local_depth(data: &[u8], bucket_idx: u32) -> u32 {
    assert!((bucket_idx as usize) < DIRECTORY_ARRAY_SIZE);
    data[LOCAL_DEPTHS_OFFSET + bucket_idx as usize] as u32
}
