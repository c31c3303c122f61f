use crate::common::{PageId, RecordId, SlotId, PAGE_SIZE};
use crate::index::KeyComparator;

const SIZE_OFFSET: usize = 0;
const MAX_SIZE_OFFSET: usize = 4;
const ENTRIES_OFFSET: usize = 8;

const KEY_SIZE: usize = 4;
const VALUE_SIZE: usize = 6; // RecordId: PageId(4) + SlotId(2)
const ENTRY_SIZE: usize = KEY_SIZE + VALUE_SIZE;

/// Hard capacity of a bucket page, from the page geometry
pub const BUCKET_ARRAY_CAPACITY: usize = (PAGE_SIZE - ENTRIES_OFFSET) / ENTRY_SIZE;

/// Mutable view of a hash-table bucket page.
///
/// Layout: `size` (u32), `max_size` (u32), then `size` packed entries of a
/// 4-byte key followed by a 6-byte record id, in insertion order. Keys are
/// unique under the caller's comparator; removal swaps the last entry into
/// the vacated slot.
pub struct BucketPage<'a> {
    data: &'a mut [u8],
}

impl<'a> BucketPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, max_size: u32) {
        assert!(
            max_size as usize <= BUCKET_ARRAY_CAPACITY,
            "bucket max_size {max_size} exceeds page capacity {BUCKET_ARRAY_CAPACITY}"
        );
        self.data.fill(0);
        self.data[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4].copy_from_slice(&max_size.to_le_bytes());
    }

    pub fn size(&self) -> u32 {
        read_u32(self.data, SIZE_OFFSET)
    }

    fn set_size(&mut self, size: u32) {
        self.data[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&size.to_le_bytes());
    }

    pub fn max_size(&self) -> u32 {
        read_u32(self.data, MAX_SIZE_OFFSET)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.max_size()
    }

    pub fn key_at(&self, idx: u32) -> &[u8] {
        key_at(self.data, idx)
    }

    pub fn value_at(&self, idx: u32) -> RecordId {
        value_at(self.data, idx)
    }

    pub fn entry_at(&self, idx: u32) -> (&[u8], RecordId) {
        (key_at(self.data, idx), value_at(self.data, idx))
    }

    pub fn lookup(&self, key: &[u8], cmp: &dyn KeyComparator) -> Option<RecordId> {
        lookup(self.data, key, cmp)
    }

    /// Inserts a key/value pair. Returns false when the key is already
    /// present or the bucket is full.
    pub fn insert(&mut self, key: &[u8], value: RecordId, cmp: &dyn KeyComparator) -> bool {
        assert_eq!(key.len(), KEY_SIZE);
        if self.is_full() || self.lookup(key, cmp).is_some() {
            return false;
        }

        let idx = self.size();
        let off = entry_offset(idx);
        self.data[off..off + KEY_SIZE].copy_from_slice(key);
        write_value(self.data, idx, encode_value(value));
        self.set_size(idx + 1);
        true
    }

    /// Removes a key, swapping the last entry into its slot.
    /// Returns false when the key is absent.
    pub fn remove(&mut self, key: &[u8], cmp: &dyn KeyComparator) -> bool {
        let size = self.size();
        for idx in 0..size {
            if cmp.compare(self.key_at(idx), key) == std::cmp::Ordering::Equal {
                let last = size - 1;
                if idx != last {
                    let last_off = entry_offset(last);
                    let mut entry = [0u8; ENTRY_SIZE];
                    entry.copy_from_slice(&self.data[last_off..last_off + ENTRY_SIZE]);
                    let off = entry_offset(idx);
                    self.data[off..off + ENTRY_SIZE].copy_from_slice(&entry);
                }
                self.set_size(last);
                return true;
            }
        }
        false
    }

    /// Drops every entry. The max size is preserved.
    pub fn clear(&mut self) {
        self.set_size(0);
    }
}

/// Read-only view of a hash-table bucket page.
pub struct BucketPageRef<'a> {
    data: &'a [u8],
}

impl<'a> BucketPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn size(&self) -> u32 {
        read_u32(self.data, SIZE_OFFSET)
    }

    pub fn max_size(&self) -> u32 {
        read_u32(self.data, MAX_SIZE_OFFSET)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn key_at(&self, idx: u32) -> &[u8] {
        key_at(self.data, idx)
    }

    pub fn value_at(&self, idx: u32) -> RecordId {
        value_at(self.data, idx)
    }

    pub fn entry_at(&self, idx: u32) -> (&[u8], RecordId) {
        (key_at(self.data, idx), value_at(self.data, idx))
    }

    pub fn lookup(&self, key: &[u8], cmp: &dyn KeyComparator) -> Option<RecordId> {
        lookup(self.data, key, cmp)
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
    u32::from_le_bytes(bytes)
}

fn entry_offset(idx: u32) -> usize {
    ENTRIES_OFFSET + idx as usize * ENTRY_SIZE
}

fn key_at(data: &[u8], idx: u32) -> &[u8] {
    let off = entry_offset(idx);
    &data[off..off + KEY_SIZE]
}

fn value_at(data: &[u8], idx: u32) -> RecordId {
    let off = entry_offset(idx) + KEY_SIZE;
    let page_id = read_u32(data, off);
    let slot: [u8; 2] = data[off + 4..off + 6].try_into().unwrap();
    RecordId::new(PageId::new(page_id), SlotId::new(u16::from_le_bytes(slot)))
}

fn encode_value(value: RecordId) -> [u8; VALUE_SIZE] {
    let mut bytes = [0u8; VALUE_SIZE];
    bytes[..4].copy_from_slice(&value.page_id.as_u32().to_le_bytes());
    bytes[4..].copy_from_slice(&value.slot_id.as_u16().to_le_bytes());
    bytes
}

fn write_value(data: &mut [u8], idx: u32, bytes: [u8; VALUE_SIZE]) {
    let off = entry_offset(idx) + KEY_SIZE;
    data[off..off + VALUE_SIZE].copy_from_slice(&bytes);
}

fn lookup(data: &[u8], key: &[u8], cmp: &dyn KeyComparator) -> Option<RecordId> {
    let size = read_u32(data, SIZE_OFFSET);
    // Linear scan: buckets are small by construction
    (0..size)
        .find(|&i| cmp.compare(key_at(data, i), key) == std::cmp::Ordering::Equal)
        .map(|i| value_at(data, i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IntegerComparator;

    fn rid(page: u32, slot: u16) -> RecordId {
        RecordId::new(PageId::new(page), SlotId::new(slot))
    }

    #[test]
    fn test_insert_lookup() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = BucketPage::new(&mut data);
        bucket.init(4);
        let cmp = IntegerComparator;

        assert!(bucket.insert(&1u32.to_le_bytes(), rid(10, 0), &cmp));
        assert!(bucket.insert(&2u32.to_le_bytes(), rid(10, 1), &cmp));
        assert_eq!(bucket.size(), 2);

        assert_eq!(bucket.lookup(&1u32.to_le_bytes(), &cmp), Some(rid(10, 0)));
        assert_eq!(bucket.lookup(&2u32.to_le_bytes(), &cmp), Some(rid(10, 1)));
        assert_eq!(bucket.lookup(&3u32.to_le_bytes(), &cmp), None);
    }

    #[test]
    fn test_insert_rejects_duplicates_and_overflow() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = BucketPage::new(&mut data);
        bucket.init(2);
        let cmp = IntegerComparator;

        assert!(bucket.insert(&1u32.to_le_bytes(), rid(1, 0), &cmp));
        assert!(!bucket.insert(&1u32.to_le_bytes(), rid(2, 0), &cmp));
        assert!(bucket.insert(&2u32.to_le_bytes(), rid(1, 1), &cmp));
        assert!(bucket.is_full());
        assert!(!bucket.insert(&3u32.to_le_bytes(), rid(1, 2), &cmp));

        // The duplicate insert did not clobber the original value
        assert_eq!(bucket.lookup(&1u32.to_le_bytes(), &cmp), Some(rid(1, 0)));
    }

    #[test]
    fn test_remove_swaps_with_last() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = BucketPage::new(&mut data);
        bucket.init(4);
        let cmp = IntegerComparator;

        for i in 0..4u32 {
            assert!(bucket.insert(&i.to_le_bytes(), rid(i, 0), &cmp));
        }

        assert!(bucket.remove(&1u32.to_le_bytes(), &cmp));
        assert_eq!(bucket.size(), 3);
        // Entry 3 moved into slot 1
        assert_eq!(bucket.key_at(1), &3u32.to_le_bytes());
        assert_eq!(bucket.value_at(1), rid(3, 0));

        assert!(!bucket.remove(&1u32.to_le_bytes(), &cmp));
        assert_eq!(bucket.lookup(&0u32.to_le_bytes(), &cmp), Some(rid(0, 0)));
        assert_eq!(bucket.lookup(&2u32.to_le_bytes(), &cmp), Some(rid(2, 0)));
    }

    #[test]
    fn test_clear_and_empty() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = BucketPage::new(&mut data);
        bucket.init(4);
        let cmp = IntegerComparator;

        assert!(bucket.is_empty());
        bucket.insert(&9u32.to_le_bytes(), rid(0, 0), &cmp);
        assert!(!bucket.is_empty());

        bucket.clear();
        assert!(bucket.is_empty());
        assert_eq!(bucket.max_size(), 4);
        assert_eq!(bucket.lookup(&9u32.to_le_bytes(), &cmp), None);
    }

    #[test]
    fn test_read_view_matches_mut_view() {
        let mut data = [0u8; PAGE_SIZE];
        {
            let mut bucket = BucketPage::new(&mut data);
            bucket.init(4);
            bucket.insert(&5u32.to_le_bytes(), rid(3, 7), &IntegerComparator);
        }
        let reader = BucketPageRef::new(&data);
        assert_eq!(reader.size(), 1);
        assert_eq!(reader.entry_at(0), (&5u32.to_le_bytes()[..], rid(3, 7)));
        assert_eq!(
            reader.lookup(&5u32.to_le_bytes(), &IntegerComparator),
            Some(rid(3, 7))
        );
    }
}
