use std::sync::Arc;

use silt::buffer::BufferPoolManager;
use silt::index::{ExtendibleHashIndex, Fnv1aHasher, IntegerComparator};
use silt::storage::disk::DiskManager;
use silt::trie::Trie;
use silt::{PageId, RecordId, SlotId};

fn main() {
    println!("Silt - storage engine core demo");
    println!("===============================\n");

    let db_path = "demo.db";
    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to create disk manager"));
    println!("Opened database file: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(10, 2, disk_manager));
    println!("Created buffer pool with 10 frames, LRU-2 replacement\n");

    // Raw page round trip through the buffer pool
    let page_id = bpm.new_page().expect("failed to allocate page");
    bpm.unpin_page(page_id, false);
    {
        let mut guard = bpm.fetch_page_write(page_id).expect("fetch for write");
        guard.data_mut()[..5].copy_from_slice(b"hello");
    }
    bpm.flush_page(page_id).expect("flush");
    {
        let guard = bpm.fetch_page_read(page_id).expect("fetch for read");
        println!(
            "Page {} round trip: {:?}\n",
            page_id,
            std::str::from_utf8(&guard.data()[..5]).unwrap()
        );
    }

    // A small hash index workload
    let index = ExtendibleHashIndex::new(
        Arc::clone(&bpm),
        Box::new(IntegerComparator),
        Box::new(Fnv1aHasher),
        1,
        4,
        8,
    )
    .expect("failed to create index");

    for key in 0..32u32 {
        let value = RecordId::new(PageId::new(100 + key), SlotId::new(0));
        index.insert(key, value).expect("insert");
    }
    println!("Inserted 32 keys into the hash index");

    let hit = index.get(17).expect("get");
    println!("get(17) -> {:?}", hit);

    index.remove(17).expect("remove");
    println!("get(17) after remove -> {:?}\n", index.get(17).expect("get"));

    bpm.flush_all_pages().expect("flush all");

    // Persistent trie versions
    let t1 = Trie::new().put(b"ab", 1u32);
    let t2 = t1.put(b"ac", 2u32);
    let t3 = t2.remove(b"ab");
    println!(
        "trie versions: t1[ab]={:?} t3[ab]={:?} t3[ac]={:?}",
        t1.get::<u32>(b"ab"),
        t3.get::<u32>(b"ab"),
        t3.get::<u32>(b"ac")
    );
}
