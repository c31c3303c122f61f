//! Integration tests for the persistent trie

use std::sync::Arc;
use std::thread;

use silt::trie::Trie;

#[test]
fn test_versions_are_independent() {
    let t0 = Trie::new();
    let t1 = t0.put(b"ab", 1u32);
    let t2 = t1.put(b"ac", 2u32);
    let t3 = t2.remove(b"ab");

    assert_eq!(t0.get::<u32>(b"ab"), None);
    assert_eq!(t1.get::<u32>(b"ab"), Some(&1));
    assert_eq!(t1.get::<u32>(b"ac"), None);
    assert_eq!(t2.get::<u32>(b"ab"), Some(&1));
    assert_eq!(t2.get::<u32>(b"ac"), Some(&2));
    assert_eq!(t3.get::<u32>(b"ab"), None);
    assert_eq!(t3.get::<u32>(b"ac"), Some(&2));
}

#[test]
fn test_prefix_keys_coexist() {
    let trie = Trie::new()
        .put(b"a", 1u32)
        .put(b"ab", 2u32)
        .put(b"abc", 3u32);

    assert_eq!(trie.get::<u32>(b"a"), Some(&1));
    assert_eq!(trie.get::<u32>(b"ab"), Some(&2));
    assert_eq!(trie.get::<u32>(b"abc"), Some(&3));

    // Removing the middle key keeps both neighbors
    let trie = trie.remove(b"ab");
    assert_eq!(trie.get::<u32>(b"a"), Some(&1));
    assert_eq!(trie.get::<u32>(b"ab"), None);
    assert_eq!(trie.get::<u32>(b"abc"), Some(&3));
}

#[test]
fn test_type_mismatch_is_a_miss() {
    let trie = Trie::new().put(b"n", 5u64).put(b"s", String::from("five"));

    assert_eq!(trie.get::<u64>(b"n"), Some(&5));
    assert_eq!(trie.get::<u32>(b"n"), None);
    assert_eq!(trie.get::<String>(b"s"), Some(&String::from("five")));
    assert_eq!(trie.get::<u64>(b"s"), None);
}

#[test]
fn test_empty_key_round_trip() {
    let trie = Trie::new().put(b"k", 1u32).put(b"", 2u32);
    assert_eq!(trie.get::<u32>(b""), Some(&2));
    assert_eq!(trie.get::<u32>(b"k"), Some(&1));

    let trie = trie.remove(b"");
    assert_eq!(trie.get::<u32>(b""), None);
    assert_eq!(trie.get::<u32>(b"k"), Some(&1));
}

#[test]
fn test_remove_to_empty_and_rebuild() {
    let mut trie = Trie::new();
    for (i, key) in [b"one".as_slice(), b"two", b"three"].iter().enumerate() {
        trie = trie.put(key, i as u32);
    }
    for key in [b"one".as_slice(), b"two", b"three"] {
        trie = trie.remove(key);
    }
    assert!(trie.is_empty());

    let trie = trie.put(b"again", 9u32);
    assert_eq!(trie.get::<u32>(b"again"), Some(&9));
}

#[test]
fn test_concurrent_readers_of_shared_versions() {
    let mut versions = Vec::new();
    let mut trie = Trie::new();
    for i in 0..16u32 {
        trie = trie.put(format!("key{i}").as_bytes(), i);
        versions.push(trie.clone());
    }
    let versions = Arc::new(versions);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let versions = Arc::clone(&versions);
            thread::spawn(move || {
                for (v, trie) in versions.iter().enumerate() {
                    // Version v contains exactly keys 0..=v
                    for i in 0..16u32 {
                        let expected = (i as usize <= v).then_some(i);
                        assert_eq!(
                            trie.get::<u32>(format!("key{i}").as_bytes()).copied(),
                            expected
                        );
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
