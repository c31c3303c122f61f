/// Hash function over encoded key bytes, producing the 32-bit hash the
/// header and directory pages consume.
pub trait KeyHasher: Send + Sync {
    fn hash_key(&self, key: &[u8]) -> u32;
}

/// FNV-1a, the default hash for index keys.
pub struct Fnv1aHasher;

impl KeyHasher for Fnv1aHasher {
    fn hash_key(&self, key: &[u8]) -> u32 {
        let mut hash: u32 = 0x811c_9dc5;
        for &byte in key {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(0x0100_0193);
        }
        hash
    }
}

/// Reads the key's low 4 bytes as the hash. Gives tests full control over
/// bucket placement.
pub struct IdentityHasher;

impl KeyHasher for IdentityHasher {
    fn hash_key(&self, key: &[u8]) -> u32 {
        let mut bytes = [0u8; 4];
        let n = key.len().min(4);
        bytes[..n].copy_from_slice(&key[..n]);
        u32::from_le_bytes(bytes)
    }
}
