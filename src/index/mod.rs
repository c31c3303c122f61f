pub mod hash_index;
pub mod key_comparator;
pub mod key_hasher;

pub use hash_index::ExtendibleHashIndex;
pub use key_comparator::{BytewiseComparator, IntegerComparator, KeyComparator};
pub use key_hasher::{Fnv1aHasher, IdentityHasher, KeyHasher};
