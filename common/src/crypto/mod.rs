mod hash;

pub use hash::{hash, sha256, Hash, Hashable, HASH_SIZE};
