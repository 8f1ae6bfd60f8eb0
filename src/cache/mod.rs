// Cache module.
// Request fingerprints, the in-memory response cache and durable key/value storage.

pub mod disk;
pub mod key;
pub mod paths;
pub mod store;

pub use disk::{FileStore, KeyValueStore, MemoryStore};
pub use key::{QueryParams, build_key};
pub use store::{CacheEntry, CacheLookup, ResponseCache};
