//! Versioned cache partitions.
//!
//! A deployment owns one static partition (the precached app shell) and one
//! dynamic partition (responses discovered at runtime). Partition names carry
//! the version, e.g. `static-v1`; bumping a name is how a deploy forces a
//! cache reset, because activation deletes every partition that is not
//! current.

mod keys;
mod lock;
mod store;

pub use keys::RequestKey;
pub use store::{CacheStorage, CachedResponse, MemoryCacheStorage, StorageError};

pub(crate) use lock::{mutex_lock, rw_read, rw_write};
