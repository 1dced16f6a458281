//! Cache partition storage.
//!
//! Partitions are named buckets of `RequestKey -> CachedResponse`. Every
//! operation addresses a partition by name and is atomic on its own, so
//! callers never hold a partition across awaits.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use thiserror::Error;

use super::keys::RequestKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Snapshot of an HTTP response held in a partition.
///
/// Entries are replaced wholesale; a snapshot is never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        let stored_headers = headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Self {
            status,
            headers: stored_headers,
            body,
        }
    }

    /// Materialize a fresh response; the snapshot itself stays reusable.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            headers.append(name.clone(), value.clone());
        }

        response
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cache partition `{partition}` is unavailable: {message}")]
    Backend { partition: String, message: String },
    #[error("cache storage is unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn backend(partition: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            partition: partition.into(),
            message: message.into(),
        }
    }
}

/// Persistent store of named cache partitions.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of every existing partition, in name order.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Create `partition` if it does not exist yet.
    async fn open(&self, partition: &str) -> Result<(), StorageError>;

    /// Remove `partition` and all its entries. Returns whether it existed.
    async fn delete(&self, partition: &str) -> Result<bool, StorageError>;

    /// Look `key` up across every partition; the first partition in name order wins.
    async fn match_request(
        &self,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError>;

    /// Look `key` up in a single partition.
    async fn match_in(
        &self,
        partition: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError>;

    /// Insert or replace one entry, creating the partition lazily.
    async fn put(
        &self,
        partition: &str,
        key: RequestKey,
        response: CachedResponse,
    ) -> Result<(), StorageError>;

    /// Insert a batch of entries as one atomic write.
    async fn put_all(
        &self,
        partition: &str,
        entries: Vec<(RequestKey, CachedResponse)>,
    ) -> Result<(), StorageError>;

    /// Number of entries in `partition`, zero when it does not exist.
    async fn len(&self, partition: &str) -> Result<usize, StorageError>;
}

type Partition = HashMap<RequestKey, CachedResponse>;

/// Process-local partition store.
#[derive(Default)]
pub struct MemoryCacheStorage {
    partitions: RwLock<BTreeMap<String, Partition>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(rw_read(&self.partitions, SOURCE, "keys")
            .keys()
            .cloned()
            .collect())
    }

    async fn open(&self, partition: &str) -> Result<(), StorageError> {
        rw_write(&self.partitions, SOURCE, "open")
            .entry(partition.to_string())
            .or_default();
        Ok(())
    }

    async fn delete(&self, partition: &str) -> Result<bool, StorageError> {
        Ok(rw_write(&self.partitions, SOURCE, "delete")
            .remove(partition)
            .is_some())
    }

    async fn match_request(
        &self,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError> {
        Ok(rw_read(&self.partitions, SOURCE, "match_request")
            .values()
            .find_map(|partition| partition.get(key).cloned()))
    }

    async fn match_in(
        &self,
        partition: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError> {
        Ok(rw_read(&self.partitions, SOURCE, "match_in")
            .get(partition)
            .and_then(|entries| entries.get(key).cloned()))
    }

    async fn put(
        &self,
        partition: &str,
        key: RequestKey,
        response: CachedResponse,
    ) -> Result<(), StorageError> {
        rw_write(&self.partitions, SOURCE, "put")
            .entry(partition.to_string())
            .or_default()
            .insert(key, response);
        Ok(())
    }

    async fn put_all(
        &self,
        partition: &str,
        entries: Vec<(RequestKey, CachedResponse)>,
    ) -> Result<(), StorageError> {
        let mut partitions = rw_write(&self.partitions, SOURCE, "put_all");
        partitions
            .entry(partition.to_string())
            .or_default()
            .extend(entries);
        Ok(())
    }

    async fn len(&self, partition: &str) -> Result<usize, StorageError> {
        Ok(rw_read(&self.partitions, SOURCE, "len")
            .get(partition)
            .map_or(0, HashMap::len))
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use axum::http::header::CONTENT_TYPE;
    use http_body_util::BodyExt;
    use url::Url;

    use super::*;

    fn key(path: &str) -> RequestKey {
        let url = Url::parse("http://shop.test/")
            .and_then(|base| base.join(path))
            .expect("valid url");
        RequestKey::get(&url)
    }

    fn snapshot(body: &'static str) -> CachedResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        CachedResponse::new(StatusCode::OK, &headers, Bytes::from_static(body.as_bytes()))
    }

    #[tokio::test]
    async fn put_creates_partition_lazily() {
        let storage = MemoryCacheStorage::new();
        assert!(storage.keys().await.expect("keys").is_empty());

        storage
            .put("dynamic-v1", key("/api/products"), snapshot("[]"))
            .await
            .expect("put");

        assert_eq!(storage.keys().await.expect("keys"), vec!["dynamic-v1"]);
        assert_eq!(storage.len("dynamic-v1").await.expect("len"), 1);
    }

    #[tokio::test]
    async fn put_replaces_existing_entry() {
        let storage = MemoryCacheStorage::new();
        storage
            .put("dynamic-v1", key("/api/products"), snapshot("old"))
            .await
            .expect("put");
        storage
            .put("dynamic-v1", key("/api/products"), snapshot("new"))
            .await
            .expect("put");

        let cached = storage
            .match_in("dynamic-v1", &key("/api/products"))
            .await
            .expect("match")
            .expect("entry");
        assert_eq!(cached.body, Bytes::from_static(b"new"));
        assert_eq!(storage.len("dynamic-v1").await.expect("len"), 1);
    }

    #[tokio::test]
    async fn match_request_searches_every_partition() {
        let storage = MemoryCacheStorage::new();
        storage
            .put("static-v1", key("/"), snapshot("shell"))
            .await
            .expect("put");
        storage
            .put("dynamic-v1", key("/api/categories"), snapshot("cats"))
            .await
            .expect("put");

        let shell = storage.match_request(&key("/")).await.expect("match");
        let cats = storage
            .match_request(&key("/api/categories"))
            .await
            .expect("match");
        let missing = storage.match_request(&key("/nope")).await.expect("match");

        assert_eq!(shell.map(|c| c.body), Some(Bytes::from_static(b"shell")));
        assert_eq!(cats.map(|c| c.body), Some(Bytes::from_static(b"cats")));
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_partition_existed() {
        let storage = MemoryCacheStorage::new();
        storage.open("static-v0").await.expect("open");

        assert!(storage.delete("static-v0").await.expect("delete"));
        assert!(!storage.delete("static-v0").await.expect("delete"));
        assert_eq!(storage.len("static-v0").await.expect("len"), 0);
    }

    #[tokio::test]
    async fn put_all_writes_batch() {
        let storage = MemoryCacheStorage::new();
        storage
            .put_all(
                "static-v1",
                vec![(key("/"), snapshot("a")), (key("/boutique"), snapshot("b"))],
            )
            .await
            .expect("put_all");

        assert_eq!(storage.len("static-v1").await.expect("len"), 2);
    }

    #[tokio::test]
    async fn snapshot_materializes_independent_responses() {
        let cached = snapshot("{\"id\":1}");

        let first = cached.to_response();
        let second = cached.to_response();

        assert_eq!(
            first.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
        for response in [first, second] {
            let bytes = response
                .into_body()
                .collect()
                .await
                .expect("body")
                .to_bytes();
            assert_eq!(bytes, Bytes::from_static(b"{\"id\":1}"));
        }
    }

    #[tokio::test]
    async fn storage_recovers_from_poisoned_lock() {
        let storage = MemoryCacheStorage::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = storage
                .partitions
                .write()
                .expect("partitions lock should be acquired");
            panic!("poison partitions lock");
        }));

        storage
            .put("dynamic-v1", key("/"), snapshot("ok"))
            .await
            .expect("put");
        assert_eq!(storage.len("dynamic-v1").await.expect("len"), 1);
    }
}
