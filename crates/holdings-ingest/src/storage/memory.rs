use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ObjectLocation, ObjectMetadata, ObjectStore, StoredObject};
use crate::error::{PipelineError, Result};

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<ObjectLocation, StoredObject>,
    denied_writes: HashSet<ObjectLocation>,
    write_count: usize,
}

/// In-process object store for tests and dry runs
///
/// Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every put or copy targeting `location` fail
    pub async fn deny_writes_to(&self, location: ObjectLocation) {
        self.inner.lock().await.denied_writes.insert(location);
    }

    pub async fn object(&self, location: &ObjectLocation) -> Option<StoredObject> {
        self.inner.lock().await.objects.get(location).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of successful writes (puts and copies) so far
    pub async fn write_count(&self) -> usize {
        self.inner.lock().await.write_count
    }

    fn check_writable(inner: &Inner, location: &ObjectLocation) -> Result<()> {
        if inner.denied_writes.contains(location) {
            return Err(PipelineError::Storage(format!(
                "Access denied writing {}",
                location.uri()
            )));
        }
        Ok(())
    }

    fn not_found(location: &ObjectLocation) -> PipelineError {
        PipelineError::Storage(format!("NoSuchKey: {}", location.uri()))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        location: &ObjectLocation,
        data: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::check_writable(&inner, location)?;
        debug!("memory put {} ({} bytes)", location, data.len());
        inner
            .objects
            .insert(location.clone(), StoredObject { data, metadata });
        inner.write_count += 1;
        Ok(())
    }

    async fn get(&self, location: &ObjectLocation) -> Result<StoredObject> {
        let inner = self.inner.lock().await;
        inner
            .objects
            .get(location)
            .cloned()
            .ok_or_else(|| Self::not_found(location))
    }

    async fn head(&self, location: &ObjectLocation) -> Result<ObjectMetadata> {
        self.get(location).await.map(|object| object.metadata)
    }

    async fn copy(&self, source: &ObjectLocation, destination: &ObjectLocation) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::check_writable(&inner, destination)?;
        let object = inner
            .objects
            .get(source)
            .cloned()
            .ok_or_else(|| Self::not_found(source))?;
        debug!("memory copy {} -> {}", source, destination);
        inner.objects.insert(destination.clone(), object);
        inner.write_count += 1;
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .objects
            .keys()
            .filter(|location| location.bucket == bucket && location.key.starts_with(prefix))
            .map(|location| location.key.clone())
            .collect())
    }

    async fn exists(&self, location: &ObjectLocation) -> Result<bool> {
        Ok(self.inner.lock().await.objects.contains_key(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let store = MemoryStore::new();
        let location = ObjectLocation::new("b", "k");
        store.put(&location, b"one".to_vec(), ObjectMetadata::new()).await.unwrap();
        store.put(&location, b"two".to_vec(), ObjectMetadata::new()).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&location).await.unwrap().data, b"two");
    }

    #[tokio::test]
    async fn test_copy_keeps_source_and_metadata() {
        let store = MemoryStore::new();
        let source = ObjectLocation::new("staging", "sftp/f");
        let destination = ObjectLocation::new("errors", "sftp/f");
        let metadata = ObjectMetadata::from([("log_group".to_string(), "g".to_string())]);
        store.put(&source, b"x".to_vec(), metadata.clone()).await.unwrap();

        store.copy(&source, &destination).await.unwrap();

        assert!(store.exists(&source).await.unwrap());
        assert_eq!(store.head(&destination).await.unwrap(), metadata);
    }

    #[tokio::test]
    async fn test_denied_writes_fail() {
        let store = MemoryStore::new();
        let location = ObjectLocation::new("b", "k");
        store.deny_writes_to(location.clone()).await;

        let err = store.put(&location, vec![], ObjectMetadata::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_filters_bucket_and_prefix() {
        let store = MemoryStore::new();
        for (bucket, key) in [("s", "sftp/a"), ("s", "sftp/b"), ("s", "other/c"), ("t", "sftp/d")] {
            store
                .put(&ObjectLocation::new(bucket, key), vec![], ObjectMetadata::new())
                .await
                .unwrap();
        }
        assert_eq!(store.list("s", "sftp/").await.unwrap(), vec!["sftp/a", "sftp/b"]);
    }
}
