//! Key-addressed object storage
//!
//! Every store the pipeline touches (staging, user, archive, error) is a
//! bucket behind the [`ObjectStore`] trait. Writes are idempotent by key:
//! repeating a put or copy overwrites the same destination.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

pub mod config;
pub mod memory;
pub mod s3;

pub use memory::MemoryStore;
pub use s3::S3Store;

/// User metadata attached to an object
pub type ObjectMetadata = HashMap<String, String>;

/// Metadata key carrying the run's log group
pub const META_LOG_GROUP: &str = "log_group";

/// Metadata key carrying the run's log stream
pub const META_LOG_STREAM: &str = "log_stream";

/// Metadata key carrying the hex SHA-256 of the staged bytes
pub const META_SHA256: &str = "sha256";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `<bucket>/<key>`; the key may itself contain slashes
    pub fn parse(path: &str) -> Option<Self> {
        let (bucket, key) = path.split_once('/')?;
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(bucket, key))
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub metadata: ObjectMetadata,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` at `location`, replacing any existing object
    async fn put(
        &self,
        location: &ObjectLocation,
        data: Vec<u8>,
        metadata: ObjectMetadata,
    ) -> Result<()>;

    async fn get(&self, location: &ObjectLocation) -> Result<StoredObject>;

    /// User metadata without the body
    async fn head(&self, location: &ObjectLocation) -> Result<ObjectMetadata>;

    /// Server-side copy, body and metadata verbatim
    async fn copy(&self, source: &ObjectLocation, destination: &ObjectLocation) -> Result<()>;

    /// Keys in `bucket` starting with `prefix`, sorted
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    async fn exists(&self, location: &ObjectLocation) -> Result<bool>;
}
