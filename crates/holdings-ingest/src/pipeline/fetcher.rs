//! Remote Fetcher
//!
//! Copies every regular file of a remote directory into the staging store
//! under a fixed prefix. Nothing is deleted remotely.

use futures::stream::{self, StreamExt};
use holdings_common::checksum::sha256_hex;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::run::LogContext;
use crate::error::{PipelineError, Result};
use crate::storage::{
    ObjectLocation, ObjectMetadata, ObjectStore, META_LOG_GROUP, META_LOG_STREAM, META_SHA256,
};
use crate::transport::{remote_path, RemoteEntry, RemoteTransport};

/// Default number of concurrent file copies
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Logical prefix of staged objects
pub const DEFAULT_STAGING_PREFIX: &str = "sftp/";

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub remote_directory: String,
    pub staging_bucket: String,
    pub staging_prefix: String,
    pub concurrency: usize,
    /// Stamped on each staged object as `log_group`/`log_stream`
    pub log_context: Option<LogContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub listed: usize,
    /// Staged keys, sorted
    pub staged: Vec<String>,
    /// Entries that are not regular files
    pub skipped: usize,
    /// `(file name, error)` for each copy that failed
    pub failed: Vec<(String, String)>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct RemoteFetcher {
    transport: Arc<dyn RemoteTransport>,
    store: Arc<dyn ObjectStore>,
    config: FetchConfig,
}

impl RemoteFetcher {
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        store: Arc<dyn ObjectStore>,
        config: FetchConfig,
    ) -> Self {
        Self {
            transport,
            store,
            config,
        }
    }

    pub fn staging_key(&self, file_name: &str) -> String {
        format!("{}{}", self.config.staging_prefix, file_name)
    }

    /// Run one fetch
    ///
    /// Fails only when the directory cannot be listed. Individual copy
    /// failures are logged and reported.
    #[instrument(skip(self), fields(directory = %self.config.remote_directory))]
    pub async fn fetch(&self) -> Result<FetchReport> {
        let entries = self
            .transport
            .list_directory(&self.config.remote_directory)
            .await
            .inspect_err(|e| error!("Failed to list remote directory: {}", e))?;

        let mut report = FetchReport {
            listed: entries.len(),
            ..Default::default()
        };

        let files: Vec<RemoteEntry> = entries
            .into_iter()
            .filter(|entry| {
                let keep = entry.is_regular_file();
                if !keep {
                    debug!("Skipping {:?} entry {}", entry.kind, entry.name);
                }
                keep
            })
            .collect();
        report.skipped = report.listed - files.len();

        if files.is_empty() {
            info!("No files to fetch");
            return Ok(report);
        }

        info!("Fetching {} files", files.len());

        let results: Vec<(String, Result<String>)> = stream::iter(files)
            .map(|entry| async move {
                let outcome = self.stage_file(&entry.name).await;
                (entry.name, outcome)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (name, outcome) in results {
            match outcome {
                Ok(key) => report.staged.push(key),
                Err(e) => {
                    warn!("Failed to stage {}: {}", name, e);
                    report.failed.push((name, e.to_string()));
                },
            }
        }
        report.staged.sort();
        report.failed.sort();

        info!(
            "Fetch finished: {} staged, {} failed, {} skipped",
            report.staged.len(),
            report.failed.len(),
            report.skipped
        );
        Ok(report)
    }

    async fn stage_file(&self, name: &str) -> Result<String> {
        let path = remote_path(&self.config.remote_directory, name);
        let data = self.transport.read_file(&path).await?;

        let key = self.staging_key(name);
        let location = ObjectLocation::new(&self.config.staging_bucket, &key);
        let size = data.len();
        let mut metadata = self.metadata();
        metadata.insert(META_SHA256.to_string(), sha256_hex(&data));
        self.store
            .put(&location, data, metadata)
            .await
            .map_err(|e| match e {
                PipelineError::Storage(message) => {
                    PipelineError::Storage(format!("upload of {} failed: {}", key, message))
                },
                other => other,
            })?;

        debug!("Staged {} ({} bytes)", location, size);
        Ok(key)
    }

    fn metadata(&self) -> ObjectMetadata {
        self.config
            .log_context
            .as_ref()
            .map(|ctx| {
                ObjectMetadata::from([
                    (META_LOG_GROUP.to_string(), ctx.log_group.clone()),
                    (META_LOG_STREAM.to_string(), ctx.log_stream.clone()),
                ])
            })
            .unwrap_or_default()
    }
}
