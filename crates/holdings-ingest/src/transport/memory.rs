use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{remote_path, EntryKind, RemoteEntry, RemoteTransport};
use crate::error::{PipelineError, Result};

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Vec<(RemoteEntry, Vec<u8>)>>,
    failing_reads: HashSet<String>,
    unreachable: bool,
}

/// Scripted remote server for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_file(&self, directory: &str, name: &str, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let entry = RemoteEntry::file(name, data.len() as u64);
        self.add_entry(directory, entry, data).await;
    }

    pub async fn add_entry(&self, directory: &str, entry: RemoteEntry, data: Vec<u8>) {
        self.inner
            .lock()
            .await
            .entries
            .entry(directory.trim_end_matches('/').to_string())
            .or_default()
            .push((entry, data));
    }

    pub async fn add_directory(&self, directory: &str, name: &str) {
        let entry = RemoteEntry {
            name: name.to_string(),
            kind: EntryKind::Directory,
            size: None,
        };
        self.add_entry(directory, entry, Vec::new()).await;
    }

    /// Reads of this full path fail
    pub async fn fail_reads_of(&self, path: &str) {
        self.inner.lock().await.failing_reads.insert(path.to_string());
    }

    /// Every operation fails as if the server refused the connection
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().await.unreachable = unreachable;
    }
}

#[async_trait]
impl RemoteTransport for MemoryTransport {
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let inner = self.inner.lock().await;
        if inner.unreachable {
            return Err(PipelineError::Transport("Connection refused".to_string()));
        }
        Ok(inner
            .entries
            .get(path.trim_end_matches('/'))
            .map(|entries| entries.iter().map(|(entry, _)| entry.clone()).collect())
            .unwrap_or_default())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let inner = self.inner.lock().await;
        if inner.unreachable {
            return Err(PipelineError::Transport("Connection refused".to_string()));
        }
        if inner.failing_reads.contains(path) {
            return Err(PipelineError::Transport(format!("Failed to read {}", path)));
        }
        inner
            .entries
            .iter()
            .flat_map(|(directory, entries)| {
                entries
                    .iter()
                    .map(move |(entry, data)| (remote_path(directory, &entry.name), data))
            })
            .find(|(full_path, _)| full_path == path)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| PipelineError::Transport(format!("No such file: {}", path)))
    }
}
