//! Remote file server access
//!
//! The fetcher only needs two operations: list a directory and read a
//! file. SFTP is the production protocol; plain FTP is kept for servers
//! that only expose that. Both client libraries are blocking, so every
//! call runs on the blocking pool and is retried with linear backoff.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

pub mod ftp;
pub mod memory;
pub mod sftp;

pub use ftp::FtpTransport;
pub use memory::MemoryTransport;
pub use sftp::SftpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size: Some(size),
        }
    }

    pub fn is_regular_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Entries directly inside `path`; `.` and `..` are never returned
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
}

/// Join a remote directory and an entry name
pub fn remote_path(directory: &str, name: &str) -> String {
    let directory = directory.trim_end_matches('/');
    if directory.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", directory, name)
    }
}

/// Login material for the remote server
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RemoteCredentials {
    #[serde(rename = "ftp_url")]
    pub host: String,
    #[serde(rename = "user_id")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// PEM private key; key auth is used whenever this is non-empty
    #[serde(rename = "key_value", default)]
    pub private_key: String,
}

impl RemoteCredentials {
    /// Parse a secret document `{ftp_url, user_id, password, key_value}`
    pub fn from_secret_json(secret: &str) -> anyhow::Result<Self> {
        serde_json::from_str(secret).context("Remote server secret is not valid JSON")
    }

    pub fn uses_key_auth(&self) -> bool {
        !self.private_key.trim().is_empty()
    }
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("key_auth", &self.uses_key_auth())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Multiplied by the attempt number before each retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }
}

/// Run a blocking transport operation with retries
pub(crate) async fn run_blocking<T, F>(
    policy: RetryPolicy,
    operation: &'static str,
    target: &str,
    op: F,
) -> Result<T>
where
    T: Send + 'static,
    F: Fn() -> anyhow::Result<T> + Clone + Send + 'static,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        debug!("{} attempt {}/{} for: {}", operation, attempt, attempts, target);

        match tokio::task::spawn_blocking(op.clone()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if attempt < attempts => {
                let delay = policy.base_delay * attempt;
                warn!(
                    "{} attempt {}/{} failed for {}: {:#}. Retrying in {:?}",
                    operation, attempt, attempts, target, e, delay
                );
                tokio::time::sleep(delay).await;
            },
            Ok(Err(e)) => {
                return Err(PipelineError::transport(e.context(format!(
                    "{} failed for {} after {} attempts",
                    operation, target, attempts
                ))));
            },
            Err(e) => {
                return Err(PipelineError::Transport(format!(
                    "{} task panicked: {}",
                    operation, e
                )));
            },
        }
    }

    Err(PipelineError::Transport(format!(
        "{} was never attempted for {}",
        operation, target
    )))
}
