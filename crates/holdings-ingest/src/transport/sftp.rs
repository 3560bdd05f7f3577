//! SFTP transport backed by libssh2
//!
//! Each operation opens its own session so concurrent reads never share
//! a channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ssh2::{FileStat, Session, Sftp};
use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{run_blocking, EntryKind, RemoteCredentials, RemoteEntry, RemoteTransport, RetryPolicy};

#[derive(Debug, Clone)]
pub struct SftpConfig {
    pub credentials: RemoteCredentials,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl SftpConfig {
    pub fn new(credentials: RemoteCredentials) -> Self {
        Self {
            credentials,
            port: 22,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

pub struct SftpTransport {
    config: SftpConfig,
    retry: RetryPolicy,
}

impl SftpTransport {
    pub fn new(config: SftpConfig) -> Self {
        Self {
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn connect(config: &SftpConfig) -> Result<(Session, Sftp)> {
        let creds = &config.credentials;
        debug!("Connecting to SFTP server: {}:{}", creds.host, config.port);

        let tcp = TcpStream::connect((creds.host.as_str(), config.port))
            .with_context(|| format!("Failed to connect to {}:{}", creds.host, config.port))?;
        tcp.set_read_timeout(Some(config.connect_timeout))
            .context("Failed to set socket timeout")?;

        let mut session = Session::new().context("Failed to create SSH session")?;
        session.set_tcp_stream(tcp);
        session.handshake().context("SSH handshake failed")?;

        if creds.uses_key_auth() {
            session
                .userauth_pubkey_memory(&creds.username, None, &creds.private_key, None)
                .context("SSH key authentication failed")?;
        } else {
            session
                .userauth_password(&creds.username, &creds.password)
                .context("SSH password authentication failed")?;
        }

        let sftp = session.sftp().context("Failed to open SFTP channel")?;
        info!("SFTP connection established to {}", creds.host);

        Ok((session, sftp))
    }

    fn list_directory_sync(config: &SftpConfig, path: &str) -> Result<Vec<RemoteEntry>> {
        let (_session, sftp) = Self::connect(config)?;

        let entries = sftp
            .readdir(Path::new(path))
            .with_context(|| format!("Failed to list directory: {}", path))?;

        Ok(entries
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().to_string();
                if name == "." || name == ".." {
                    return None;
                }
                Some(RemoteEntry {
                    name,
                    kind: entry_kind(&stat),
                    size: stat.size,
                })
            })
            .collect())
    }

    fn read_file_sync(config: &SftpConfig, path: &str) -> Result<Vec<u8>> {
        let (_session, sftp) = Self::connect(config)?;

        let mut file = sftp
            .open(Path::new(path))
            .with_context(|| format!("Failed to open remote file: {}", path))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .with_context(|| format!("Failed to read remote file: {}", path))?;

        debug!("Read {} bytes from {}", data.len(), path);
        Ok(data)
    }
}

fn entry_kind(stat: &FileStat) -> EntryKind {
    let file_type = stat.file_type();
    if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

#[async_trait]
impl RemoteTransport for SftpTransport {
    async fn list_directory(&self, path: &str) -> crate::error::Result<Vec<RemoteEntry>> {
        let config = self.config.clone();
        let target = path.to_string();
        run_blocking(self.retry, "SFTP LIST", path, move || {
            Self::list_directory_sync(&config, &target)
        })
        .await
    }

    async fn read_file(&self, path: &str) -> crate::error::Result<Vec<u8>> {
        let config = self.config.clone();
        let target = path.to_string();
        run_blocking(self.retry, "SFTP READ", path, move || {
            Self::read_file_sync(&config, &target)
        })
        .await
    }
}
