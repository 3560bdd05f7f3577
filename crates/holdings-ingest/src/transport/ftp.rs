//! Plain FTP transport
//!
//! Uses Extended Passive Mode (EPSV) for NAT/firewall compatibility.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Read;
use suppaftp::FtpStream;
use tracing::{debug, warn};

use super::{run_blocking, EntryKind, RemoteCredentials, RemoteEntry, RemoteTransport, RetryPolicy};

#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub credentials: RemoteCredentials,
    pub port: u16,
}

impl FtpConfig {
    pub fn new(credentials: RemoteCredentials) -> Self {
        Self {
            credentials,
            port: 21,
        }
    }
}

pub struct FtpTransport {
    config: FtpConfig,
    retry: RetryPolicy,
}

impl FtpTransport {
    pub fn new(config: FtpConfig) -> Self {
        Self {
            config,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn login(config: &FtpConfig) -> Result<FtpStream> {
        let creds = &config.credentials;
        debug!("Connecting to FTP server: {}:{}", creds.host, config.port);

        let mut ftp_stream = FtpStream::connect(format!("{}:{}", creds.host, config.port))
            .context("Failed to connect to FTP server")?;

        ftp_stream.set_mode(suppaftp::Mode::ExtendedPassive);

        ftp_stream
            .login(&creds.username, &creds.password)
            .context("FTP login failed")?;

        ftp_stream
            .transfer_type(suppaftp::types::FileType::Binary)
            .context("Failed to set binary mode")?;

        Ok(ftp_stream)
    }

    fn list_directory_sync(config: &FtpConfig, path: &str) -> Result<Vec<RemoteEntry>> {
        let mut ftp_stream = Self::login(config)?;

        let lines = ftp_stream
            .list(Some(path))
            .with_context(|| format!("Failed to list directory: {}", path))?;

        if let Err(e) = ftp_stream.quit() {
            warn!("Failed to quit FTP session gracefully: {}", e);
        }

        Ok(lines.iter().filter_map(|line| parse_list_line(line)).collect())
    }

    fn read_file_sync(config: &FtpConfig, path: &str) -> Result<Vec<u8>> {
        let mut ftp_stream = Self::login(config)?;

        let mut reader = ftp_stream
            .retr_as_buffer(path)
            .with_context(|| format!("Failed to download file: {}", path))?;

        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .context("Failed to read file data")?;

        if let Err(e) = ftp_stream.quit() {
            warn!("Failed to quit FTP session gracefully: {}", e);
        }

        debug!("Downloaded {} bytes from {}", data.len(), path);
        Ok(data)
    }
}

/// Parse a Unix-style LIST line
///
/// `-rw-r--r--   1 ftp ftp  1234 Jan 15 12:00 Holdings_2023-11-29 0209 12345_SEVNET.h`
///
/// Names may contain spaces, so everything after the time/year column is
/// the name. Symlinks drop their ` -> target` suffix.
pub fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    let mut rest = line.trim_start();
    let mut fields = Vec::with_capacity(8);
    for _ in 0..8 {
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }

    let mut name = rest.trim_end_matches(['\r', '\n']);
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    let kind = match fields[0].chars().next()? {
        '-' => EntryKind::File,
        'd' => EntryKind::Directory,
        'l' => {
            if let Some((link, _target)) = name.split_once(" -> ") {
                name = link;
            }
            EntryKind::Symlink
        },
        _ => EntryKind::Other,
    };

    Some(RemoteEntry {
        name: name.to_string(),
        kind,
        size: fields[4].parse().ok(),
    })
}

#[async_trait]
impl RemoteTransport for FtpTransport {
    async fn list_directory(&self, path: &str) -> crate::error::Result<Vec<RemoteEntry>> {
        let config = self.config.clone();
        let target = path.to_string();
        run_blocking(self.retry, "FTP LIST", path, move || {
            Self::list_directory_sync(&config, &target)
        })
        .await
    }

    async fn read_file(&self, path: &str) -> crate::error::Result<Vec<u8>> {
        let config = self.config.clone();
        let target = path.to_string();
        run_blocking(self.retry, "FTP RETR", path, move || {
            Self::read_file_sync(&config, &target)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_with_spaces() {
        let entry = parse_list_line(
            "-rw-r--r--   1 ftp ftp  123456 Nov 29 02:09 Holdings_2023-11-29 0209 12345_SEVNET.h",
        )
        .unwrap();
        assert_eq!(entry.name, "Holdings_2023-11-29 0209 12345_SEVNET.h");
        assert!(entry.is_regular_file());
        assert_eq!(entry.size, Some(123456));
    }

    #[test]
    fn test_parse_directory_entry() {
        let entry = parse_list_line("drwxr-xr-x   2 ftp ftp  4096 Jan 15 12:00 archive").unwrap();
        assert_eq!(entry.name, "archive");
        assert_eq!(entry.kind, EntryKind::Directory);
    }

    #[test]
    fn test_parse_symlink_strips_target() {
        let entry =
            parse_list_line("lrwxrwxrwx   1 ftp ftp  9 Jan 15  2024 latest.h -> a b c_d.h").unwrap();
        assert_eq!(entry.name, "latest.h");
        assert_eq!(entry.kind, EntryKind::Symlink);
    }

    #[test]
    fn test_parse_short_or_empty_line() {
        assert!(parse_list_line("").is_none());
        assert!(parse_list_line("total 12").is_none());
        assert!(parse_list_line("drwxr-xr-x 2 ftp ftp 4096 Jan 15 12:00 .").is_none());
    }

    #[test]
    fn test_ftp_config_default_port() {
        assert_eq!(FtpConfig::new(RemoteCredentials::default()).port, 21);
    }
}
