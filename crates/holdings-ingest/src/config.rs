//! Configuration management
//!
//! Everything comes from the environment (after loading `.env`), falling
//! back to the `DEFAULT_*` constants below.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audit::AuditDestination;
use crate::delivery::HttpDeliveryConfig;
use crate::pipeline::fetcher::{FetchConfig, DEFAULT_FETCH_CONCURRENCY, DEFAULT_STAGING_PREFIX};
use crate::pipeline::run::{LogContext, RunStores};
use crate::storage::config::S3Config;
use crate::transport::RemoteCredentials;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default SFTP port.
pub const DEFAULT_SFTP_PORT: u16 = 22;

/// Default FTP port.
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Default remote directory to fetch from.
pub const DEFAULT_REMOTE_DIRECTORY: &str = ".";

/// Default downstream request timeout in seconds.
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = crate::delivery::http::DEFAULT_DELIVERY_TIMEOUT_SECS;

/// Default audit log group for failure reports.
pub const DEFAULT_AUDIT_LOG_GROUP: &str = "holdings-audit";

/// Default audit log stream for failure reports.
pub const DEFAULT_AUDIT_LOG_STREAM: &str = "failures";

/// Default per-stage timeout in seconds (15 minutes).
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProtocol {
    Sftp,
    Ftp,
}

impl std::str::FromStr for RemoteProtocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sftp" => Ok(Self::Sftp),
            "ftp" => Ok(Self::Ftp),
            other => anyhow::bail!("Unknown remote protocol '{}', expected sftp or ftp", other),
        }
    }
}

impl RemoteProtocol {
    pub fn default_port(&self) -> u16 {
        match self {
            RemoteProtocol::Sftp => DEFAULT_SFTP_PORT,
            RemoteProtocol::Ftp => DEFAULT_FTP_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    pub stores: StoresConfig,
    pub s3: S3Config,
    pub delivery: DeliveryConfig,
    pub audit: AuditConfig,
    pub fetch: FetchSettings,
    pub pipeline: PipelineSettings,
    pub log: RunLogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub protocol: RemoteProtocol,
    pub port: u16,
    pub directory: String,
    #[serde(skip)]
    pub credentials: RemoteCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresConfig {
    pub staging_bucket: String,
    pub staging_prefix: String,
    pub user_bucket: String,
    pub archive_bucket: String,
    pub error_bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub endpoint: String,
    pub workflow_id: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub log_group: String,
    pub log_stream: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub stage_timeout_secs: u64,
}

/// Log group/stream stamped on staged objects
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunLogConfig {
    pub log_group: Option<String>,
    pub log_stream: Option<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Build from any variable source
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let string = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let parsed = |key: &str| var(key).and_then(|s| s.trim().parse::<u64>().ok());

        let protocol: RemoteProtocol = var("REMOTE_PROTOCOL")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(RemoteProtocol::Sftp);

        let credentials = match var("REMOTE_SECRET_JSON") {
            Some(secret) => RemoteCredentials::from_secret_json(&secret)?,
            None => RemoteCredentials {
                host: string("REMOTE_HOST", ""),
                username: string("REMOTE_USERNAME", ""),
                password: string("REMOTE_PASSWORD", ""),
                private_key: string("REMOTE_PRIVATE_KEY", ""),
            },
        };

        let port = match var("REMOTE_PORT") {
            Some(port) => port
                .trim()
                .parse()
                .with_context(|| format!("REMOTE_PORT '{}' is not a port number", port))?,
            None => protocol.default_port(),
        };

        Ok(Config {
            remote: RemoteConfig {
                protocol,
                port,
                directory: string("REMOTE_DIRECTORY", DEFAULT_REMOTE_DIRECTORY),
                credentials,
            },
            stores: StoresConfig {
                staging_bucket: string("STAGING_BUCKET", ""),
                staging_prefix: string("STAGING_PREFIX", DEFAULT_STAGING_PREFIX),
                user_bucket: string("USER_BUCKET", ""),
                archive_bucket: string("ARCHIVE_BUCKET", ""),
                error_bucket: string("ERROR_BUCKET", ""),
            },
            s3: S3Config::from_lookup(&var),
            delivery: DeliveryConfig {
                endpoint: string("DELIVERY_ENDPOINT", ""),
                workflow_id: string("DELIVERY_WORKFLOW_ID", ""),
                timeout_secs: parsed("DELIVERY_TIMEOUT").unwrap_or(DEFAULT_DELIVERY_TIMEOUT_SECS),
            },
            audit: AuditConfig {
                log_group: string("AUDIT_LOG_GROUP", DEFAULT_AUDIT_LOG_GROUP),
                log_stream: string("AUDIT_LOG_STREAM", DEFAULT_AUDIT_LOG_STREAM),
            },
            fetch: FetchSettings {
                concurrency: parsed("FETCH_CONCURRENCY")
                    .map(|n| n as usize)
                    .unwrap_or(DEFAULT_FETCH_CONCURRENCY),
            },
            pipeline: PipelineSettings {
                stage_timeout_secs: parsed("STAGE_TIMEOUT_SECS").unwrap_or(DEFAULT_STAGE_TIMEOUT_SECS),
            },
            log: RunLogConfig {
                log_group: var("RUN_LOG_GROUP"),
                log_stream: var("RUN_LOG_STREAM"),
            },
        })
    }

    /// Checks needed by every command
    pub fn validate(&self) -> anyhow::Result<()> {
        let buckets = [
            ("STAGING_BUCKET", &self.stores.staging_bucket),
            ("USER_BUCKET", &self.stores.user_bucket),
            ("ARCHIVE_BUCKET", &self.stores.archive_bucket),
            ("ERROR_BUCKET", &self.stores.error_bucket),
        ];
        for (name, bucket) in buckets {
            if bucket.trim().is_empty() {
                anyhow::bail!("{} must be set", name);
            }
        }

        if self.fetch.concurrency == 0 {
            anyhow::bail!("FETCH_CONCURRENCY must be greater than 0");
        }

        if self.pipeline.stage_timeout_secs == 0 {
            anyhow::bail!("STAGE_TIMEOUT_SECS must be greater than 0");
        }

        if self.log.log_group.is_some() != self.log.log_stream.is_some() {
            tracing::warn!("Only one of RUN_LOG_GROUP/RUN_LOG_STREAM is set; staged objects get neither");
        }

        Ok(())
    }

    /// Checks needed before connecting to the remote server
    pub fn validate_remote(&self) -> anyhow::Result<()> {
        if self.remote.credentials.host.trim().is_empty() {
            anyhow::bail!("REMOTE_HOST (or ftp_url in REMOTE_SECRET_JSON) must be set");
        }
        if self.remote.credentials.username.trim().is_empty() {
            anyhow::bail!("REMOTE_USERNAME (or user_id in REMOTE_SECRET_JSON) must be set");
        }
        if self.remote.port == 0 {
            anyhow::bail!("REMOTE_PORT must be greater than 0");
        }
        Ok(())
    }

    /// Checks needed before forwarding
    pub fn validate_delivery(&self) -> anyhow::Result<()> {
        if !self.delivery.endpoint.starts_with("http://") && !self.delivery.endpoint.starts_with("https://") {
            anyhow::bail!("DELIVERY_ENDPOINT must be an http(s) URL");
        }
        if self.delivery.workflow_id.trim().is_empty() {
            anyhow::bail!("DELIVERY_WORKFLOW_ID must be set");
        }
        Ok(())
    }

    pub fn run_stores(&self) -> RunStores {
        RunStores {
            user_bucket: self.stores.user_bucket.clone(),
            archive_bucket: self.stores.archive_bucket.clone(),
            error_bucket: self.stores.error_bucket.clone(),
        }
    }

    pub fn audit_destination(&self) -> AuditDestination {
        AuditDestination {
            log_group: self.audit.log_group.clone(),
            log_stream: self.audit.log_stream.clone(),
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        let log_context = match (&self.log.log_group, &self.log.log_stream) {
            (Some(group), Some(stream)) => Some(LogContext {
                log_group: group.clone(),
                log_stream: stream.clone(),
            }),
            _ => None,
        };
        FetchConfig {
            remote_directory: self.remote.directory.clone(),
            staging_bucket: self.stores.staging_bucket.clone(),
            staging_prefix: self.stores.staging_prefix.clone(),
            concurrency: self.fetch.concurrency,
            log_context,
        }
    }

    pub fn http_delivery_config(&self) -> HttpDeliveryConfig {
        HttpDeliveryConfig {
            endpoint: self.delivery.endpoint.clone(),
            workflow_id: self.delivery.workflow_id.clone(),
            timeout: Duration::from_secs(self.delivery.timeout_secs),
        }
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.stage_timeout_secs)
    }
}
