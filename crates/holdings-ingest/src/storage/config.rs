use serde::{Deserialize, Serialize};
use std::env;

/// Connection settings for the S3-compatible store
///
/// When no static keys are configured the default AWS credential chain
/// is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "ap-southeast-2".to_string(),
            access_key: None,
            secret_key: None,
            path_style: false,
        }
    }
}

impl S3Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read `S3_*` settings from any variable source
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            endpoint: var("S3_ENDPOINT"),
            region: var("S3_REGION")
                .or_else(|| var("AWS_REGION"))
                .unwrap_or_else(|| Self::default().region),
            access_key: var("S3_ACCESS_KEY"),
            secret_key: var("S3_SECRET_KEY"),
            path_style: var("S3_PATH_STYLE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }

    /// Static keys, when both halves are present
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) if !access.is_empty() && !secret.is_empty() => {
                Some((access.as_str(), secret.as_str()))
            },
            _ => None,
        }
    }
}
