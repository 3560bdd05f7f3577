//! Downstream manifest
//!
//! Describes one archived holdings file for the account-resolution workflow.
//! The serialized form is the consumer contract:
//!
//! ```json
//! { "id": "<correlation id>",
//!   "body": { "externalHoldingsId": "<identity token>", "type": "Holdings",
//!             "files": [ { "path": "s3://<bucket>/<key>" } ] } }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::pipeline::run::{PipelineRun, RunStatus};

/// Manifest type tag understood by the downstream workflow
pub const MANIFEST_TYPE: &str = "Holdings";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "id")]
    pub correlation_id: String,
    pub body: ManifestBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestBody {
    #[serde(rename = "externalHoldingsId")]
    pub identity_token: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub path: String,
}

impl Manifest {
    /// Build the manifest for an ARCHIVED run
    pub fn for_run(run: &PipelineRun) -> Result<Self> {
        if run.status() != RunStatus::Archived {
            return Err(PipelineError::MalformedPayload(format!(
                "manifest requires an ARCHIVED run, '{}' is {}",
                run.file_name(),
                run.status()
            )));
        }

        let identity_token = run.identity_token().ok_or_else(|| {
            PipelineError::MalformedPayload(format!(
                "archived run '{}' has no identity token",
                run.file_name()
            ))
        })?;

        let archive = run.archive_location().ok_or_else(|| {
            PipelineError::MalformedPayload(format!(
                "archived run '{}' has no archive key",
                run.file_name()
            ))
        })?;

        Ok(Self {
            correlation_id: run.correlation_id().to_string(),
            body: ManifestBody {
                identity_token: identity_token.to_string(),
                kind: MANIFEST_TYPE.to_string(),
                files: vec![ManifestFile { path: archive.uri() }],
            },
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
