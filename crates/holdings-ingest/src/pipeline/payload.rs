//! Stage-to-stage payloads
//!
//! Each stage can be invoked on its own with the JSON document the previous
//! stage produced. Field names are fixed by the consumers of these documents
//! and intentionally mix conventions (`copySource` next to `target_key`).
//!
//! Every payload also carries the staged `key` and the log group/stream so
//! a run can be rebuilt from it without consulting the staging store.

use serde::{Deserialize, Serialize};

use crate::audit::REASON_IDENTITY_NOT_POPULATED;
use crate::error::{PipelineError, Result};
use crate::pipeline::run::{LogContext, PipelineRun, RunStatus, RunStores};
use crate::storage::ObjectLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetails {
    pub id: String,
    /// File name without the staging prefix
    pub name: String,
    pub bucket: String,
    pub error_bucket: String,
    /// Staged object key; `name` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Arrival Notifier output, Filename Parser input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalPayload {
    /// Request id; the first file entry's `id` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub filedetails: Vec<FileDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_stream: Option<String>,
}

/// Filename Parser output for an accepted file, Archiver input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedPayload {
    pub status: PayloadStatus,
    pub bucket: String,
    pub file: String,
    pub id: String,
    pub agency_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_stream: Option<String>,
}

/// Filename Parser output for a rejected file, Rejection Handler input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedPayload {
    pub status: PayloadStatus,
    /// Error bucket
    pub bucket: String,
    /// `<bucket>/<key>` of the staged object
    #[serde(rename = "copySource")]
    pub copy_source: String,
    pub target_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_stream: Option<String>,
}

/// Archiver output, Forwarder input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedPayload {
    #[serde(flatten)]
    pub accepted: AcceptedPayload,
    pub holding_zip_bucket: String,
    pub holding_zip_file: String,
}

/// Either branch of the Filename Parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParseOutcome {
    Accepted(AcceptedPayload),
    Rejected(RejectedPayload),
}

impl ParseOutcome {
    pub fn status(&self) -> PayloadStatus {
        match self {
            ParseOutcome::Accepted(payload) => payload.status,
            ParseOutcome::Rejected(payload) => payload.status,
        }
    }
}

fn log_context(group: &Option<String>, stream: &Option<String>) -> Option<LogContext> {
    match (group, stream) {
        (Some(log_group), Some(log_stream)) => Some(LogContext {
            log_group: log_group.clone(),
            log_stream: log_stream.clone(),
        }),
        _ => None,
    }
}

fn log_fields(run: &PipelineRun) -> (Option<String>, Option<String>) {
    match run.log_context() {
        Some(ctx) => (Some(ctx.log_group.clone()), Some(ctx.log_stream.clone())),
        None => (None, None),
    }
}

/// Staged key if it differs from the file name
fn distinct_key(run: &PipelineRun) -> Option<String> {
    (run.source_key() != run.file_name()).then(|| run.source_key().to_string())
}

fn expect_status(run: &PipelineRun, expected: RunStatus) -> Result<()> {
    if run.status() != expected {
        return Err(PipelineError::MalformedPayload(format!(
            "'{}' is {}, expected {}",
            run.file_name(),
            run.status(),
            expected
        )));
    }
    Ok(())
}

impl ArrivalPayload {
    pub fn from_run(run: &PipelineRun) -> Self {
        let (log_group, log_stream) = log_fields(run);
        Self {
            id: Some(run.correlation_id().to_string()),
            filedetails: vec![FileDetails {
                id: run.correlation_id().to_string(),
                name: run.file_name().to_string(),
                bucket: run.source_bucket().to_string(),
                error_bucket: run.stores().error_bucket.clone(),
                key: distinct_key(run),
            }],
            log_group,
            log_stream,
        }
    }

    /// Open a PENDING run from the first file entry
    pub fn into_run(self, stores: &RunStores) -> Result<PipelineRun> {
        let log = log_context(&self.log_group, &self.log_stream);
        let details = self
            .filedetails
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::MalformedPayload("filedetails is empty".into()))?;

        let key = details.key.unwrap_or_else(|| details.name.clone());
        let stores = RunStores {
            error_bucket: details.error_bucket,
            ..stores.clone()
        };
        Ok(PipelineRun::new(
            details.id,
            ObjectLocation::new(details.bucket, key),
            details.name,
            stores,
        )
        .with_log_context(log))
    }
}

impl AcceptedPayload {
    pub fn from_run(run: &PipelineRun) -> Result<Self> {
        let agency_code = run.identity_token().ok_or_else(|| {
            PipelineError::MalformedPayload(format!("'{}' has no identity token", run.file_name()))
        })?;
        let (log_group, log_stream) = log_fields(run);
        Ok(Self {
            status: PayloadStatus::Success,
            bucket: run.source_bucket().to_string(),
            file: run.file_name().to_string(),
            id: run.correlation_id().to_string(),
            agency_code: agency_code.to_string(),
            key: distinct_key(run),
            log_group,
            log_stream,
        })
    }

    /// Rebuild the ACCEPTED run this payload describes
    pub fn into_run(self, stores: &RunStores) -> Result<PipelineRun> {
        if self.status != PayloadStatus::Success {
            return Err(PipelineError::MalformedPayload(
                "accepted payload must have status \"success\"".into(),
            ));
        }
        if self.agency_code.is_empty() {
            return Err(PipelineError::MalformedPayload("agency_code is empty".into()));
        }

        let log = log_context(&self.log_group, &self.log_stream);
        // Notifications encode spaces as '+'
        let file = self.file.replace('+', " ");
        let key = self.key.unwrap_or_else(|| file.clone());
        Ok(
            PipelineRun::new(self.id, ObjectLocation::new(self.bucket, key), file, stores.clone())
                .with_log_context(log)
                .resume(RunStatus::Accepted, Some(self.agency_code), None, None),
        )
    }
}

impl ArchivedPayload {
    pub fn from_run(run: &PipelineRun) -> Result<Self> {
        expect_status(run, RunStatus::Archived)?;
        let archive = run.archive_location().ok_or_else(|| {
            PipelineError::MalformedPayload(format!("'{}' has no archive key", run.file_name()))
        })?;
        Ok(Self {
            accepted: AcceptedPayload::from_run(run)?,
            holding_zip_bucket: archive.bucket,
            holding_zip_file: archive.key,
        })
    }

    /// Rebuild the ARCHIVED run; the archive bucket comes from the payload
    pub fn into_run(self, stores: &RunStores) -> Result<PipelineRun> {
        let stores = RunStores {
            archive_bucket: self.holding_zip_bucket,
            ..stores.clone()
        };
        let run = self.accepted.into_run(&stores)?;
        let token = run.identity_token().map(str::to_string);
        Ok(run.resume(RunStatus::Archived, token, Some(self.holding_zip_file), None))
    }
}

impl RejectedPayload {
    pub fn from_run(run: &PipelineRun) -> Result<Self> {
        expect_status(run, RunStatus::Rejected)?;
        let (log_group, log_stream) = log_fields(run);
        Ok(Self {
            status: PayloadStatus::Failure,
            bucket: run.stores().error_bucket.clone(),
            copy_source: run.source().to_string(),
            target_key: run.error_location().key,
            id: Some(run.correlation_id().to_string()),
            file: Some(run.file_name().to_string()),
            reason: run.rejection_reason().map(str::to_string),
            log_group,
            log_stream,
        })
    }

    /// Rebuild the REJECTED run; the error bucket comes from the payload
    ///
    /// `correlation_id` is used when the payload carries no `id`.
    pub fn into_run(self, stores: &RunStores, correlation_id: &str) -> Result<PipelineRun> {
        let source = ObjectLocation::parse(&self.copy_source).ok_or_else(|| {
            PipelineError::MalformedPayload(format!(
                "copySource '{}' is not <bucket>/<key>",
                self.copy_source
            ))
        })?;
        let file_name = self.file.unwrap_or_else(|| {
            source
                .key
                .rsplit('/')
                .next()
                .unwrap_or(&source.key)
                .to_string()
        });
        let stores = RunStores {
            error_bucket: self.bucket,
            ..stores.clone()
        };
        let reason = self
            .reason
            .unwrap_or_else(|| REASON_IDENTITY_NOT_POPULATED.to_string());
        let log = log_context(&self.log_group, &self.log_stream);

        Ok(PipelineRun::new(
            self.id.unwrap_or_else(|| correlation_id.to_string()),
            source,
            file_name,
            stores,
        )
        .with_log_context(log)
        .with_error_key(Some(self.target_key))
        .resume(RunStatus::Rejected, None, None, Some(reason)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> RunStores {
        RunStores {
            user_bucket: "user".into(),
            archive_bucket: "zips".into(),
            error_bucket: "errors".into(),
        }
    }

    #[test]
    fn test_arrival_document_shape() {
        let json = serde_json::json!({
            "filedetails": [{
                "bucket": "staging",
                "name": "Holdings_2023-11-29 0209 12345_SEVNET.h",
                "error_bucket": "errors-from-event",
                "id": "req-1",
                "key": "sftp/Holdings_2023-11-29 0209 12345_SEVNET.h"
            }],
            "id": "req-1"
        });
        let payload: ArrivalPayload = serde_json::from_value(json).unwrap();
        let run = payload.into_run(&stores()).unwrap();

        assert_eq!(run.status(), RunStatus::Pending);
        assert_eq!(run.source_key(), "sftp/Holdings_2023-11-29 0209 12345_SEVNET.h");
        assert_eq!(run.stores().error_bucket, "errors-from-event");
        assert!(run.log_context().is_none());
    }

    #[test]
    fn test_accepted_payload_decodes_plus_in_file() {
        let payload: AcceptedPayload = serde_json::from_value(serde_json::json!({
            "status": "success",
            "bucket": "staging",
            "file": "Holdings_2023-11-29+0209+12345_SEVNET.h",
            "id": "req-1",
            "agency_code": "12345"
        }))
        .unwrap();
        let run = payload.into_run(&stores()).unwrap();
        assert_eq!(run.file_name(), "Holdings_2023-11-29 0209 12345_SEVNET.h");
        assert_eq!(run.status(), RunStatus::Accepted);
        assert_eq!(run.identity_token(), Some("12345"));
    }

    #[test]
    fn test_accepted_payload_requires_success_status() {
        let payload = AcceptedPayload {
            status: PayloadStatus::Failure,
            bucket: "b".into(),
            file: "f".into(),
            id: "i".into(),
            agency_code: "1".into(),
            key: None,
            log_group: None,
            log_stream: None,
        };
        assert!(matches!(
            payload.into_run(&stores()),
            Err(PipelineError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_archived_payload_flattens_accepted_fields() {
        let mut run = PipelineRun::new(
            "req-2",
            ObjectLocation::new("staging", "sftp/a b 7_x.h"),
            "a b 7_x.h",
            stores(),
        );
        run.accept("7").unwrap();
        run.mark_archived("a b 7_x.h.zip").unwrap();

        let payload = ArchivedPayload::from_run(&run).unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["agency_code"], "7");
        assert_eq!(json["key"], "sftp/a b 7_x.h");
        assert_eq!(json["holding_zip_bucket"], "zips");
        assert_eq!(json["holding_zip_file"], "a b 7_x.h.zip");

        let back: ArchivedPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.into_run(&stores()).unwrap(), run);
    }

    #[test]
    fn test_rejected_payload_uses_copy_source() {
        let payload: RejectedPayload = serde_json::from_value(serde_json::json!({
            "status": "failure",
            "bucket": "errors",
            "copySource": "staging/sftp/a b _x.h",
            "target_key": "sftp/a b _x.h"
        }))
        .unwrap();
        let run = payload.into_run(&stores(), "fallback-id").unwrap();

        assert_eq!(run.status(), RunStatus::Rejected);
        assert_eq!(run.source(), ObjectLocation::new("staging", "sftp/a b _x.h"));
        assert_eq!(run.file_name(), "a b _x.h");
        assert_eq!(run.correlation_id(), "fallback-id");
        assert_eq!(run.rejection_reason(), Some(REASON_IDENTITY_NOT_POPULATED));
    }

    #[test]
    fn test_rejected_payload_keeps_distinct_target_key() {
        let payload: RejectedPayload = serde_json::from_value(serde_json::json!({
            "status": "failure",
            "bucket": "errors",
            "copySource": "staging/sftp/a b _x.h",
            "target_key": "a b _x.h",
            "id": "req-4"
        }))
        .unwrap();
        let run = payload.into_run(&stores(), "unused").unwrap();

        assert_eq!(run.source_key(), "sftp/a b _x.h");
        assert_eq!(run.error_location(), ObjectLocation::new("errors", "a b _x.h"));

        let back = RejectedPayload::from_run(&run).unwrap();
        assert_eq!(back.target_key, "a b _x.h");
        assert_eq!(back.copy_source, "staging/sftp/a b _x.h");
    }

    #[test]
    fn test_parse_outcome_is_untagged() {
        let rejected = serde_json::json!({
            "status": "failure",
            "bucket": "errors",
            "copySource": "staging/x",
            "target_key": "x"
        });
        let outcome: ParseOutcome = serde_json::from_value(rejected).unwrap();
        assert_eq!(outcome.status(), PayloadStatus::Failure);
        assert!(matches!(outcome, ParseOutcome::Rejected(_)));
    }
}
