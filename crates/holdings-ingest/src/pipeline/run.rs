//! Per-file pipeline state
//!
//! A [`PipelineRun`] is created when a staged object is observed and is
//! passed by value from stage to stage. Status only ever moves forward; the
//! transition methods refuse anything else and leave the run untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};
use crate::storage::ObjectLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Accepted,
    Rejected,
    Archived,
    Forwarded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Accepted => "ACCEPTED",
            RunStatus::Rejected => "REJECTED",
            RunStatus::Archived => "ARCHIVED",
            RunStatus::Forwarded => "FORWARDED",
            RunStatus::Failed => "FAILED",
        }
    }

    /// A closed run is never resumed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Forwarded | RunStatus::Rejected | RunStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted | Rejected | Failed)
                | (Accepted, Archived | Failed)
                | (Archived, Forwarded | Failed)
        )
    }

    /// Whether an identity token is expected at this status
    pub fn carries_identity(&self) -> bool {
        matches!(
            self,
            RunStatus::Accepted | RunStatus::Archived | RunStatus::Forwarded
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination stores for one run, supplied by configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStores {
    pub user_bucket: String,
    pub archive_bucket: String,
    pub error_bucket: String,
}

/// Log group/stream pair threaded through every stage of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogContext {
    pub log_group: String,
    pub log_stream: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    correlation_id: String,
    source_bucket: String,
    source_key: String,
    file_name: String,
    status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity_token: Option<String>,
    #[serde(flatten)]
    stores: RunStores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    archive_key: Option<String>,
    /// Error store key when it differs from the staged key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log_context: Option<LogContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_note: Option<String>,
}

impl PipelineRun {
    /// Open a PENDING run for a staged object
    pub fn new(
        correlation_id: impl Into<String>,
        source: ObjectLocation,
        file_name: impl Into<String>,
        stores: RunStores,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            source_bucket: source.bucket,
            source_key: source.key,
            file_name: file_name.into(),
            status: RunStatus::Pending,
            identity_token: None,
            stores,
            archive_key: None,
            error_key: None,
            log_context: None,
            rejection_reason: None,
            error_note: None,
        }
    }

    pub fn with_log_context(mut self, log_context: Option<LogContext>) -> Self {
        self.log_context = log_context;
        self
    }

    pub fn with_error_key(mut self, error_key: Option<String>) -> Self {
        self.error_key = error_key.filter(|key| !key.is_empty() && *key != self.source_key);
        self
    }

    /// Rebuild a run at a given stage from an invocation payload
    pub(crate) fn resume(
        mut self,
        status: RunStatus,
        identity_token: Option<String>,
        archive_key: Option<String>,
        rejection_reason: Option<String>,
    ) -> Self {
        self.status = status;
        self.identity_token = identity_token;
        self.archive_key = archive_key;
        self.rejection_reason = rejection_reason;
        self
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn source(&self) -> ObjectLocation {
        ObjectLocation::new(&self.source_bucket, &self.source_key)
    }

    pub fn source_bucket(&self) -> &str {
        &self.source_bucket
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn identity_token(&self) -> Option<&str> {
        self.identity_token.as_deref()
    }

    pub fn stores(&self) -> &RunStores {
        &self.stores
    }

    pub fn archive_key(&self) -> Option<&str> {
        self.archive_key.as_deref()
    }

    pub fn archive_location(&self) -> Option<ObjectLocation> {
        self.archive_key
            .as_deref()
            .map(|key| ObjectLocation::new(&self.stores.archive_bucket, key))
    }

    /// Where a rejected file is copied in the error store
    pub fn error_location(&self) -> ObjectLocation {
        let key = self.error_key.as_deref().unwrap_or(&self.source_key);
        ObjectLocation::new(&self.stores.error_bucket, key)
    }

    pub fn log_context(&self) -> Option<&LogContext> {
        self.log_context.as_ref()
    }

    pub fn log_group(&self) -> Option<&str> {
        self.log_context.as_ref().map(|ctx| ctx.log_group.as_str())
    }

    pub fn log_stream(&self) -> Option<&str> {
        self.log_context.as_ref().map(|ctx| ctx.log_stream.as_str())
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn error_note(&self) -> Option<&str> {
        self.error_note.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn accept(&mut self, identity_token: impl Into<String>) -> Result<()> {
        self.transition(RunStatus::Accepted)?;
        self.identity_token = Some(identity_token.into());
        Ok(())
    }

    pub fn reject(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(RunStatus::Rejected)?;
        self.identity_token = None;
        self.rejection_reason = Some(reason.into());
        Ok(())
    }

    pub fn mark_archived(&mut self, archive_key: impl Into<String>) -> Result<()> {
        self.transition(RunStatus::Archived)?;
        self.archive_key = Some(archive_key.into());
        Ok(())
    }

    pub fn mark_forwarded(&mut self) -> Result<()> {
        self.transition(RunStatus::Forwarded)?;
        self.error_note = None;
        Ok(())
    }

    /// Close the run as FAILED, keeping the error for diagnostics
    pub fn fail(&mut self, error: &PipelineError) -> Result<()> {
        self.transition(RunStatus::Failed)?;
        self.identity_token = None;
        self.error_note = Some(error.to_string());
        Ok(())
    }

    /// Record a non-fatal error without changing status
    pub fn note_error(&mut self, error: &PipelineError) {
        self.error_note = Some(error.to_string());
    }

    fn transition(&mut self, next: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
