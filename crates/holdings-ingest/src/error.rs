//! Pipeline error types
//!
//! Validation problems are not errors here: a malformed filename is a
//! REJECTED classification, carried by the run itself.

use thiserror::Error;

use crate::pipeline::run::{PipelineRun, RunStatus};

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Remote connect, list, or read failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Object store copy, read, or upload failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Downstream delivery channel refused or could not be reached
    #[error("Forwarding error: {0}")]
    Forwarding(String),

    /// Stage invoked with a payload of unexpected shape
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Object-created notification could not be turned into a run
    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("Audit sink error: {0}")]
    Audit(String),

    #[error("Stage timed out after {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(format!("{:#}", err))
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

/// A stage failed; the run is handed back in whatever state the stage left it
#[derive(Error, Debug)]
#[error("{stage} stage failed for '{}': {source}", .run.file_name())]
pub struct StageError {
    pub stage: &'static str,
    pub run: Box<PipelineRun>,
    #[source]
    pub source: PipelineError,
}

impl StageError {
    pub fn new(stage: &'static str, run: PipelineRun, source: PipelineError) -> Self {
        Self {
            stage,
            run: Box::new(run),
            source,
        }
    }

    pub fn into_run(self) -> PipelineRun {
        *self.run
    }
}

impl From<StageError> for PipelineError {
    fn from(err: StageError) -> Self {
        err.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_context_chain() {
        let err = anyhow::anyhow!("connection reset").context("Failed to upload to S3");
        let storage = PipelineError::storage(err);
        assert_eq!(
            storage.to_string(),
            "Storage error: Failed to upload to S3: connection reset"
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = PipelineError::InvalidTransition {
            from: RunStatus::Forwarded,
            to: RunStatus::Archived,
        };
        assert_eq!(err.to_string(), "Invalid status transition: FORWARDED -> ARCHIVED");
    }
}
