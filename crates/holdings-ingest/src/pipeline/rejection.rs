//! Rejection Handler
//!
//! Copies a rejected file into the error store and writes one failure report
//! to the audit sink. The staged original stays where it is.

use chrono::Utc;
use tracing::{error, info};

use super::run::{PipelineRun, RunStatus};
use crate::audit::{AuditDestination, AuditEvent, AuditSink, FailureReport, REASON_IDENTITY_NOT_POPULATED};
use crate::error::{PipelineError, StageError};
use crate::storage::ObjectStore;

pub const STAGE: &str = "reject";

pub async fn reject(
    store: &dyn ObjectStore,
    audit: &dyn AuditSink,
    destination: &AuditDestination,
    run: PipelineRun,
) -> Result<PipelineRun, StageError> {
    if run.status() != RunStatus::Rejected {
        let err = PipelineError::MalformedPayload(format!(
            "reject requires a REJECTED run, got {}",
            run.status()
        ));
        return Err(StageError::new(STAGE, run, err));
    }

    let target = run.error_location();
    let copied = store.copy(&run.source(), &target).await;
    match &copied {
        Ok(()) => info!("Copied rejected file to {}", target),
        Err(e) => error!("Failed to copy rejected file to {}: {}", target, e),
    }

    // The report goes out even when the copy failed
    let report = FailureReport::new(
        run.rejection_reason().unwrap_or(REASON_IDENTITY_NOT_POPULATED),
        run.file_name(),
        run.correlation_id(),
        Utc::now(),
    );
    if let Err(e) = audit.put_event(destination, AuditEvent::now(report.to_string())).await {
        error!("Failed to emit failure report: {}", e);
    }

    match copied {
        Ok(()) => Ok(run),
        Err(e) => Err(StageError::new(STAGE, run, e)),
    }
}
