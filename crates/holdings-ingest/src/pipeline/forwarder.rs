//! Manifest Builder/Forwarder

use tracing::{error, info};

use super::run::PipelineRun;
use crate::delivery::DeliveryChannel;
use crate::error::StageError;
use crate::manifest::Manifest;

pub const STAGE: &str = "forward";

/// Forward the manifest of an ARCHIVED run
///
/// A refused or failed delivery is not a stage error: the run comes back
/// ARCHIVED with the error noted so forwarding can be retried later.
pub async fn forward(
    delivery: &dyn DeliveryChannel,
    mut run: PipelineRun,
) -> Result<PipelineRun, StageError> {
    let manifest = match Manifest::for_run(&run) {
        Ok(manifest) => manifest,
        Err(e) => return Err(StageError::new(STAGE, run, e)),
    };

    match delivery.start(&manifest).await {
        Ok(receipt) => {
            if let Err(e) = run.mark_forwarded() {
                return Err(StageError::new(STAGE, run, e));
            }
            info!(
                "Manifest accepted downstream (execution: {})",
                receipt.execution_id.as_deref().unwrap_or("-")
            );
        },
        Err(e) => {
            error!("Forwarding failed, archive kept for retry: {}", e);
            run.note_error(&e);
        },
    }

    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::MemoryDelivery;
    use crate::error::PipelineError;
    use crate::pipeline::run::{RunStatus, RunStores};
    use crate::storage::ObjectLocation;

    fn archived_run() -> PipelineRun {
        let mut run = PipelineRun::new(
            "req-1",
            ObjectLocation::new("staging", "sftp/a b 7_x.h"),
            "a b 7_x.h",
            RunStores {
                user_bucket: "user".into(),
                archive_bucket: "zips".into(),
                error_bucket: "errors".into(),
            },
        );
        run.accept("7").unwrap();
        run.mark_archived("a b 7_x.h.zip").unwrap();
        run
    }

    #[tokio::test]
    async fn test_confirmed_acceptance_forwards() {
        let delivery = MemoryDelivery::new();
        let run = forward(&delivery, archived_run()).await.unwrap();

        assert_eq!(run.status(), RunStatus::Forwarded);
        let sent = delivery.accepted().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body.identity_token, "7");
        assert_eq!(sent[0].body.files[0].path, "s3://zips/a b 7_x.h.zip");
    }

    #[tokio::test]
    async fn test_refusal_leaves_run_archived_with_note() {
        let delivery = MemoryDelivery::new();
        delivery.fail_next("status 500").await;

        let run = forward(&delivery, archived_run()).await.unwrap();
        assert_eq!(run.status(), RunStatus::Archived);
        assert_eq!(run.error_note(), Some("Forwarding error: status 500"));

        let retried = forward(&delivery, run).await.unwrap();
        assert_eq!(retried.status(), RunStatus::Forwarded);
        assert_eq!(retried.error_note(), None);
        assert_eq!(delivery.attempts().await, 2);
    }

    #[tokio::test]
    async fn test_not_archived_is_stage_error() {
        let mut run = archived_run();
        run.mark_forwarded().unwrap();
        let err = forward(&MemoryDelivery::new(), run).await.unwrap_err();
        assert!(matches!(err.source, PipelineError::MalformedPayload(_)));
    }
}
