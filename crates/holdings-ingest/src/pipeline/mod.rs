//! Per-file ingestion pipeline
//!
//! A run moves PENDING → ACCEPTED → ARCHIVED → FORWARDED, or is closed as
//! REJECTED or FAILED. Each stage takes the run by value and hands it back,
//! either as the next state or inside a [`StageError`].

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::audit::{AuditDestination, AuditSink};
use crate::delivery::DeliveryChannel;
use crate::error::{PipelineError, Result, StageError};
use crate::storage::ObjectStore;

pub mod archiver;
pub mod fetcher;
pub mod forwarder;
pub mod notifier;
pub mod parser;
pub mod payload;
pub mod rejection;
pub mod run;

pub use fetcher::{FetchConfig, FetchReport, RemoteFetcher};
pub use notifier::{Arrival, ArrivalNotifier, ObjectCreatedEvent};
pub use payload::{
    AcceptedPayload, ArchivedPayload, ArrivalPayload, FileDetails, ParseOutcome, PayloadStatus,
    RejectedPayload,
};
pub use run::{LogContext, PipelineRun, RunStatus, RunStores};

pub const PARSE_STAGE: &str = "parse";

/// Close `run` as FAILED and wrap the cause
pub(crate) fn stage_failure(stage: &'static str, mut run: PipelineRun, err: PipelineError) -> StageError {
    error!("{} failed for '{}': {}", stage, run.file_name(), err);
    if let Err(transition) = run.fail(&err) {
        warn!("Run left at {}: {}", run.status(), transition);
    }
    StageError::new(stage, run, err)
}

/// Everything the stages after arrival need
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    delivery: Option<Arc<dyn DeliveryChannel>>,
    audit: Arc<dyn AuditSink>,
    stores: RunStores,
    audit_destination: AuditDestination,
    stage_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        delivery: Arc<dyn DeliveryChannel>,
        audit: Arc<dyn AuditSink>,
        stores: RunStores,
        audit_destination: AuditDestination,
    ) -> Self {
        Self {
            delivery: Some(delivery),
            ..Self::without_delivery(store, audit, stores, audit_destination)
        }
    }

    /// A pipeline that can parse, archive and reject but not forward
    pub fn without_delivery(
        store: Arc<dyn ObjectStore>,
        audit: Arc<dyn AuditSink>,
        stores: RunStores,
        audit_destination: AuditDestination,
    ) -> Self {
        Self {
            store,
            delivery: None,
            audit,
            stores,
            audit_destination,
            stage_timeout: None,
        }
    }

    /// Bound every stage by `timeout`; a timed-out stage hands back the run
    /// as it was before the stage started
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }

    pub fn stores(&self) -> &RunStores {
        &self.stores
    }

    async fn bounded<F>(&self, stage: &'static str, run: &PipelineRun, fut: F) -> std::result::Result<PipelineRun, StageError>
    where
        F: std::future::Future<Output = std::result::Result<PipelineRun, StageError>>,
    {
        match self.stage_timeout {
            None => fut.await,
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!("{} stage timed out after {:?}", stage, limit);
                    Err(StageError::new(
                        stage,
                        run.clone(),
                        PipelineError::Timeout(limit.as_secs()),
                    ))
                },
            },
        }
    }

    #[instrument(name = "stage", skip(self, run), fields(stage = PARSE_STAGE, correlation_id = %run.correlation_id(), file_name = %run.file_name(), log_group = run.log_group(), log_stream = run.log_stream()))]
    pub async fn classify(&self, mut run: PipelineRun) -> std::result::Result<PipelineRun, StageError> {
        match parser::classify(&mut run) {
            Ok(()) => Ok(run),
            Err(e) => Err(StageError::new(PARSE_STAGE, run, e)),
        }
    }

    #[instrument(name = "stage", skip(self, run), fields(stage = archiver::STAGE, correlation_id = %run.correlation_id(), file_name = %run.file_name(), log_group = run.log_group(), log_stream = run.log_stream()))]
    pub async fn archive(&self, run: PipelineRun) -> std::result::Result<PipelineRun, StageError> {
        let before = run.clone();
        self.bounded(archiver::STAGE, &before, archiver::archive(self.store.as_ref(), run))
            .await
    }

    #[instrument(name = "stage", skip(self, run), fields(stage = forwarder::STAGE, correlation_id = %run.correlation_id(), file_name = %run.file_name(), log_group = run.log_group(), log_stream = run.log_stream()))]
    pub async fn forward(&self, run: PipelineRun) -> std::result::Result<PipelineRun, StageError> {
        let Some(delivery) = &self.delivery else {
            let err = PipelineError::Config("no delivery channel configured".into());
            return Err(StageError::new(forwarder::STAGE, run, err));
        };
        let before = run.clone();
        self.bounded(forwarder::STAGE, &before, forwarder::forward(delivery.as_ref(), run))
            .await
    }

    #[instrument(name = "stage", skip(self, run), fields(stage = rejection::STAGE, correlation_id = %run.correlation_id(), file_name = %run.file_name(), log_group = run.log_group(), log_stream = run.log_stream()))]
    pub async fn reject(&self, run: PipelineRun) -> std::result::Result<PipelineRun, StageError> {
        let before = run.clone();
        let fut = rejection::reject(
            self.store.as_ref(),
            self.audit.as_ref(),
            &self.audit_destination,
            run,
        );
        self.bounded(rejection::STAGE, &before, fut).await
    }

    /// Run the remaining stages for `run` in order
    ///
    /// A REJECTED run goes through the Rejection Handler; an ARCHIVED run
    /// (including one whose forwarding failed earlier) is forwarded again.
    /// Closed FORWARDED and FAILED runs come back untouched.
    pub async fn drive(&self, mut run: PipelineRun) -> std::result::Result<PipelineRun, StageError> {
        if run.status() == RunStatus::Pending {
            run = self.classify(run).await?;
        }

        match run.status() {
            RunStatus::Rejected => return self.reject(run).await,
            RunStatus::Accepted => run = self.archive(run).await?,
            _ => {},
        }

        if run.status() == RunStatus::Archived {
            run = self.forward(run).await?;
        }

        if run.is_closed() {
            info!(
                correlation_id = %run.correlation_id(),
                "Run for '{}' closed as {}",
                run.file_name(),
                run.status()
            );
        } else {
            warn!(
                correlation_id = %run.correlation_id(),
                "'{}' stays {} until forwarding is retried",
                run.file_name(),
                run.status()
            );
        }
        Ok(run)
    }

    /// Filename Parser on an arrival document
    pub fn parse_payload(&self, document: &Value) -> ParseOutcome {
        parser::parse_payload(document, &self.stores)
    }

    /// Archiver on an accepted payload
    pub async fn archive_payload(&self, payload: AcceptedPayload) -> Result<ArchivedPayload> {
        let run = payload.into_run(&self.stores)?;
        let run = self.archive(run).await?;
        ArchivedPayload::from_run(&run)
    }

    /// Forwarder on an archived payload; returns the resulting run
    pub async fn forward_payload(&self, payload: ArchivedPayload) -> Result<PipelineRun> {
        let run = payload.into_run(&self.stores)?;
        Ok(self.forward(run).await?)
    }

    /// Rejection Handler on a rejected payload
    pub async fn reject_payload(&self, payload: RejectedPayload) -> Result<PipelineRun> {
        let fallback_id = uuid::Uuid::new_v4().to_string();
        let run = payload.into_run(&self.stores, &fallback_id)?;
        Ok(self.reject(run).await?)
    }
}
