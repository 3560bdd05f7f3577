//! Holdings Ingest Library
//!
//! Pulls holdings files from a remote server into a staging store, routes
//! each file by the identity token in its name, archives accepted files and
//! forwards a manifest downstream. Rejected files land in an error store
//! with a failure report on the audit sink.
//!
//! # Stages
//!
//! - **Fetch**: [`pipeline::RemoteFetcher`] copies regular files to staging
//! - **Notify**: [`pipeline::ArrivalNotifier`] opens a run per staged object
//! - **Parse / Archive / Forward / Reject**: [`pipeline::Pipeline`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use holdings_ingest::audit::{AuditDestination, MemoryAuditSink};
//! use holdings_ingest::delivery::MemoryDelivery;
//! use holdings_ingest::pipeline::{Pipeline, PipelineRun, RunStores};
//! use holdings_ingest::storage::{MemoryStore, ObjectLocation};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let stores = RunStores {
//!         user_bucket: "user".into(),
//!         archive_bucket: "zips".into(),
//!         error_bucket: "errors".into(),
//!     };
//!     let pipeline = Pipeline::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryDelivery::new()),
//!         Arc::new(MemoryAuditSink::new()),
//!         stores.clone(),
//!         AuditDestination { log_group: "audit".into(), log_stream: "holdings".into() },
//!     );
//!
//!     let run = PipelineRun::new(
//!         "req-1",
//!         ObjectLocation::new("staging", "sftp/Holdings_2023-11-29 0209 12345_SEVNET.h"),
//!         "Holdings_2023-11-29 0209 12345_SEVNET.h",
//!         stores,
//!     );
//!     let run = pipeline.drive(run).await?;
//!     println!("{}", run.status());
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod delivery;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod storage;
pub mod transport;

pub use error::{PipelineError, Result, StageError};
