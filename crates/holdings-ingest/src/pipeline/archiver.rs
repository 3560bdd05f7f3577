//! Archiver
//!
//! Mirrors an accepted file into the user store and packages it as a
//! single-entry zip in the archive store.

use holdings_common::checksum::{sha256_hex, verify_checksum};
use std::io::{Cursor, Write};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::run::{PipelineRun, RunStatus};
use super::stage_failure;
use crate::error::{PipelineError, StageError};
use crate::storage::{ObjectLocation, ObjectStore, META_SHA256};

pub const STAGE: &str = "archive";

/// Archive key for a file name
pub fn archive_key(file_name: &str) -> String {
    format!("{}.zip", file_name)
}

/// Build a deflate zip holding `data` as `entry_name`
///
/// Entries carry the zip epoch (1980-01-01) as their modification time, so
/// the same input always produces the same bytes.
pub fn build_archive(entry_name: &str, data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(entry_name, options)?;
    writer.write_all(data)?;
    Ok(writer.finish()?.into_inner())
}

pub async fn archive(
    store: &dyn ObjectStore,
    mut run: PipelineRun,
) -> Result<PipelineRun, StageError> {
    if run.status() != RunStatus::Accepted {
        let err = PipelineError::MalformedPayload(format!(
            "archive requires an ACCEPTED run, got {}",
            run.status()
        ));
        return Err(StageError::new(STAGE, run, err));
    }

    let source = run.source();
    let user_copy = ObjectLocation::new(&run.stores().user_bucket, run.source_key());
    match store.copy(&source, &user_copy).await {
        Ok(()) => info!("Copied to user store {}", user_copy),
        Err(e) => warn!("User store copy to {} failed, continuing: {}", user_copy, e),
    }

    let object = match store.get(&source).await {
        Ok(object) => object,
        Err(e) => return Err(stage_failure(STAGE, run, e)),
    };

    // Staged objects carry the digest taken when they were fetched
    if let Some(expected) = object.metadata.get(META_SHA256) {
        if let Err(e) = verify_checksum(&object.data, expected) {
            let err = PipelineError::storage(format!("{} changed since staging: {}", source, e));
            return Err(stage_failure(STAGE, run, err));
        }
    }

    let bytes = match build_archive(run.file_name(), &object.data) {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = PipelineError::storage(e.context("Failed to build zip archive"));
            return Err(stage_failure(STAGE, run, err));
        },
    };

    let key = archive_key(run.file_name());
    let destination = ObjectLocation::new(&run.stores().archive_bucket, &key);
    let mut metadata = object.metadata;
    metadata.insert(META_SHA256.to_string(), sha256_hex(&bytes));
    if let Err(e) = store.put(&destination, bytes, metadata).await {
        return Err(stage_failure(STAGE, run, e));
    }

    if let Err(e) = run.mark_archived(key) {
        return Err(StageError::new(STAGE, run, e));
    }
    info!("Archived to {}", destination.uri());
    Ok(run)
}
