//! Arrival Notifier
//!
//! Turns an object-created notification for the staging store into the
//! arrival payload and a PENDING run.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::payload::ArrivalPayload;
use super::run::{LogContext, PipelineRun, RunStores};
use crate::error::{PipelineError, Result};
use crate::storage::{ObjectLocation, ObjectStore, META_LOG_GROUP, META_LOG_STREAM};

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectCreatedEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// ISO-8601; ordering by string is ordering by time
    #[serde(default)]
    pub event_time: String,
    #[serde(default)]
    pub response_elements: ResponseElements,
    pub s3: EventEntity,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseElements {
    #[serde(rename = "x-amz-request-id")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventEntity {
    pub bucket: EventBucket,
    pub object: EventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventBucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventObject {
    pub key: String,
}

impl ObjectCreatedEvent {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::Notification(format!("unreadable notification: {}", e)))
    }

    /// Record with the latest event time
    pub fn latest(&self) -> Option<&EventRecord> {
        self.records.iter().max_by(|a, b| a.event_time.cmp(&b.event_time))
    }
}

/// Decode a notification object key (`+` is a space, the rest is percent-encoded)
pub fn decode_key(raw: &str) -> Result<String> {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| PipelineError::Notification(format!("key '{}' is not valid UTF-8: {}", raw, e)))
}

#[derive(Debug, Clone)]
pub struct Arrival {
    pub payload: ArrivalPayload,
    pub run: PipelineRun,
}

pub struct ArrivalNotifier {
    store: Arc<dyn ObjectStore>,
    stores: RunStores,
    staging_prefix: String,
}

impl ArrivalNotifier {
    pub fn new(store: Arc<dyn ObjectStore>, stores: RunStores, staging_prefix: impl Into<String>) -> Self {
        Self {
            store,
            stores,
            staging_prefix: staging_prefix.into(),
        }
    }

    #[instrument(skip(self, event), fields(records = event.records.len()))]
    pub async fn notify(&self, event: &ObjectCreatedEvent) -> Result<Arrival> {
        let record = event
            .latest()
            .ok_or_else(|| PipelineError::Notification("notification has no records".into()))?;

        let key = decode_key(&record.s3.object.key)?;
        let source = ObjectLocation::new(&record.s3.bucket.name, &key);

        let correlation_id = match &record.response_elements.request_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let id = uuid::Uuid::new_v4().to_string();
                warn!("Notification has no request id, using {}", id);
                id
            },
        };

        let metadata = self.store.head(&source).await?;
        let log_context = match (metadata.get(META_LOG_GROUP), metadata.get(META_LOG_STREAM)) {
            (Some(group), Some(stream)) => Some(LogContext {
                log_group: group.clone(),
                log_stream: stream.clone(),
            }),
            _ => {
                warn!("{} carries no log group/stream metadata", source);
                None
            },
        };

        let file_name = key
            .strip_prefix(&self.staging_prefix)
            .unwrap_or(&key)
            .to_string();

        let run = PipelineRun::new(correlation_id, source, file_name, self.stores.clone())
            .with_log_context(log_context);
        info!(
            correlation_id = %run.correlation_id(),
            log_group = run.log_group(),
            log_stream = run.log_stream(),
            "Run opened for '{}'",
            run.file_name()
        );

        Ok(Arrival {
            payload: ArrivalPayload::from_run(&run),
            run,
        })
    }
}
