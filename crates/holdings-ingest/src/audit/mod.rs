//! Audit sink for rejection reports
//!
//! Audit records are plain strings written under a group/stream pair with a
//! millisecond timestamp. Delivery is best-effort: callers log failures and
//! move on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

pub mod memory;
pub mod report;

pub use memory::MemoryAuditSink;
pub use report::{FailureReport, AUDIT_TIMEZONE, REASON_IDENTITY_NOT_POPULATED};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDestination {
    pub log_group: String,
    pub log_stream: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub timestamp_ms: i64,
    pub message: String,
}

impl AuditEvent {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn put_event(&self, destination: &AuditDestination, event: AuditEvent) -> Result<()>;
}

/// Emits audit records as events on the `audit` tracing target
///
/// The subscriber decides where they land; the JSON formatter keeps the
/// group/stream fields next to the message.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn put_event(&self, destination: &AuditDestination, event: AuditEvent) -> Result<()> {
        info!(
            target: "audit",
            log_group = %destination.log_group,
            log_stream = %destination.log_stream,
            timestamp_ms = event.timestamp_ms,
            "{}",
            event.message
        );
        Ok(())
    }
}
