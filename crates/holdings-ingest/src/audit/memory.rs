use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{AuditDestination, AuditEvent, AuditSink};
use crate::error::{PipelineError, Result};

#[derive(Debug, Default)]
struct Inner {
    events: Vec<(AuditDestination, AuditEvent)>,
    unavailable: bool,
}

/// Records audit events in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<(AuditDestination, AuditEvent)> {
        self.inner.lock().await.events.clone()
    }

    pub async fn messages(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .events
            .iter()
            .map(|(_, event)| event.message.clone())
            .collect()
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn put_event(&self, destination: &AuditDestination, event: AuditEvent) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.unavailable {
            return Err(PipelineError::Audit("audit sink unavailable".to_string()));
        }
        inner.events.push((destination.clone(), event));
        Ok(())
    }
}
