use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{DeliveryChannel, DeliveryReceipt};
use crate::error::{PipelineError, Result};
use crate::manifest::Manifest;

#[derive(Debug, Default)]
struct Inner {
    accepted: Vec<Manifest>,
    attempts: usize,
    /// Scripted failures consumed one per attempt before accepting
    failures: VecDeque<String>,
    refuse_all: bool,
}

/// Records manifests instead of starting a workflow
#[derive(Debug, Clone, Default)]
pub struct MemoryDelivery {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next attempt with `message`
    pub async fn fail_next(&self, message: impl Into<String>) {
        self.inner.lock().await.failures.push_back(message.into());
    }

    pub async fn refuse_all(&self, refuse: bool) {
        self.inner.lock().await.refuse_all = refuse;
    }

    pub async fn accepted(&self) -> Vec<Manifest> {
        self.inner.lock().await.accepted.clone()
    }

    pub async fn attempts(&self) -> usize {
        self.inner.lock().await.attempts
    }
}

#[async_trait]
impl DeliveryChannel for MemoryDelivery {
    async fn start(&self, manifest: &Manifest) -> Result<DeliveryReceipt> {
        let mut inner = self.inner.lock().await;
        inner.attempts += 1;

        if inner.refuse_all {
            return Err(PipelineError::Forwarding("delivery channel refused".into()));
        }
        if let Some(message) = inner.failures.pop_front() {
            return Err(PipelineError::Forwarding(message));
        }

        inner.accepted.push(manifest.clone());
        Ok(DeliveryReceipt {
            execution_id: Some(format!("memory-{}", inner.accepted.len())),
        })
    }
}
