//! Downstream delivery channel
//!
//! Starting the account-resolution workflow is asynchronous: acceptance only
//! means the workflow was started, not that it finished.

use async_trait::async_trait;

use crate::error::Result;
use crate::manifest::Manifest;

pub mod http;
pub mod memory;

pub use http::{HttpDelivery, HttpDeliveryConfig};
pub use memory::MemoryDelivery;

/// Confirmation that the downstream workflow was started
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeliveryReceipt {
    /// Execution handle reported by the channel, when it returns one
    pub execution_id: Option<String>,
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Start the workflow for `manifest`; `Ok` means confirmed acceptance
    async fn start(&self, manifest: &Manifest) -> Result<DeliveryReceipt>;
}
