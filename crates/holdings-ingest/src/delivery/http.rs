//! HTTP start-workflow channel
//!
//! The request body has the shape of a workflow `StartExecution` call
//! (`stateMachineArn` plus a JSON-encoded `input`), but it is sent as a plain
//! unsigned POST. `endpoint` must therefore be a gateway or proxy that
//! authenticates and starts the workflow, not the AWS API itself.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use super::{DeliveryChannel, DeliveryReceipt};
use crate::error::{PipelineError, Result};
use crate::manifest::Manifest;

/// Default request timeout in seconds
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct HttpDeliveryConfig {
    pub endpoint: String,
    /// Identifier of the workflow to start (state machine ARN)
    pub workflow_id: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartExecutionRequest<'a> {
    state_machine_arn: &'a str,
    input: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartExecutionResponse {
    #[serde(default)]
    execution_arn: Option<String>,
}

pub struct HttpDelivery {
    client: Client,
    config: HttpDeliveryConfig,
}

impl HttpDelivery {
    pub fn new(config: HttpDeliveryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl DeliveryChannel for HttpDelivery {
    #[instrument(skip(self, manifest), fields(correlation_id = %manifest.correlation_id))]
    async fn start(&self, manifest: &Manifest) -> Result<DeliveryReceipt> {
        let request = StartExecutionRequest {
            state_machine_arn: &self.config.workflow_id,
            input: manifest.to_json()?,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Forwarding(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Forwarding(format!(
                "workflow start returned {}: {}",
                status, body
            )));
        }

        // An empty or non-JSON body still counts as acceptance
        let body = response.text().await.unwrap_or_default();
        let parsed: StartExecutionResponse = serde_json::from_str(&body).unwrap_or_default();
        debug!("Workflow started: {:?}", parsed.execution_arn);

        Ok(DeliveryReceipt {
            execution_id: parsed.execution_arn,
        })
    }
}
