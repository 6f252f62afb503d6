use async_trait::async_trait;
use cas_types::DatasetSummary;
use serde::{Deserialize, Serialize};

use crate::errors::{BatchClientError, Result};

/// Control plane answer to an upload heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatOutput {
    /// The server gave up on this upload; it must not be completed.
    pub has_expired: bool,
}

/// The part of the batch platform API used while transferring datasets.
#[async_trait]
pub trait BatchClient: Send + Sync {
    /// Tells the control plane the upload of a dataset is still in progress.
    async fn send_upload_heartbeat(&self, project_id: &str, dataset_id: &str) -> Result<HeartbeatOutput>;

    /// Marks the dataset as completely uploaded.
    async fn send_upload_success(&self, project_id: &str, dataset_id: &str) -> Result<()>;

    /// Looks up where a dataset is stored.
    async fn describe_dataset(&self, project_id: &str, dataset_id: &str) -> Result<DatasetSummary>;
}

/// Used when no control plane is configured: heartbeats never expire and success is not reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBatchClient;

#[async_trait]
impl BatchClient for NoopBatchClient {
    async fn send_upload_heartbeat(&self, _project_id: &str, _dataset_id: &str) -> Result<HeartbeatOutput> {
        Ok(HeartbeatOutput { has_expired: false })
    }

    async fn send_upload_success(&self, _project_id: &str, _dataset_id: &str) -> Result<()> {
        Ok(())
    }

    async fn describe_dataset(&self, project_id: &str, dataset_id: &str) -> Result<DatasetSummary> {
        Err(BatchClientError::Configuration(format!(
            "no control plane configured to describe dataset {project_id}/{dataset_id}"
        )))
    }
}
