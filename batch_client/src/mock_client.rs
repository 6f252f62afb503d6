use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cas_types::DatasetSummary;

use crate::errors::{BatchClientError, Result};
use crate::interface::{BatchClient, HeartbeatOutput};

/// In-memory control plane for tests.
///
/// Heartbeats succeed with `has_expired == false` until [`MockBatchClient::expire_after`] heartbeats
/// have been received; from then on every heartbeat reports the upload as expired.
#[derive(Default)]
pub struct MockBatchClient {
    expire_after: Mutex<Option<u64>>,
    heartbeats_failing: AtomicBool,
    upload_success_failing: AtomicBool,
    num_heartbeats: AtomicU64,
    num_upload_successes: AtomicU64,
    datasets: Mutex<HashMap<(String, String), DatasetSummary>>,
}

impl MockBatchClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn expire_after(&self, heartbeats: Option<u64>) {
        if let Ok(mut e) = self.expire_after.lock() {
            *e = heartbeats;
        }
    }

    /// Heartbeats fail at the transport level instead of answering.
    pub fn set_heartbeats_failing(&self, failing: bool) {
        self.heartbeats_failing.store(failing, Ordering::Relaxed);
    }

    pub fn set_upload_success_failing(&self, failing: bool) {
        self.upload_success_failing.store(failing, Ordering::Relaxed);
    }

    pub fn add_dataset(&self, summary: DatasetSummary) {
        if let Ok(mut datasets) = self.datasets.lock() {
            datasets.insert((summary.project_id.clone(), summary.dataset_id.clone()), summary);
        }
    }

    pub fn num_heartbeats(&self) -> u64 {
        self.num_heartbeats.load(Ordering::Relaxed)
    }

    pub fn num_upload_successes(&self) -> u64 {
        self.num_upload_successes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BatchClient for MockBatchClient {
    async fn send_upload_heartbeat(&self, project_id: &str, dataset_id: &str) -> Result<HeartbeatOutput> {
        let n = self.num_heartbeats.fetch_add(1, Ordering::Relaxed) + 1;

        if self.heartbeats_failing.load(Ordering::Relaxed) {
            return Err(BatchClientError::Other(format!("heartbeat for {project_id}/{dataset_id} failed")));
        }

        let expire_after = self.expire_after.lock().ok().and_then(|e| *e);
        Ok(HeartbeatOutput {
            has_expired: expire_after.is_some_and(|limit| n > limit),
        })
    }

    async fn send_upload_success(&self, project_id: &str, dataset_id: &str) -> Result<()> {
        if self.upload_success_failing.load(Ordering::Relaxed) {
            return Err(BatchClientError::Other(format!("upload success for {project_id}/{dataset_id} failed")));
        }
        self.num_upload_successes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn describe_dataset(&self, project_id: &str, dataset_id: &str) -> Result<DatasetSummary> {
        self.datasets
            .lock()
            .ok()
            .and_then(|d| d.get(&(project_id.to_owned(), dataset_id.to_owned())).cloned())
            .ok_or_else(|| BatchClientError::Other(format!("dataset {project_id}/{dataset_id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expiry_script() {
        let client = MockBatchClient::new();
        client.expire_after(Some(2));

        assert!(!client.send_upload_heartbeat("p", "d").await.unwrap().has_expired);
        assert!(!client.send_upload_heartbeat("p", "d").await.unwrap().has_expired);
        assert!(client.send_upload_heartbeat("p", "d").await.unwrap().has_expired);
        assert_eq!(client.num_heartbeats(), 3);

        client.set_heartbeats_failing(true);
        assert!(client.send_upload_heartbeat("p", "d").await.is_err());
    }

    #[tokio::test]
    async fn test_datasets() {
        let client = MockBatchClient::new();
        assert!(client.describe_dataset("p", "d").await.is_err());

        let summary = DatasetSummary {
            project_id: "p".to_owned(),
            dataset_id: "d".to_owned(),
            bucket: "b".to_owned(),
            project_root: "projects/p".to_owned(),
            dataset_root: "projects/p/datasets/d".to_owned(),
        };
        client.add_dataset(summary.clone());
        assert_eq!(client.describe_dataset("p", "d").await.unwrap(), summary);

        client.send_upload_success("p", "d").await.unwrap();
        assert_eq!(client.num_upload_successes(), 1);
    }
}
