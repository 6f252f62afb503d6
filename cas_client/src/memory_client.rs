use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{CasClientError, Result};
use crate::interface::ObjectClient;

/// In-memory client for testing purposes. Stores all objects in a hash table and counts calls.
#[derive(Default)]
pub struct MemoryClient {
    objects: RwLock<HashMap<(String, String), Bytes>>,
    num_exists_calls: AtomicU64,
    num_upload_calls: AtomicU64,
    num_download_calls: AtomicU64,
    /// API delay range in milliseconds as (min_ms, max_ms). (0, 0) means disabled.
    random_ms_delay_window: (AtomicU64, AtomicU64),
    /// Uploads to keys containing this pattern fail.
    fail_uploads_containing: Mutex<Option<String>>,
}

impl MemoryClient {
    /// Create a new in-memory client.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call sleeps for a random duration within the range before doing its work.
    pub fn set_api_delay_range(&self, delay_range: Option<Range<Duration>>) {
        match delay_range {
            Some(range) => {
                self.random_ms_delay_window
                    .0
                    .store(range.start.as_millis() as u64, Ordering::Relaxed);
                self.random_ms_delay_window
                    .1
                    .store(range.end.as_millis() as u64, Ordering::Relaxed);
            },
            None => {
                self.random_ms_delay_window.0.store(0, Ordering::Relaxed);
                self.random_ms_delay_window.1.store(0, Ordering::Relaxed);
            },
        }
    }

    pub fn fail_uploads_containing(&self, pattern: Option<&str>) {
        if let Ok(mut p) = self.fail_uploads_containing.lock() {
            *p = pattern.map(str::to_owned);
        }
    }

    pub fn num_exists_calls(&self) -> u64 {
        self.num_exists_calls.load(Ordering::Relaxed)
    }

    pub fn num_upload_calls(&self) -> u64 {
        self.num_upload_calls.load(Ordering::Relaxed)
    }

    pub fn num_download_calls(&self) -> u64 {
        self.num_download_calls.load(Ordering::Relaxed)
    }

    pub fn reset_counters(&self) {
        self.num_exists_calls.store(0, Ordering::Relaxed);
        self.num_upload_calls.store(0, Ordering::Relaxed);
        self.num_download_calls.store(0, Ordering::Relaxed);
    }

    pub async fn num_objects(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Keys of all objects in the bucket, sorted.
    pub async fn object_keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(&(bucket.to_owned(), key.to_owned())).cloned()
    }

    async fn apply_api_delay(&self) {
        let min_ms = self.random_ms_delay_window.0.load(Ordering::Relaxed);
        let max_ms = self.random_ms_delay_window.1.load(Ordering::Relaxed);

        if min_ms == 0 && max_ms == 0 {
            return;
        }

        let delay_ms = if min_ms >= max_ms {
            min_ms
        } else {
            rand::rng().random_range(min_ms..max_ms)
        };

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    fn should_fail_upload(&self, key: &str) -> bool {
        self.fail_uploads_containing
            .lock()
            .map(|p| p.as_deref().is_some_and(|p| key.contains(p)))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ObjectClient for MemoryClient {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        self.num_exists_calls.fetch_add(1, Ordering::Relaxed);
        self.apply_api_delay().await;

        Ok(self.objects.read().await.contains_key(&(bucket.to_owned(), key.to_owned())))
    }

    async fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        self.num_upload_calls.fetch_add(1, Ordering::Relaxed);
        self.apply_api_delay().await;

        if self.should_fail_upload(key) {
            return Err(CasClientError::InternalError(anyhow!("simulated upload failure for {bucket}/{key}")));
        }

        self.objects.write().await.insert((bucket.to_owned(), key.to_owned()), data);
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.num_download_calls.fetch_add(1, Ordering::Relaxed);
        self.apply_api_delay().await;

        match self.get(bucket, key).await {
            Some(data) => Ok(data),
            None => {
                info!("Unable to find {bucket}/{key} in memory store");
                Err(CasClientError::not_found(bucket, key))
            },
        }
    }
}
