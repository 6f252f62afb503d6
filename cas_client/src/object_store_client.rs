use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{DynObjectStore, PutPayload};
use tracing::debug;

use crate::error::{CasClientError, Result};
use crate::interface::ObjectClient;

/// Talks to S3 compatible storage through `object_store`.
///
/// A store is built once per bucket, with region and credentials taken from the usual `AWS_*`
/// environment variables, and re-used for every call against that bucket.
#[derive(Default)]
pub struct ObjectStoreClient {
    stores: Mutex<HashMap<String, Arc<DynObjectStore>>>,
}

impl ObjectStoreClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pre-built store for a bucket instead of building an S3 one on first use.
    pub fn with_store(self, bucket: &str, store: Arc<DynObjectStore>) -> Self {
        if let Ok(mut stores) = self.stores.lock() {
            stores.insert(bucket.to_owned(), store);
        }
        self
    }

    fn store(&self, bucket: &str) -> Result<Arc<DynObjectStore>> {
        let mut stores = self
            .stores
            .lock()
            .map_err(|e| CasClientError::InternalError(anyhow!("object store cache poisoned: {e}")))?;

        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }

        let store: Arc<DynObjectStore> = Arc::new(AmazonS3Builder::from_env().with_bucket_name(bucket).build()?);
        debug!("Built object store for bucket {bucket}");
        stores.insert(bucket.to_owned(), store.clone());
        Ok(store)
    }

    fn path(key: &str) -> Result<Path> {
        Path::parse(key).map_err(|e| CasClientError::InvalidArguments(format!("invalid object key {key:?}: {e}")))
    }
}

#[async_trait]
impl ObjectClient for ObjectStoreClient {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let store = self.store(bucket)?;
        match store.head(&Self::path(key)?).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let store = self.store(bucket)?;
        store.put(&Self::path(key)?, PutPayload::from(data)).await?;
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let store = self.store(bucket)?;
        match store.get(&Self::path(key)?).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => Err(CasClientError::not_found(bucket, key)),
            Err(e) => Err(e.into()),
        }
    }
}
