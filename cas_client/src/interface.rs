use bytes::Bytes;

use crate::error::Result;

/// A client to a bucketed object store.
///
/// Keys are '/' separated paths within a bucket. Uploading to an existing key replaces the
/// object, so writing identical bytes twice is harmless.
#[async_trait::async_trait]
pub trait ObjectClient: Send + Sync {
    /// Returns true if an object is stored under `key`.
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Stores `data` under `key`.
    async fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<()>;

    /// Fetches the object stored under `key`, failing with
    /// [`CasClientError::ObjectNotFound`](crate::CasClientError::ObjectNotFound) if there is none.
    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes>;
}
