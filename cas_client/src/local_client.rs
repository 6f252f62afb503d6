use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{CasClientError, Result};
use crate::interface::ObjectClient;

/// LocalClient stores objects as files under `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalClient {
    root: PathBuf,
}

impl LocalClient {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Internal function to get the path for a given object, rejecting keys that would escape the root.
    fn get_path_for_entry(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let rel = Path::new(part.trim_start_matches('/'));
            if part.is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
                return Err(CasClientError::InvalidArguments(format!("invalid object path {bucket}/{key}")));
            }
            path.push(rel);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectClient for LocalClient {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let file_path = self.get_path_for_entry(bucket, key)?;

        match tokio::fs::metadata(&file_path).await {
            Ok(m) if m.is_file() => Ok(true),
            Ok(_) => Err(CasClientError::InternalError(anyhow!("{file_path:?} exists but it is not a file"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let file_path = self.get_path_for_entry(bucket, key)?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let dir = file_path
                .parent()
                .ok_or_else(|| CasClientError::InvalidArguments(format!("{file_path:?} has no parent")))?;
            std::fs::create_dir_all(dir)?;

            // Write to a temporary file next to the destination so readers never observe a
            // partially written object.
            let mut tempfile = tempfile::Builder::new()
                .prefix(&format!("{}.", std::process::id()))
                .suffix(".tmp")
                .tempfile_in(dir)
                .map_err(|e| {
                    CasClientError::InternalError(anyhow!("Unable to create temporary file for staging objects, got {e:?}"))
                })?;

            tempfile.write_all(&data)?;
            tempfile.flush()?;
            tempfile.persist(&file_path).map_err(|e| e.error)?;

            debug!("{file_path:?} successfully written with {} bytes.", data.len());
            Ok(())
        })
        .await?
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let file_path = self.get_path_for_entry(bucket, key)?;

        match tokio::fs::read(&file_path).await {
            Ok(data) => Ok(data.into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Unable to find {bucket}/{key} in local store at {file_path:?}");
                Err(CasClientError::not_found(bucket, key))
            },
            Err(e) => Err(e.into()),
        }
    }
}
