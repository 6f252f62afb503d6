use serde::{Deserialize, Serialize};

use crate::key::Key;

/// Name of the index object under the dataset root.
pub const INDEX_OBJECT_KEY: &str = "index";

/// Name of the metadata object under the dataset root.
pub const METADATA_OBJECT_KEY: &str = "metadata";

/// Where a dataset lives in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub project_id: String,
    pub dataset_id: String,
    pub bucket: String,
    pub project_root: String,
    pub dataset_root: String,
}

impl DatasetSummary {
    /// Object key of the chunk identified by `key`.
    pub fn chunk_object_key(&self, key: &Key) -> String {
        join_object_key(&self.project_root, &key.hex())
    }

    pub fn index_object_key(&self) -> String {
        join_object_key(&self.dataset_root, INDEX_OBJECT_KEY)
    }

    pub fn metadata_object_key(&self) -> String {
        join_object_key(&self.dataset_root, METADATA_OBJECT_KEY)
    }
}

/// Joins object key components with a single '/', ignoring empty roots.
pub fn join_object_key(root: &str, name: &str) -> String {
    let root = root.trim_matches('/');
    if root.is_empty() {
        name.to_owned()
    } else {
        format!("{root}/{name}")
    }
}
