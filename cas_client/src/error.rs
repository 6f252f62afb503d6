use anyhow::anyhow;
use thiserror::Error;
use tokio::task::JoinError;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CasClientError {
    #[error("Configuration Error: {0} ")]
    ConfigurationError(String),

    #[error("Invalid Arguments: {0}")]
    InvalidArguments(String),

    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Object Store Error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("Other Internal Error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Error : {0}")]
    Other(String),
}

// Define our own result type here (this seems to be the standard).
pub type Result<T> = std::result::Result<T, CasClientError>;

impl CasClientError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        CasClientError::ObjectNotFound {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CasClientError::ObjectNotFound { .. })
    }
}

impl PartialEq for CasClientError {
    fn eq(&self, other: &CasClientError) -> bool {
        match (self, other) {
            (
                CasClientError::ObjectNotFound { bucket: b1, key: k1 },
                CasClientError::ObjectNotFound { bucket: b2, key: k2 },
            ) => b1 == b2 && k1 == k2,
            (e1, e2) => std::mem::discriminant(e1) == std::mem::discriminant(e2),
        }
    }
}

impl From<JoinError> for CasClientError {
    fn from(value: JoinError) -> Self {
        CasClientError::InternalError(anyhow!("{value:?}"))
    }
}
