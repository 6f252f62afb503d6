use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CasTypesError;

/// The per-dataset metadata object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Total number of bytes in the archived stream.
    pub size: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Metadata {
    /// Metadata for a dataset of `size` bytes created right now.
    pub fn new(size: i64) -> Self {
        let now = Utc::now();
        Self {
            size,
            created: now,
            updated: now,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, CasTypesError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, CasTypesError> {
        Ok(serde_json::from_slice(data)?)
    }
}
