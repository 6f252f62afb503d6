use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CasTypesError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Malformed index: {0} bytes is not a whole number of keys")]
    MalformedIndex(usize),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),
}
