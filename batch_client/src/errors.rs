use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BatchClientError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Credential helper error: {0}")]
    CredentialHelper(anyhow::Error),

    #[error("Request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Request middleware error: {0}")]
    ReqwestMiddleware(#[from] reqwest_middleware::Error),

    #[error("{api} returned status {status}: {body}")]
    Status {
        api: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Invalid response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BatchClientError>;
