#![cfg_attr(feature = "strict", deny(warnings))]

mod auth;
mod errors;
mod http_client;
mod interface;
mod mock_client;

pub use auth::{BearerCredentialHelper, CredentialHelper, NoopCredentialHelper};
pub use errors::{BatchClientError, Result};
pub use http_client::HttpBatchClient;
pub use interface::{BatchClient, HeartbeatOutput, NoopBatchClient};
pub use mock_client::MockBatchClient;
