use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqwest_middleware::RequestBuilder;

/// Fills credentials into outgoing control plane requests.
#[async_trait]
pub trait CredentialHelper: Send + Sync {
    async fn fill_credential(&self, req: RequestBuilder) -> Result<RequestBuilder>;

    // Used in tests to identify the source of the credential.
    fn whoami(&self) -> &str;
}

pub struct NoopCredentialHelper {}

impl NoopCredentialHelper {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {})
    }
}

#[async_trait]
impl CredentialHelper for NoopCredentialHelper {
    async fn fill_credential(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        Ok(req)
    }

    fn whoami(&self) -> &str {
        "noop"
    }
}

pub struct BearerCredentialHelper {
    token: String,

    whoami: &'static str,
}

impl BearerCredentialHelper {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(token: String, whoami: &'static str) -> Arc<Self> {
        Arc::new(Self { token, whoami })
    }
}

#[async_trait]
impl CredentialHelper for BearerCredentialHelper {
    async fn fill_credential(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        Ok(req.bearer_auth(&self.token))
    }

    fn whoami(&self) -> &str {
        self.whoami
    }
}
