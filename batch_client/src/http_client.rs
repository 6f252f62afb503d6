use std::sync::Arc;

use async_trait::async_trait;
use cas_types::DatasetSummary;
use reqwest::{header, Method, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tracing::debug;
use url::Url;

use crate::auth::CredentialHelper;
use crate::errors::{BatchClientError, Result};
use crate::interface::{BatchClient, HeartbeatOutput};

/// Talks to the batch platform REST API.
pub struct HttpBatchClient {
    endpoint: Url,
    user_agent: String,
    client: ClientWithMiddleware,
    cred_helper: Arc<dyn CredentialHelper>,
}

impl HttpBatchClient {
    pub fn new(endpoint: &str, user_agent: &str, cred_helper: Arc<dyn CredentialHelper>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if endpoint.cannot_be_a_base() {
            return Err(BatchClientError::Configuration(format!("{endpoint} cannot be used as an API endpoint")));
        }

        let reqwest_client = reqwest::Client::builder().build()?;

        Ok(Self {
            endpoint,
            user_agent: user_agent.to_owned(),
            client: ClientBuilder::new(reqwest_client).build(),
            cred_helper,
        })
    }

    fn dataset_url(&self, project_id: &str, dataset_id: &str, suffix: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BatchClientError::Configuration(format!("{} cannot be a base", self.endpoint)))?;
            segments
                .pop_if_empty()
                .extend(["projects", project_id, "datasets", dataset_id]);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }

    async fn send(&self, api: &'static str, method: Method, url: Url) -> Result<Response> {
        debug!("{api}: {method} {url}");

        let req = self
            .client
            .request(method, url)
            .header(header::USER_AGENT, &self.user_agent);
        let req = self
            .cred_helper
            .fill_credential(req)
            .await
            .map_err(BatchClientError::CredentialHelper)?;

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BatchClientError::Status { api, status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl BatchClient for HttpBatchClient {
    async fn send_upload_heartbeat(&self, project_id: &str, dataset_id: &str) -> Result<HeartbeatOutput> {
        let url = self.dataset_url(project_id, dataset_id, Some("heartbeat"))?;
        let response = self.send("upload-heartbeat", Method::POST, url).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_upload_success(&self, project_id: &str, dataset_id: &str) -> Result<()> {
        let url = self.dataset_url(project_id, dataset_id, Some("upload_success"))?;
        self.send("upload-success", Method::POST, url).await?;
        Ok(())
    }

    async fn describe_dataset(&self, project_id: &str, dataset_id: &str) -> Result<DatasetSummary> {
        let url = self.dataset_url(project_id, dataset_id, None)?;
        let response = self.send("describe-dataset", Method::GET, url).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{BearerCredentialHelper, NoopCredentialHelper};

    fn client(server: &MockServer) -> HttpBatchClient {
        HttpBatchClient::new(&server.uri(), "nerd-test", BearerCredentialHelper::new("secret".to_owned(), "test"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_heartbeat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/p-1/datasets/d-1/heartbeat"))
            .and(header("authorization", "Bearer secret"))
            .and(header("user-agent", "nerd-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "has_expired": true })))
            .expect(1)
            .mount(&server)
            .await;

        let out = client(&server).send_upload_heartbeat("p-1", "d-1").await.unwrap();
        assert!(out.has_expired);
    }

    #[tokio::test]
    async fn test_upload_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/projects/p-1/datasets/d-1/upload_success"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            HttpBatchClient::new(&format!("{}/api/", server.uri()), "nerd-test", NoopCredentialHelper::new()).unwrap();
        client.send_upload_success("p-1", "d-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_describe_dataset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/p-1/datasets/d-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "project_id": "p-1",
                "dataset_id": "d-1",
                "bucket": "nerd-data",
                "project_root": "projects/p-1",
                "dataset_root": "projects/p-1/datasets/d-1",
            })))
            .mount(&server)
            .await;

        let ds = client(&server).describe_dataset("p-1", "d-1").await.unwrap();
        assert_eq!(ds.bucket, "nerd-data");
        assert_eq!(ds.index_object_key(), "projects/p-1/datasets/d-1/index");
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = client(&server).send_upload_heartbeat("p-1", "d-1").await.unwrap_err();
        match err {
            BatchClientError::Status { api, status, body } => {
                assert_eq!(api, "upload-heartbeat");
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "unavailable");
            },
            e => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(HttpBatchClient::new("not a url", "nerd", NoopCredentialHelper::new()).is_err());
        assert!(HttpBatchClient::new("mailto:someone@example.com", "nerd", NoopCredentialHelper::new()).is_err());
    }
}
