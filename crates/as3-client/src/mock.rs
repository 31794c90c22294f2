//! Mock device client for unit testing
//!
//! Responses are scripted in order. When the script is exhausted every
//! posted tenant succeeds. Every post is recorded for later assertions.

use crate::error::DeviceError;
use crate::models::{As3Declaration, As3Info, PostResponse, TenantResult};
use crate::device_trait::DeviceClientTrait;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Scripted outcome for one post
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// The listed tenants fail with code 422, the rest succeed
    FailTenants(BTreeSet<String>),
    /// The device answers with exactly these results
    Results(Vec<TenantResult>),
    /// The post never reaches the device
    TransportError(String),
}

/// One recorded call to `post_declaration`
#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub tenants: Vec<String>,
    pub declaration: As3Declaration,
}

/// Mock device client for testing
#[derive(Clone)]
pub struct MockDeviceClient {
    base_url: String,
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    posts: Arc<Mutex<Vec<RecordedPost>>>,
}

impl MockDeviceClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            posts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue the outcome of the next unscripted post
    pub fn push_response(&self, response: MockResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Queue a post where the given tenants fail
    pub fn fail_next<I, S>(&self, tenants: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_response(MockResponse::FailTenants(
            tenants.into_iter().map(Into::into).collect(),
        ));
    }

    /// All posts received so far
    pub fn posts(&self) -> Vec<RecordedPost> {
        self.posts.lock().unwrap().clone()
    }

    fn success(tenant: &str) -> TenantResult {
        TenantResult {
            tenant: tenant.to_string(),
            code: 200,
            message: "success".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl DeviceClientTrait for MockDeviceClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn info(&self) -> Result<As3Info, DeviceError> {
        Ok(As3Info {
            version: "3.50.0".to_string(),
            schema_current: "3.50.0".to_string(),
        })
    }

    async fn post_declaration(
        &self,
        declaration: &As3Declaration,
        tenants: &[String],
    ) -> Result<PostResponse, DeviceError> {
        self.posts.lock().unwrap().push(RecordedPost {
            tenants: tenants.to_vec(),
            declaration: declaration.clone(),
        });

        let scripted = self.responses.lock().unwrap().pop_front();
        match scripted {
            None => Ok(PostResponse {
                results: tenants.iter().map(|t| Self::success(t)).collect(),
            }),
            Some(MockResponse::FailTenants(failed)) => Ok(PostResponse {
                results: tenants
                    .iter()
                    .map(|t| {
                        if failed.contains(t) {
                            TenantResult {
                                tenant: t.clone(),
                                code: 422,
                                message: "declaration failed".to_string(),
                            }
                        } else {
                            Self::success(t)
                        }
                    })
                    .collect(),
            }),
            Some(MockResponse::Results(results)) => Ok(PostResponse { results }),
            Some(MockResponse::TransportError(msg)) => Err(DeviceError::Api(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::As3Tenant;
    use std::collections::BTreeMap;

    fn declaration(tenants: &[&str]) -> As3Declaration {
        let tenants: BTreeMap<String, As3Tenant> = tenants
            .iter()
            .map(|t| (t.to_string(), As3Tenant::new()))
            .collect();
        As3Declaration::new(tenants, "test")
    }

    #[tokio::test]
    async fn test_scripted_then_default_success() {
        let client = MockDeviceClient::new("https://d1");
        client.fail_next(["b"]);
        let tenants = vec!["a".to_string(), "b".to_string()];

        let first = client.post_declaration(&declaration(&["a", "b"]), &tenants).await.unwrap();
        let codes: Vec<u16> = first.results.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![200, 422]);

        let second = client.post_declaration(&declaration(&["a", "b"]), &tenants).await.unwrap();
        assert!(second.results.iter().all(|r| r.code == 200));

        let posts = client.posts();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].tenants, tenants);
    }

    #[tokio::test]
    async fn test_transport_error() {
        let client = MockDeviceClient::new("https://d1");
        client.push_response(MockResponse::TransportError("connection reset".to_string()));

        let result = client.post_declaration(&declaration(&["a"]), &["a".to_string()]).await;
        assert!(matches!(result, Err(DeviceError::Api(_))));
        assert_eq!(client.posts().len(), 1);
    }
}
