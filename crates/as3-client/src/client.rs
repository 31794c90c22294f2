//! AS3 REST client
//!
//! Posts declarations to `/mgmt/shared/appsvcs/declare/<tenants>` using
//! basic authentication.

use crate::error::DeviceError;
use crate::models::{As3Declaration, As3Info, PostResponse};
use crate::device_trait::DeviceClientTrait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

const DECLARE_PATH: &str = "/mgmt/shared/appsvcs/declare";
const INFO_PATH: &str = "/mgmt/shared/appsvcs/info";

/// AS3 REST client
pub struct As3Client {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl As3Client {
    /// Create a new AS3 client
    ///
    /// # Arguments
    /// * `base_url` - device management URL (e.g., "https://10.1.1.4")
    /// * `username` / `password` - basic-auth credentials
    /// * `insecure` - accept self-signed device certificates
    pub fn new(
        base_url: String,
        username: String,
        password: String,
        insecure: bool,
    ) -> Result<Self, DeviceError> {
        // Declarations for many tenants can take minutes to apply
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .danger_accept_invalid_certs(insecure)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
        })
    }

    fn declare_url(&self, tenants: &[String]) -> String {
        let path = tenants
            .iter()
            .map(|t| urlencoding::encode(t).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}{}/{}", self.base_url, DECLARE_PATH, path)
    }
}

/// Map an HTTP status and body onto a post result.
///
/// AS3 reports per-tenant codes in the body for both success (200) and
/// partial failure (207/422), so a parsable body wins over the HTTP status.
pub(crate) fn parse_post_response(status: StatusCode, body: &str) -> Result<PostResponse, DeviceError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(DeviceError::Authentication(format!("device returned {}", status)));
    }

    match serde_json::from_str::<PostResponse>(body) {
        Ok(resp) if !resp.results.is_empty() => Ok(resp),
        Ok(_) if status.is_success() => Ok(PostResponse::default()),
        _ => Err(DeviceError::Api(format!(
            "{} - {}",
            status,
            body.chars().take(500).collect::<String>()
        ))),
    }
}

#[async_trait::async_trait]
impl DeviceClientTrait for As3Client {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn info(&self) -> Result<As3Info, DeviceError> {
        let url = format!("{}{}", self.base_url, INFO_PATH);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DeviceError::Authentication(format!("device returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeviceError::Api(format!("{} - {}", status, body)));
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn post_declaration(
        &self,
        declaration: &As3Declaration,
        tenants: &[String],
    ) -> Result<PostResponse, DeviceError> {
        if tenants.is_empty() {
            return Err(DeviceError::InvalidRequest("no tenants to post".to_string()));
        }

        let url = self.declare_url(tenants);
        debug!("POST {}", url);

        let response = self.client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .json(declaration)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_post_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_url_joins_tenants_in_order() {
        let client = As3Client::new(
            "https://10.1.1.4/".to_string(),
            "admin".to_string(),
            "admin".to_string(),
            true,
        )
        .unwrap();
        let url = client.declare_url(&["b".to_string(), "a".to_string()]);
        assert_eq!(url, "https://10.1.1.4/mgmt/shared/appsvcs/declare/b,a");
    }

    #[test]
    fn test_parse_partial_failure_body() {
        let body = r#"{"results":[{"code":200,"tenant":"a"},{"code":422,"message":"bad","tenant":"b"}]}"#;
        let resp = parse_post_response(StatusCode::UNPROCESSABLE_ENTITY, body).unwrap();
        assert_eq!(resp.results.len(), 2);
        assert_eq!(resp.results[1].message, "bad");
    }

    #[test]
    fn test_parse_unauthorized() {
        let err = parse_post_response(StatusCode::UNAUTHORIZED, "").unwrap_err();
        assert!(matches!(err, DeviceError::Authentication(_)));
    }

    #[test]
    fn test_parse_busy_device() {
        let err = parse_post_response(StatusCode::SERVICE_UNAVAILABLE, "busy").unwrap_err();
        assert!(matches!(err, DeviceError::Api(_)));
    }
}
