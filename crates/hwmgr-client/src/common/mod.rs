//! Common utilities for the hardware manager API client
//!
//! Provides the authenticated request helpers shared by all API operations.

use crate::error::HwMgrError;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Error envelope returned by the hardware manager on failure
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// HTTP client wrapper with bearer authentication
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, HwMgrError> {
        let url = self.build_url(path);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;

        let response = check_status("GET", path, response).await?;
        let text = response.text().await?;
        decode(&text)
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, HwMgrError> {
        let url = self.build_url(path);
        debug!("POST {} with body: {}", url, body);

        let response = self.client
            .post(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let response = check_status("POST", path, response).await?;
        let text = response.text().await?;
        decode(&text)
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), HwMgrError> {
        let url = self.build_url(path);
        debug!("DELETE {}", url);

        let response = self.client
            .delete(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;

        check_status("DELETE", path, response).await?;
        Ok(())
    }
}

/// Map a non-success response onto the error taxonomy
async fn check_status(method: &str, path: &str, response: Response) -> Result<Response, HwMgrError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or(body);

    Err(status_error(method, path, status, &detail))
}

/// Build the error for a failed request from its status code
pub fn status_error(method: &str, path: &str, status: StatusCode, detail: &str) -> HwMgrError {
    let msg = format!("{} {} failed: {} - {}", method, path, status, detail);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HwMgrError::Authentication(msg),
        StatusCode::NOT_FOUND => HwMgrError::NotFound(msg),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => HwMgrError::InvalidRequest(msg),
        StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => HwMgrError::Unavailable(msg),
        _ => HwMgrError::Api(msg),
    }
}

/// Decode a response body, keeping a prefix of the body in the error
fn decode<T: DeserializeOwned>(text: &str) -> Result<T, HwMgrError> {
    serde_json::from_str(text).map_err(|e| {
        HwMgrError::Api(format!(
            "error decoding response body: {} - Response (first 500 chars): {}",
            e,
            text.chars().take(500).collect::<String>()
        ))
    })
}

/// Encode a single path segment
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
