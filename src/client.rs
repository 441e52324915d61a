//! reqwest-backed implementation of [`ReadwiseApi`].
//!
//! One [`ReadwiseClient`] talks to one account: the token passed at
//! construction is sent as `Authorization: Token <token>` on every request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;

use crate::contract::{ApiResponse, ReadwiseApi, TransportError};

pub const DEFAULT_BASE_URL: &str = "https://readwise.io/api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ReadwiseClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ReadwiseClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let token = token.into();
        tracing::info!(
            base_url = %base_url,
            token_set = !token.is_empty(),
            "Initialized ReadwiseClient"
        );
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins an endpoint path onto the base URL without doubling slashes.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }

    async fn into_api_response(resp: reqwest::Response) -> Result<ApiResponse, TransportError> {
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await?;
        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }
}

#[async_trait]
impl ReadwiseApi for ReadwiseClient {
    async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<ApiResponse, TransportError> {
        let url = self.endpoint_url(path);
        tracing::debug!(url = %url, ?query, "GET");
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, self.auth_header())
            .query(query)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, url = %url, "GET request failed to complete");
                TransportError::from(e)
            })?;
        Self::into_api_response(resp).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.endpoint_url(path);
        tracing::debug!(url = %url, "POST");
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.auth_header())
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, url = %url, "POST request failed to complete");
                TransportError::from(e)
            })?;
        Self::into_api_response(resp).await
    }
}
