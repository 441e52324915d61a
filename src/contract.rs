//! # contract: the seam between sync logic and the Readwise HTTP API
//!
//! This module defines a single trait ([`ReadwiseApi`]) plus the plain response
//! type the retry logic inspects. Fetching and uploading are written against
//! the trait only, so they can be driven by the real reqwest client
//! ([`crate::client::ReadwiseClient`]) or by a `mockall` mock in tests.
//!
//! ## Error model
//! - Every HTTP status comes back as an [`ApiResponse`]; deciding whether a
//!   status is retryable is the caller's job (see [`ResponseClass`]).
//! - Only transport failures (connect, timeout, body read) are `Err`.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall` so consumers can generate
//!   deterministic mocks in unit and integration tests.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Seconds to wait after a 429 that carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Raw response from one API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    /// Value of the `Retry-After` header, if the server sent one.
    pub retry_after: Option<String>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    pub fn class(&self) -> ResponseClass {
        ResponseClass::from_status(self.status)
    }

    /// How long the server asked us to back off, in whole seconds.
    ///
    /// Missing or unparseable values (including HTTP-date forms) give `default`.
    pub fn retry_after_or(&self, default: Duration) -> Duration {
        match self.retry_after.as_deref().map(str::trim).map(str::parse::<u64>) {
            Some(Ok(secs)) => Duration::from_secs(secs),
            _ => default,
        }
    }
}

/// How the sync logic reacts to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 200 or 201.
    Success,
    /// 429: always recoverable by waiting.
    RateLimited,
    /// 502: recoverable by a bounded number of retries.
    ServerError,
    /// Anything else.
    Permanent,
}

impl ResponseClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            200 | 201 => ResponseClass::Success,
            429 => ResponseClass::RateLimited,
            502 => ResponseClass::ServerError,
            _ => ResponseClass::Permanent,
        }
    }
}

/// Network-level failure: the request never produced an HTTP status.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError(e.to_string())
    }
}

/// Trait for talking to one Readwise account.
///
/// The implementor owns the base URL and the account token; callers only pass
/// endpoint paths such as `/v2/export/`.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ReadwiseApi: Send + Sync {
    /// Issue a GET against `path` with the given query pairs.
    async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<ApiResponse, TransportError>;

    /// POST `body` as JSON to `path`.
    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<ApiResponse, TransportError>;
}
