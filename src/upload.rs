//! # Uploading into the target account
//!
//! Two modes share one retry skeleton:
//!
//! - **Batch** ([`upload_highlights`]): every highlight goes out in a single
//!   `POST /v2/highlights/`. A 429 waits and resends the whole batch; any other
//!   failure fails the batch.
//! - **Per item** ([`upload_documents`]): one `POST /v3/save/` per Reader
//!   document. A 429 waits and retries once, a 502 retries a bounded number of
//!   times with a fixed backoff. A document that still fails is recorded in the
//!   report and the loop moves on: one bad item never stops the rest.
//!
//! Decode and transform failures are handled the same way as upload failures
//! in per-item mode: logged, recorded, skipped.

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::contract::{ApiResponse, ReadwiseApi, ResponseClass, TransportError};
use crate::retry::{wait_out, RetryPolicy};
use crate::transform::{document_payload_from_value, HighlightPayload};

pub const HIGHLIGHTS_PATH: &str = "/v2/highlights/";
pub const SAVE_PATH: &str = "/v3/save/";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("gave up after {0} rate-limited attempts")]
    RateLimitExhausted(u32),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("could not serialise payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sends all highlights as one batch and returns the parsed response body.
///
/// An empty batch is not sent and yields `Value::Null`.
pub async fn upload_highlights<A>(
    api: &A,
    highlights: &[HighlightPayload],
    policy: &RetryPolicy,
) -> Result<Value, UploadError>
where
    A: ReadwiseApi + ?Sized,
{
    if highlights.is_empty() {
        info!("No highlights to upload");
        return Ok(Value::Null);
    }
    info!(count = highlights.len(), "Uploading highlights");
    let body = json!({ "highlights": highlights });

    let mut rate_limited: u32 = 0;
    loop {
        let resp = api.post_json(HIGHLIGHTS_PATH, &body).await.map_err(|e| {
            error!(error = %e, "Highlight upload request failed");
            e
        })?;

        match resp.class() {
            ResponseClass::Success => {
                info!(
                    count = highlights.len(),
                    attempts = rate_limited + 1,
                    "Successfully uploaded highlights"
                );
                return Ok(serde_json::from_str(&resp.body).unwrap_or_else(|e| {
                    warn!(error = %e, "Highlight upload response is not JSON, ignoring body");
                    Value::Null
                }));
            }
            ResponseClass::RateLimited => {
                if let Some(max) = policy.max_batch_rate_limit_retries {
                    if rate_limited >= max {
                        error!(retries = rate_limited, "Highlight upload still rate limited, giving up");
                        return Err(UploadError::RateLimitExhausted(rate_limited + 1));
                    }
                }
                rate_limited += 1;
                warn!(attempt = rate_limited, "Highlight upload rate limited, resending whole batch");
                wait_out("highlight upload", policy.rate_limit_wait(&resp)).await;
            }
            ResponseClass::ServerError | ResponseClass::Permanent => {
                error!(status = resp.status, body = %resp.body, "Highlight upload failed");
                return Err(UploadError::Rejected {
                    status: resp.status,
                    body: resp.body,
                });
            }
        }
    }
}

/// One document that did not make it into the target account.
#[derive(Debug, Clone)]
pub struct FailedDocument {
    /// Position in the fetched record list.
    pub index: usize,
    pub title: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentUploadReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// Records with a `parent_id`, which are not documents.
    pub skipped_children: usize,
    pub failed: Vec<FailedDocument>,
}

impl DocumentUploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Uploads Reader documents one by one, in fetch order.
pub async fn upload_documents<A>(
    api: &A,
    records: &[Value],
    policy: &RetryPolicy,
) -> DocumentUploadReport
where
    A: ReadwiseApi + ?Sized,
{
    info!(records = records.len(), "Uploading reader documents");
    let mut report = DocumentUploadReport::default();

    for (index, raw) in records.iter().enumerate() {
        let title = raw
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);

        let payload = match document_payload_from_value(raw) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                report.skipped_children += 1;
                continue;
            }
            Err(e) => {
                error!(index, title = ?title, error = %e, "Could not transform document, skipping");
                report.failed.push(FailedDocument {
                    index,
                    title,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        report.attempted += 1;
        let outcome = match serde_json::to_value(&payload) {
            Ok(body) => save_document(api, &body, policy).await,
            Err(e) => Err(UploadError::from(e)),
        };
        match outcome {
            Ok(status) => {
                report.succeeded += 1;
                debug!(index, title = ?title, status, "Document saved");
            }
            Err(e) => {
                error!(index, title = ?title, error = %e, "Document upload failed, continuing");
                report.failed.push(FailedDocument {
                    index,
                    title,
                    reason: e.to_string(),
                });
            }
        }

        if report.attempted % 50 == 0 {
            info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failed.len(),
                "Reader upload progress"
            );
        }
    }

    info!(
        attempted = report.attempted,
        succeeded = report.succeeded,
        skipped_children = report.skipped_children,
        failed = report.failed.len(),
        "Reader document upload finished"
    );
    report
}

/// Saves a single document, applying the per-item retry ladder.
/// Returns the final success status.
async fn save_document<A>(api: &A, body: &Value, policy: &RetryPolicy) -> Result<u16, UploadError>
where
    A: ReadwiseApi + ?Sized,
{
    let mut resp = api.post_json(SAVE_PATH, body).await?;

    if resp.class() == ResponseClass::RateLimited {
        warn!("Document upload rate limited, retrying once");
        wait_out("document upload", policy.rate_limit_wait(&resp)).await;
        resp = api.post_json(SAVE_PATH, body).await?;
    }

    if resp.class() == ResponseClass::ServerError {
        resp = retry_server_error(api, body, policy, resp).await?;
    }

    match resp.class() {
        ResponseClass::Success => Ok(resp.status),
        _ => Err(UploadError::Rejected {
            status: resp.status,
            body: resp.body,
        }),
    }
}

async fn retry_server_error<A>(
    api: &A,
    body: &Value,
    policy: &RetryPolicy,
    mut resp: ApiResponse,
) -> Result<ApiResponse, TransportError>
where
    A: ReadwiseApi + ?Sized,
{
    for attempt in 1..=policy.server_error_retries {
        warn!(attempt, status = resp.status, "Server error on document upload, backing off");
        wait_out("document upload server error", policy.server_error_backoff).await;
        resp = api.post_json(SAVE_PATH, body).await?;
        if resp.class() == ResponseClass::Success {
            break;
        }
    }
    Ok(resp)
}
