//! Drains a cursor-paginated read endpoint into one ordered list of raw records.
//!
//! - 200: append the page's `results` and follow `nextPageCursor` until it is null.
//! - 429: wait out `Retry-After` and re-issue the same request. The cursor
//!   never advances on a rate limit, so no page is skipped or fetched twice.
//! - Anything else (other statuses, undecodable bodies, transport failures)
//!   ends the fetch early. Whatever was accumulated is returned with
//!   `complete = false`; the caller decides how loud to be about it.
//!
//! Every call owns its accumulator, so concurrent fetches do not interfere.

use serde_json::Value;
use tracing::{error, info, warn};

use crate::contract::{ReadwiseApi, ResponseClass};
use crate::model::Page;
use crate::retry::{wait_out, RetryPolicy};

pub const EXPORT_PATH: &str = "/v2/export/";
pub const READER_LIST_PATH: &str = "/v3/list/";
const CURSOR_PARAM: &str = "pageCursor";

/// Which endpoint to drain and with which fixed query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub label: &'static str,
    pub path: &'static str,
    pub extra_query: Vec<(String, String)>,
}

impl PageRequest {
    /// Highlights grouped by source document, optionally only those updated
    /// after an ISO-8601 timestamp.
    pub fn export(updated_after: Option<&str>) -> Self {
        let extra_query = updated_after
            .map(|ts| vec![("updatedAfter".to_string(), ts.to_string())])
            .unwrap_or_default();
        Self {
            label: "highlights",
            path: EXPORT_PATH,
            extra_query,
        }
    }

    /// Reader documents, including their full HTML.
    pub fn reader_list() -> Self {
        Self {
            label: "reader documents",
            path: READER_LIST_PATH,
            extra_query: vec![("withHtmlContent".to_string(), "true".to_string())],
        }
    }

    fn query(&self, cursor: Option<&str>) -> Vec<(String, String)> {
        let mut query = self.extra_query.clone();
        if let Some(cursor) = cursor {
            query.push((CURSOR_PARAM.to_string(), cursor.to_string()));
        }
        query
    }
}

/// Records accumulated by one [`fetch_all`] call.
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    pub records: Vec<Value>,
    pub pages: usize,
    pub rate_limited: usize,
    /// False when the fetch stopped before the server reported the last page.
    pub complete: bool,
}

pub async fn fetch_all<A>(api: &A, request: &PageRequest, policy: &RetryPolicy) -> Fetched
where
    A: ReadwiseApi + ?Sized,
{
    info!(source = request.label, path = request.path, "Fetching all pages");
    let mut fetched = Fetched::default();
    let mut cursor: Option<String> = None;

    loop {
        let query = request.query(cursor.as_deref());
        let resp = match api.get(request.path, &query).await {
            Ok(resp) => resp,
            Err(e) => {
                error!(source = request.label, error = %e, pages = fetched.pages, "Fetch aborted by transport error");
                return fetched;
            }
        };

        match resp.class() {
            ResponseClass::Success => {
                let page: Page = match serde_json::from_str(&resp.body) {
                    Ok(page) => page,
                    Err(e) => {
                        error!(source = request.label, error = %e, status = resp.status, "Could not decode page body");
                        return fetched;
                    }
                };
                fetched.pages += 1;
                fetched.records.extend(page.results);
                info!(
                    source = request.label,
                    pages = fetched.pages,
                    records = fetched.records.len(),
                    "Page fetched"
                );
                match page.next_page_cursor {
                    Some(next) if !next.is_empty() => cursor = Some(next),
                    _ => {
                        fetched.complete = true;
                        info!(source = request.label, records = fetched.records.len(), "All pages fetched");
                        return fetched;
                    }
                }
            }
            ResponseClass::RateLimited => {
                fetched.rate_limited += 1;
                warn!(source = request.label, pages = fetched.pages, "Fetch rate limited");
                wait_out(request.label, policy.rate_limit_wait(&resp)).await;
            }
            ResponseClass::ServerError | ResponseClass::Permanent => {
                error!(
                    source = request.label,
                    status = resp.status,
                    body = %resp.body,
                    pages = fetched.pages,
                    "Error retrieving page, keeping partial results"
                );
                return fetched;
            }
        }
    }
}
