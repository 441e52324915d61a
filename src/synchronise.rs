//! High-level pipeline: orchestrates fetch → cache → transform → upload.
//!
//! The run is strictly sequential:
//!   1. highlights export: read from the cache file, or fetch and write the cache
//!   2. Reader documents: same, with the second cache file
//!   3. transform every highlight and send them as one batch
//!   4. transform and save every Reader document, one request each
//!
//! # Error Handling
//! Remote failures never abort the run; they are logged and recorded in the
//! [`SyncReport`], and [`SyncReport::is_complete`] tells the caller whether
//! anything was lost. Only local problems (unreadable or unwritable cache
//! files, no source client in fetch mode) return a [`SyncError`].

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::cache::{self, CacheError, CachePaths};
use crate::contract::ReadwiseApi;
use crate::fetch::{fetch_all, PageRequest};
use crate::model::ExportedBook;
use crate::retry::RetryPolicy;
use crate::transform::highlights_payloads;
use crate::upload::{upload_documents, upload_highlights, DocumentUploadReport};

/// Everything one run needs besides the two API clients.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Upload from the cache files instead of fetching from the source account.
    pub upload_from_file: bool,
    pub cache: CachePaths,
    /// Only export highlights updated after this ISO-8601 timestamp.
    pub updated_after: Option<String>,
    pub retry: RetryPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("a source account client is required unless uploading from cache files")]
    MissingSourceClient,
}

/// Where one record list came from and whether it is whole.
#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub records: usize,
    pub pages: usize,
    pub from_cache: bool,
    pub complete: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HighlightUploadReport {
    pub books: usize,
    /// Export records that could not be decoded; their highlights are lost.
    pub undecodable_books: usize,
    pub highlights: usize,
    pub error: Option<String>,
}

impl HighlightUploadReport {
    pub fn is_complete(&self) -> bool {
        self.undecodable_books == 0 && self.error.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub highlights_source: SourceReport,
    pub documents_source: SourceReport,
    pub highlights: HighlightUploadReport,
    pub documents: DocumentUploadReport,
}

impl SyncReport {
    /// True when nothing was dropped anywhere along the way.
    pub fn is_complete(&self) -> bool {
        self.highlights_source.complete
            && self.documents_source.complete
            && self.highlights.is_complete()
            && self.documents.is_complete()
    }
}

pub async fn synchronise(
    config: &SyncConfig,
    source: Option<&dyn ReadwiseApi>,
    target: &dyn ReadwiseApi,
) -> Result<SyncReport, SyncError> {
    info!(
        upload_from_file = config.upload_from_file,
        "[SYNC] Starting migration"
    );

    let export_request = PageRequest::export(config.updated_after.as_deref());
    let (highlight_records, highlights_source) = obtain_records(
        config,
        source,
        &export_request,
        &config.cache.highlights,
    )
    .await?;
    let (document_records, documents_source) = obtain_records(
        config,
        source,
        &PageRequest::reader_list(),
        &config.cache.documents,
    )
    .await?;

    info!(records = highlight_records.len(), "[SYNC] Uploading highlights");
    let highlights = sync_highlights(target, &highlight_records, &config.retry).await;

    info!(records = document_records.len(), "[SYNC] Uploading reader documents");
    let documents = upload_documents(target, &document_records, &config.retry).await;

    let report = SyncReport {
        highlights_source,
        documents_source,
        highlights,
        documents,
    };
    if report.is_complete() {
        info!("[SYNC] Migration complete");
    } else {
        warn!(?report, "[SYNC] Migration finished with losses");
    }
    Ok(report)
}

async fn obtain_records(
    config: &SyncConfig,
    source: Option<&dyn ReadwiseApi>,
    request: &PageRequest,
    cache_path: &std::path::Path,
) -> Result<(Vec<Value>, SourceReport), SyncError> {
    if config.upload_from_file {
        info!(source = request.label, path = %cache_path.display(), "[SYNC] Loading from cache file");
        let records = cache::read_records(cache_path)?;
        let report = SourceReport {
            records: records.len(),
            pages: 0,
            from_cache: true,
            complete: true,
        };
        return Ok((records, report));
    }

    let api = source.ok_or(SyncError::MissingSourceClient)?;
    let fetched = fetch_all(api, request, &config.retry).await;
    if !fetched.complete {
        warn!(
            source = request.label,
            records = fetched.records.len(),
            "[SYNC] Fetch stopped early, continuing with partial data"
        );
    }
    cache::write_records(cache_path, &fetched.records)?;

    let report = SourceReport {
        records: fetched.records.len(),
        pages: fetched.pages,
        from_cache: false,
        complete: fetched.complete,
    };
    Ok((fetched.records, report))
}

async fn sync_highlights(
    target: &dyn ReadwiseApi,
    records: &[Value],
    policy: &RetryPolicy,
) -> HighlightUploadReport {
    let mut report = HighlightUploadReport {
        books: records.len(),
        ..Default::default()
    };

    let mut books = Vec::with_capacity(records.len());
    for (index, raw) in records.iter().enumerate() {
        match serde_json::from_value::<ExportedBook>(raw.clone()) {
            Ok(book) => books.push(book),
            Err(e) => {
                report.undecodable_books += 1;
                error!(index, error = %e, "[SYNC] Could not decode exported book, skipping");
            }
        }
    }

    let payloads = highlights_payloads(&books, Utc::now());
    report.highlights = payloads.len();
    if let Err(e) = upload_highlights(target, &payloads, policy).await {
        error!(error = %e, "[SYNC] Highlight batch upload failed");
        report.error = Some(e.to_string());
    }
    report
}
