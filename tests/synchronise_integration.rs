use std::sync::{Arc, Mutex};

use readwise_migrate_core::cache::{self, CachePaths};
use readwise_migrate_core::contract::{ApiResponse, MockReadwiseApi};
use readwise_migrate_core::fetch::{EXPORT_PATH, READER_LIST_PATH};
use readwise_migrate_core::synchronise::{synchronise, SyncConfig, SyncError};
use readwise_migrate_core::upload::{HIGHLIGHTS_PATH, SAVE_PATH};
use serde_json::{json, Value};
use tempfile::tempdir;

fn page(results: Value, cursor: Option<&str>) -> ApiResponse {
    ApiResponse::new(
        200,
        json!({ "results": results, "nextPageCursor": cursor }).to_string(),
    )
}

fn has_cursor(query: &[(String, String)]) -> bool {
    query.iter().any(|(k, _)| k == "pageCursor")
}

fn export_page_one() -> Value {
    json!([{
        "title": "Deep Work",
        "author": "Cal Newport",
        "cover_image_url": "",
        "source_url": "https://example.com/deep-work",
        "category": "books",
        "unique_url": null,
        "highlights": [
            {"text": "Clarity about what matters", "note": "", "location": 10, "location_type": "page", "highlighted_at": "2022-02-02T12:00:00Z"},
            {"text": "Depth is rare", "note": "good", "location": 20, "location_type": "page", "highlighted_at": null}
        ]
    }])
}

fn export_page_two() -> Value {
    json!([{ "title": "Empty Book", "highlights": [] }])
}

fn reader_page() -> Value {
    json!([
        {"id": "d1", "title": "An article", "url": "https://example.com/a", "published_date": 1700000000000u64, "tags": {"t1": {"name": "rust"}}, "html_content": "<p>hi</p>", "parent_id": null},
        {"id": "h1", "title": "A reader highlight", "parent_id": "d1"}
    ])
}

/// Source account: a two-page export and a one-page reader list.
fn source_account() -> MockReadwiseApi {
    let mut source = MockReadwiseApi::new();
    source
        .expect_get()
        .withf(|path, _| path == EXPORT_PATH)
        .times(2)
        .returning(|_, query| {
            if has_cursor(query) {
                Ok(page(export_page_two(), None))
            } else {
                Ok(page(export_page_one(), Some("page-2")))
            }
        });
    source
        .expect_get()
        .withf(|path, _| path == READER_LIST_PATH)
        .times(1)
        .returning(|_, _| Ok(page(reader_page(), None)));
    source.expect_post_json().never();
    source
}

/// Target account that accepts everything and records what it was sent.
fn recording_target() -> (MockReadwiseApi, Arc<Mutex<Vec<(String, Value)>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let sent_in_mock = sent.clone();
    let mut target = MockReadwiseApi::new();
    target.expect_get().never();
    target.expect_post_json().returning(move |path, body| {
        sent_in_mock
            .lock()
            .unwrap()
            .push((path.to_string(), body.clone()));
        Ok(ApiResponse::new(200, "{}"))
    });
    (target, sent)
}

#[tokio::test]
async fn end_to_end_migration_from_live_source() {
    let dir = tempdir().unwrap();
    let config = SyncConfig {
        cache: CachePaths::in_dir(dir.path()),
        ..SyncConfig::default()
    };
    let source = source_account();
    let (target, sent) = recording_target();

    let report = synchronise(&config, Some(&source), &target)
        .await
        .expect("sync should succeed");

    assert!(report.is_complete(), "{report:?}");
    assert_eq!(report.highlights_source.records, 2);
    assert_eq!(report.highlights_source.pages, 2);
    assert_eq!(report.highlights.highlights, 2);
    assert_eq!(report.documents.succeeded, 1);
    assert_eq!(report.documents.skipped_children, 1);

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2, "one highlight batch then one document");

    let (path, batch) = &sent[0];
    assert_eq!(path, HIGHLIGHTS_PATH);
    let highlights = batch["highlights"].as_array().unwrap();
    assert_eq!(highlights.len(), 2);
    assert_eq!(highlights[0]["text"], "Clarity about what matters");
    assert!(highlights[0].get("note").is_none());
    assert!(highlights[0].get("image_url").is_none());
    assert!(highlights[0].get("highlight_url").is_none());
    assert_eq!(highlights[1]["note"], "good");
    assert!(highlights[1]["highlighted_at"].as_str().unwrap().ends_with('Z'));

    let (path, document) = &sent[1];
    assert_eq!(path, SAVE_PATH);
    assert_eq!(document["title"], "An article");
    assert_eq!(document["published_date"], "2023-11-14T22:13:20+00:00");
    assert_eq!(document["tags"], json!(["rust"]));
    assert_eq!(document["html"], "<p>hi</p>");

    // Raw fetched data is cached verbatim for a later upload-only run.
    let paths = CachePaths::in_dir(dir.path());
    let cached_export = cache::read_records(&paths.highlights).unwrap();
    let mut expected = export_page_one().as_array().unwrap().clone();
    expected.extend(export_page_two().as_array().unwrap().clone());
    assert_eq!(cached_export, expected);
    assert_eq!(
        cache::read_records(&paths.documents).unwrap(),
        *reader_page().as_array().unwrap()
    );
}

#[tokio::test]
async fn upload_from_cache_files_needs_no_source_account() {
    let dir = tempdir().unwrap();
    let paths = CachePaths::in_dir(dir.path());
    cache::write_records(&paths.highlights, export_page_one().as_array().unwrap()).unwrap();
    cache::write_records(&paths.documents, reader_page().as_array().unwrap()).unwrap();

    let config = SyncConfig {
        upload_from_file: true,
        cache: paths,
        ..SyncConfig::default()
    };
    let (target, sent) = recording_target();

    let report = synchronise(&config, None, &target).await.unwrap();

    assert!(report.highlights_source.from_cache);
    assert!(report.is_complete());
    assert_eq!(sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn missing_cache_file_is_an_error() {
    let dir = tempdir().unwrap();
    let config = SyncConfig {
        upload_from_file: true,
        cache: CachePaths::in_dir(dir.path()),
        ..SyncConfig::default()
    };
    let mut target = MockReadwiseApi::new();
    target.expect_post_json().never();

    let result = synchronise(&config, None, &target).await;

    assert!(matches!(result, Err(SyncError::Cache(_))));
}

#[tokio::test]
async fn fetch_mode_without_source_client_is_an_error() {
    let dir = tempdir().unwrap();
    let config = SyncConfig {
        cache: CachePaths::in_dir(dir.path()),
        ..SyncConfig::default()
    };
    let target = MockReadwiseApi::new();

    let result = synchronise(&config, None, &target).await;

    assert!(matches!(result, Err(SyncError::MissingSourceClient)));
}

#[tokio::test]
async fn failed_highlight_batch_still_uploads_documents() {
    let dir = tempdir().unwrap();
    let config = SyncConfig {
        cache: CachePaths::in_dir(dir.path()),
        ..SyncConfig::default()
    };
    let source = source_account();
    let mut target = MockReadwiseApi::new();
    target
        .expect_post_json()
        .withf(|path, _| path == HIGHLIGHTS_PATH)
        .times(1)
        .returning(|_, _| Ok(ApiResponse::new(401, "bad token")));
    target
        .expect_post_json()
        .withf(|path, _| path == SAVE_PATH)
        .times(1)
        .returning(|_, _| Ok(ApiResponse::new(201, "{}")));

    let report = synchronise(&config, Some(&source), &target).await.unwrap();

    assert!(!report.is_complete());
    assert!(report.highlights.error.as_deref().unwrap().contains("401"));
    assert_eq!(report.documents.succeeded, 1);
}

#[tokio::test]
async fn partial_fetch_marks_report_incomplete() {
    let dir = tempdir().unwrap();
    let config = SyncConfig {
        cache: CachePaths::in_dir(dir.path()),
        ..SyncConfig::default()
    };
    let mut source = MockReadwiseApi::new();
    source
        .expect_get()
        .withf(|path, _| path == EXPORT_PATH)
        .returning(|_, _| Ok(ApiResponse::new(503, "maintenance")));
    source
        .expect_get()
        .withf(|path, _| path == READER_LIST_PATH)
        .returning(|_, _| Ok(page(json!([]), None)));
    let mut target = MockReadwiseApi::new();
    target.expect_post_json().never();

    let report = synchronise(&config, Some(&source), &target).await.unwrap();

    assert!(!report.highlights_source.complete);
    assert!(report.documents_source.complete);
    assert!(!report.is_complete());
}
