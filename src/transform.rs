//! Maps records read from the source account into the bodies the import
//! endpoints accept.
//!
//! Both mappings are pure. Optional fields are left out of the serialised
//! payload when they are absent, null, or the empty string.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::model::{ExportedBook, Highlight, ReaderDocument};

/// Timestamp written when a highlight has no `highlighted_at`.
const HIGHLIGHTED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const PUBLISHED_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+00:00";

/// Body item for `POST /v2/highlights/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlighted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_url: Option<String>,
}

/// Body for `POST /v3/save/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_using: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("record does not match the expected shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("published_date {0} is not an epoch-millisecond timestamp")]
    PublishedDate(String),
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn non_empty_value(value: &Option<Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(v) => Some(v.clone()),
    }
}

/// Builds one highlight upload item from a highlight and the book it belongs to.
///
/// `now` is used only when the highlight has no `highlighted_at` at all; an
/// empty string is stripped like any other empty field.
pub fn highlight_to_payload(
    book: &ExportedBook,
    highlight: &Highlight,
    now: DateTime<Utc>,
) -> HighlightPayload {
    let highlighted_at = match &highlight.highlighted_at {
        Some(_) => non_empty(&highlight.highlighted_at),
        None => Some(now.format(HIGHLIGHTED_AT_FORMAT).to_string()),
    };
    HighlightPayload {
        text: non_empty(&highlight.text),
        title: non_empty(&book.title),
        author: non_empty(&book.author),
        image_url: non_empty(&book.cover_image_url),
        source_url: non_empty(&book.source_url),
        category: non_empty(&book.category),
        note: non_empty(&highlight.note),
        location: non_empty_value(&highlight.location),
        location_type: non_empty(&highlight.location_type),
        highlighted_at,
        highlight_url: non_empty(&book.unique_url),
    }
}

/// Flattens every highlight of every book, preserving export order.
pub fn highlights_payloads(books: &[ExportedBook], now: DateTime<Utc>) -> Vec<HighlightPayload> {
    books
        .iter()
        .flat_map(|book| {
            book.highlights
                .iter()
                .map(move |h| highlight_to_payload(book, h, now))
        })
        .collect()
}

/// Builds the save body for one Reader document.
///
/// Returns `Ok(None)` for records that carry a `parent_id`: those are
/// highlights or notes hanging off another document, not documents.
/// The body's `html` comes from `html_content`, falling back to `html` when
/// that is missing or empty.
pub fn reader_item_to_payload(
    doc: &ReaderDocument,
) -> Result<Option<DocumentPayload>, TransformError> {
    if doc.parent_id.is_some() {
        return Ok(None);
    }

    let published_date = match &doc.published_date {
        None | Some(Value::Null) => None,
        Some(raw) => Some(format_published_date(raw)?),
    };

    Ok(Some(DocumentPayload {
        url: non_empty(&doc.url).or_else(|| non_empty(&doc.source_url)),
        html: non_empty(&doc.html_content).or_else(|| non_empty(&doc.html)),
        title: non_empty(&doc.title),
        author: non_empty(&doc.author),
        summary: non_empty(&doc.summary),
        published_date,
        image_url: non_empty(&doc.image_url),
        location: non_empty(&doc.location),
        category: non_empty(&doc.category),
        tags: doc.tags.values().filter_map(|t| non_empty(&t.name)).collect(),
        notes: non_empty(&doc.notes),
        source: non_empty(&doc.source),
        saved_using: non_empty(&doc.saved_using),
    }))
}

/// Renders epoch milliseconds as a UTC timestamp with an explicit offset.
fn format_published_date(raw: &Value) -> Result<String, TransformError> {
    let millis = match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    millis
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format(PUBLISHED_DATE_FORMAT).to_string())
        .ok_or_else(|| TransformError::PublishedDate(raw.to_string()))
}

/// Decodes and transforms one raw Reader record.
pub fn document_payload_from_value(
    raw: &Value,
) -> Result<Option<DocumentPayload>, TransformError> {
    let doc: ReaderDocument = serde_json::from_value(raw.clone())?;
    reader_item_to_payload(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tag;
    use chrono::TimeZone;
    use serde_json::json;

    fn book() -> ExportedBook {
        ExportedBook {
            title: Some("Thinking in Systems".into()),
            author: Some("".into()),
            cover_image_url: Some("https://img/cover.png".into()),
            source_url: None,
            category: Some("books".into()),
            unique_url: Some("".into()),
            highlights: vec![],
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn highlight_payload_drops_empty_and_null_fields() {
        let h = Highlight {
            text: Some("A stock is the memory".into()),
            note: Some("".into()),
            location: Some(json!(42)),
            location_type: None,
            highlighted_at: Some("2020-05-01T10:00:00Z".into()),
        };
        let payload = highlight_to_payload(&book(), &h, fixed_now());
        let value = serde_json::to_value(&payload).unwrap();
        let obj = value.as_object().unwrap();

        for key in ["author", "note", "highlight_url", "source_url", "location_type"] {
            assert!(!obj.contains_key(key), "{key} should be stripped");
        }
        assert!(obj.values().all(|v| !v.is_null() && v != ""));
        assert_eq!(obj["text"], "A stock is the memory");
        assert_eq!(obj["image_url"], "https://img/cover.png");
        assert_eq!(obj["location"], 42);
        assert_eq!(obj["highlighted_at"], "2020-05-01T10:00:00Z");
    }

    #[test]
    fn missing_highlighted_at_is_filled_with_now() {
        let h = Highlight {
            text: Some("t".into()),
            ..Default::default()
        };
        let payload = highlight_to_payload(&book(), &h, fixed_now());
        assert_eq!(
            payload.highlighted_at.as_deref(),
            Some("2024-01-02T03:04:05.000000Z")
        );
    }

    #[test]
    fn present_highlighted_at_passes_through_untouched() {
        let h = Highlight {
            text: Some("t".into()),
            highlighted_at: Some("2021-01-01T00:00:00Z".into()),
            ..Default::default()
        };
        let payload = highlight_to_payload(&book(), &h, fixed_now());
        assert_eq!(payload.highlighted_at.as_deref(), Some("2021-01-01T00:00:00Z"));
    }

    #[test]
    fn flattens_highlights_in_order() {
        let mut first = book();
        first.highlights = vec![
            Highlight {
                text: Some("one".into()),
                ..Default::default()
            },
            Highlight {
                text: Some("two".into()),
                ..Default::default()
            },
        ];
        let mut second = book();
        second.title = Some("Other".into());
        second.highlights = vec![Highlight {
            text: Some("three".into()),
            ..Default::default()
        }];
        let payloads = highlights_payloads(&[first, second], fixed_now());
        let texts: Vec<_> = payloads.iter().map(|p| p.text.as_deref().unwrap()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert_eq!(payloads[2].title.as_deref(), Some("Other"));
    }

    #[test]
    fn child_records_are_skipped() {
        let doc = ReaderDocument {
            parent_id: Some("01parent".into()),
            title: Some("a highlight".into()),
            ..Default::default()
        };
        assert!(reader_item_to_payload(&doc).unwrap().is_none());

        let doc = ReaderDocument {
            title: Some("a document".into()),
            ..Default::default()
        };
        assert!(reader_item_to_payload(&doc).unwrap().is_some());
    }

    #[test]
    fn published_date_is_rendered_in_utc() {
        for raw in [json!(1700000000000u64), json!("1700000000000")] {
            let doc = ReaderDocument {
                published_date: Some(raw),
                ..Default::default()
            };
            let payload = reader_item_to_payload(&doc).unwrap().unwrap();
            assert_eq!(
                payload.published_date.as_deref(),
                Some("2023-11-14T22:13:20+00:00")
            );
        }
    }

    #[test]
    fn missing_published_date_is_omitted() {
        let payload = reader_item_to_payload(&ReaderDocument::default())
            .unwrap()
            .unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("published_date").is_none());
    }

    #[test]
    fn garbage_published_date_is_an_error() {
        let doc = ReaderDocument {
            published_date: Some(json!("yesterday")),
            ..Default::default()
        };
        assert!(matches!(
            reader_item_to_payload(&doc),
            Err(TransformError::PublishedDate(_))
        ));
    }

    #[test]
    fn document_payload_flattens_tags_and_prefers_html_content() {
        let mut tags = std::collections::BTreeMap::new();
        tags.insert("t1".to_string(), Tag { name: Some("rust".into()) });
        tags.insert("t2".to_string(), Tag { name: Some("async".into()) });
        let doc = ReaderDocument {
            url: None,
            source_url: Some("https://example.com/post".into()),
            html: Some("<p>old</p>".into()),
            html_content: Some("<p>full</p>".into()),
            summary: Some("".into()),
            tags,
            ..Default::default()
        };
        let payload = reader_item_to_payload(&doc).unwrap().unwrap();
        assert_eq!(payload.url.as_deref(), Some("https://example.com/post"));
        assert_eq!(payload.html.as_deref(), Some("<p>full</p>"));
        assert_eq!(payload.tags, vec!["rust".to_string(), "async".to_string()]);

        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("summary").is_none());
        assert!(value.as_object().unwrap().values().all(|v| !v.is_null()));
    }

    #[test]
    fn html_falls_back_when_html_content_is_empty() {
        let doc = ReaderDocument {
            html: Some("<p>old</p>".into()),
            html_content: Some("".into()),
            ..Default::default()
        };
        let payload = reader_item_to_payload(&doc).unwrap().unwrap();
        assert_eq!(payload.html.as_deref(), Some("<p>old</p>"));
    }

    #[test]
    fn tags_without_a_name_are_dropped() {
        let raw = json!({
            "title": "x",
            "tags": {"t1": {"name": null}, "t2": {"name": ""}, "t3": {"name": "rust"}}
        });
        let payload = document_payload_from_value(&raw).unwrap().unwrap();
        assert_eq!(payload.title.as_deref(), Some("x"));
        assert_eq!(payload.tags, vec!["rust".to_string()]);
    }

    #[test]
    fn decode_failure_is_reported() {
        let raw = json!({"title": 12});
        assert!(matches!(
            document_payload_from_value(&raw),
            Err(TransformError::Decode(_))
        ));
    }
}
