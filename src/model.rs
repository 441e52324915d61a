//! Record shapes returned by the Readwise read endpoints.
//!
//! Fetching and caching work on raw `serde_json::Value`s so cache files keep
//! the server's data verbatim; these types are decoded from those values one
//! record at a time during the transform step. Unknown fields are ignored and
//! missing or null fields decode to `None`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope shared by every cursor-paginated read endpoint.
#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(rename = "nextPageCursor", default)]
    pub next_page_cursor: Option<String>,
}

/// One source document from the highlights export (`/v2/export/`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExportedBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
    pub source_url: Option<String>,
    pub category: Option<String>,
    pub unique_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub highlights: Vec<Highlight>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Highlight {
    pub text: Option<String>,
    pub note: Option<String>,
    /// The export sends an integer; kept as a raw value so it is forwarded untouched.
    pub location: Option<Value>,
    pub location_type: Option<String>,
    pub highlighted_at: Option<String>,
}

/// One saved document from the Reader list endpoint (`/v3/list/`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReaderDocument {
    pub url: Option<String>,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    /// Epoch milliseconds, sent either as a number or as a numeric string.
    pub published_date: Option<Value>,
    pub image_url: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: BTreeMap<String, Tag>,
    pub notes: Option<String>,
    pub html: Option<String>,
    pub html_content: Option<String>,
    pub source: Option<String>,
    pub saved_using: Option<String>,
    /// Set when the record is a highlight or note attached to another document.
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Tag {
    pub name: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
