//! JSON:API response envelopes.
//!
//! The client never looks at resource attributes. It only needs `data`,
//! `links.next` and `meta.paging.total`; everything under `included` is kept
//! as raw JSON for the call-site to decode.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::Result;

/// A response envelope.
///
/// `D` is whatever the call-site expects under `data`: a single resource for
/// item endpoints, or `Vec<R>` for list endpoints.
///
/// # Example
///
/// ```
/// use connect_core::models::Document;
///
/// let body = br#"{
///     "data": [{"id": "1"}, {"id": "2"}],
///     "links": {"next": "https://api.example.com/v1/apps?cursor=Mg"},
///     "meta": {"paging": {"total": 7, "limit": 2}}
/// }"#;
/// let doc: Document<Vec<serde_json::Value>> = serde_json::from_slice(body).unwrap();
/// assert_eq!(doc.data.len(), 2);
/// assert_eq!(doc.total(), Some(7));
/// assert!(doc.next_link().is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document<D> {
    /// Primary data.
    pub data: D,
    /// Navigation links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    /// Related resources, undecoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included: Option<Box<RawValue>>,
    /// Response metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<D> Document<D> {
    /// The absolute URL of the next page, if the service declared one.
    pub fn next_link(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|links| links.next.as_deref())
            .filter(|next| !next.is_empty())
    }

    /// The total item count across all pages (`meta.paging.total`).
    pub fn total(&self) -> Option<u64> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.paging.as_ref())
            .and_then(|paging| paging.total)
    }

    /// Decode the `included` side-table into a call-site type.
    ///
    /// Returns `Ok(None)` when the response had no `included` member.
    pub fn included_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.included {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }
}

/// The `links` member of an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    /// Canonical URL of this document
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    /// Absolute URL of the next page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// The `meta` member of an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Paging information for list responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
}

/// `meta.paging` for list responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    /// Items across all pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Page size the service applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

/// Body of a failed response: `{"errors": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDocument {
    /// Error entries, in the order the service sent them
    #[serde(default)]
    pub errors: Vec<ApiErrorEntry>,
}

/// One entry of an [`ErrorDocument`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorEntry {
    /// Unique identifier of this occurrence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// HTTP status, as a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Machine-readable code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Occurrence-specific explanation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApiErrorEntry {
    /// Human-readable description: `"title: detail"`, falling back to
    /// whichever of title, detail, or code is present.
    pub fn description(&self) -> String {
        match (self.title.as_deref(), self.detail.as_deref()) {
            (Some(title), Some(detail)) => format!("{title}: {detail}"),
            (Some(title), None) => title.to_string(),
            (None, Some(detail)) => detail.to_string(),
            (None, None) => self
                .code
                .clone()
                .unwrap_or_else(|| "Unknown API error".to_string()),
        }
    }
}
