//! Response snapshot stored in cache entries.

use bytes::Bytes;
use http::header::{ETAG, HeaderMap, HeaderName, HeaderValue, LAST_MODIFIED};
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// An HTTP response as stored by the cache.
///
/// Snapshots are owned values: storage hands out clones, so mutating a
/// returned response never changes what another caller reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Status code.
    #[serde(with = "http_serde::status_code")]
    pub status: StatusCode,
    /// Response headers.
    #[serde(with = "http_serde::header_map")]
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response without headers.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Creates a `200 OK` response.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Appends a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// The `ETag` header, if present.
    pub fn etag(&self) -> Option<&HeaderValue> {
        self.headers.get(ETAG)
    }

    /// The `Last-Modified` header, if present.
    pub fn last_modified(&self) -> Option<&HeaderValue> {
        self.headers.get(LAST_MODIFIED)
    }

    /// Whether the response carries an `ETag` or `Last-Modified` validator.
    pub fn has_revalidation_material(&self) -> bool {
        self.etag().is_some() || self.last_modified().is_some()
    }

    /// Merges a `304 Not Modified` into this stored response.
    ///
    /// Status and body stay. Every header name present on the 304 replaces
    /// all stored values for that name.
    pub fn merge_not_modified(mut self, not_modified: &Response) -> Self {
        for name in not_modified.headers.keys() {
            self.headers.remove(name);
            for value in not_modified.headers.get_all(name) {
                self.headers.append(name.clone(), value.clone());
            }
        }
        self
    }
}
