//! Request snapshot handed to the key generator and the transport.

use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde_json::Value;

/// An outgoing HTTP request as seen by the cache.
///
/// The cache never executes requests itself. It reads the fields below to
/// derive a [`CacheKey`](crate::CacheKey), may add conditional headers, and
/// passes the request on to the [`Upstream`](crate::Upstream).
///
/// # Example
///
/// ```
/// use cachet_core::Request;
/// use serde_json::json;
///
/// let request = Request::get("/users")
///     .base_url("https://api.example.com/")
///     .params(json!({ "page": 2 }))
///     .header("authorization", "Bearer token");
///
/// assert_eq!(request.method, http::Method::GET);
/// assert!(request.headers.contains_key("authorization"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Base URL the path is resolved against, if any.
    pub base_url: Option<String>,
    /// Path or absolute URL.
    pub url: String,
    /// Query parameters.
    pub params: Option<Value>,
    /// Request body.
    pub data: Option<Value>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Client-side timeout. Also bounds how long concurrent callers wait on
    /// this request's in-flight result.
    pub timeout: Option<Duration>,
    /// Explicit cache id. Requests sharing an id share one entry.
    pub id: Option<String>,
}

impl Request {
    /// Creates a request with the given method and URL.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            base_url: None,
            url: url.into(),
            params: None,
            data: None,
            headers: HeaderMap::new(),
            timeout: None,
            id: None,
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a `POST` request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Sets the base URL.
    pub fn base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..self
        }
    }

    /// Sets the query parameters.
    pub fn params(self, params: Value) -> Self {
        Self {
            params: Some(params),
            ..self
        }
    }

    /// Sets the request body.
    pub fn data(self, data: Value) -> Self {
        Self {
            data: Some(data),
            ..self
        }
    }

    /// Sets the client-side timeout.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Sets an explicit cache id.
    pub fn id(self, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..self
        }
    }

    /// Appends a header. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }
}
