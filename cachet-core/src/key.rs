//! Cache key types and construction.
//!
//! This module provides:
//!
//! - [`CacheKey`] - The opaque string identity of a stored entry
//! - [`KeyPart`] - A single key-value component used to assemble keys
//! - [`KeyGenerator`] - Derives a key from a [`Request`]
//! - [`DefaultKeyGenerator`] - Method + normalized URL + canonical params/body
//! - [`Variant`] / [`VaryHeader`] - Header values that widen a key under `Vary`
//!
//! ## Format
//!
//! Keys built from parts follow `key1=value1&key2=value2`. A part without a
//! value renders as its bare name. Explicit ids render as `id::<id>`, and
//! variant keys append `|vary:<name>=<digest>&...` to their base key, where
//! `<digest>` is a truncated SHA-256 of the header value so credentials sent
//! in varying headers never appear in keys or logs.
//!
//! ```
//! use cachet_core::{CacheKey, KeyPart};
//!
//! let key = CacheKey::from_parts(&[
//!     KeyPart::new("method", Some("get")),
//!     KeyPart::new("url", Some("https://a.com/b")),
//! ]);
//! assert_eq!(key.as_str(), "method=get&url=https://a.com/b");
//!
//! let key = CacheKey::from_id("profile");
//! assert_eq!(key.as_str(), "id::profile");
//! assert!(key.is_id());
//! ```

use std::fmt::{self, Write as _};

use http::HeaderMap;
use http::header::VARY;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use smol_str::SmolStr;

use crate::request::Request;

const ID_PREFIX: &str = "id::";
const VARY_SEPARATOR: &str = "|vary:";

/// A cache key identifying a stored entry.
///
/// Keys are compared by their string form. Cloning is cheap for keys up to
/// 23 bytes, which are stored inline by [`SmolStr`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(SmolStr);

impl CacheKey {
    /// Wraps an arbitrary string as a key.
    pub fn new(key: impl Into<SmolStr>) -> Self {
        CacheKey(key.into())
    }

    /// Key for an explicit caller-supplied id.
    ///
    /// Requests sharing an id share one entry regardless of their other
    /// attributes.
    pub fn from_id(id: &str) -> Self {
        CacheKey(smol_str::format_smolstr!("{ID_PREFIX}{id}"))
    }

    /// Assembles a key from parts joined by `&`.
    pub fn from_parts(parts: &[KeyPart]) -> Self {
        let mut key = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                key.push('&');
            }
            // Writing to a String is infallible.
            let _ = write!(key, "{part}");
        }
        CacheKey(key.into())
    }

    /// Returns the key widened by the given variant.
    ///
    /// An empty variant leaves the key unchanged.
    pub fn with_variant(&self, variant: &Variant) -> Self {
        if variant.is_empty() {
            return self.clone();
        }
        CacheKey(smol_str::format_smolstr!(
            "{}{VARY_SEPARATOR}{variant}",
            self.0
        ))
    }

    /// Whether this key was derived from an explicit id.
    pub fn is_id(&self) -> bool {
        self.0.starts_with(ID_PREFIX)
    }

    /// Whether this key carries a variant suffix.
    pub fn is_variant(&self) -> bool {
        self.0.contains(VARY_SEPARATOR)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey::new(key)
    }
}

/// A single component of a cache key.
///
/// Renders as `key=value`, or as `key` alone when the value is absent.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct KeyPart {
    key: SmolStr,
    value: Option<SmolStr>,
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)?;
        if let Some(ref value) = self.value {
            write!(f, "={value}")?;
        }
        Ok(())
    }
}

impl KeyPart {
    /// Creates a new key part.
    pub fn new<K: AsRef<str>, V: AsRef<str>>(key: K, value: Option<V>) -> Self {
        KeyPart {
            key: SmolStr::new(key),
            value: value.map(SmolStr::new),
        }
    }

    /// Returns the key name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the value, if present.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Derives the cache key of a request.
///
/// Implementations must be pure: no network or storage side effects, and the
/// same request always maps to the same key.
///
/// Any `Fn(&Request) -> CacheKey` closure is a key generator.
pub trait KeyGenerator: Send + Sync {
    /// Returns the key for `request`.
    fn generate(&self, request: &Request) -> CacheKey;
}

impl<F> KeyGenerator for F
where
    F: Fn(&Request) -> CacheKey + Send + Sync,
{
    fn generate(&self, request: &Request) -> CacheKey {
        self(request)
    }
}

/// Default key derivation.
///
/// - An explicit [`Request::id`] yields `id::<id>` and nothing else counts.
/// - Otherwise the key is built from the lower-cased method, the normalized
///   URL, and the canonical JSON of params and body.
///
/// URL normalization trims slashes at the join point and at the end, so
/// `https://a.com/` + `/b` and `https://a.com/b` produce the same key. An
/// absolute URL ignores the base. Canonical JSON sorts object keys
/// recursively, so `{"a":1,"b":2}` and `{"b":2,"a":1}` collide.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultKeyGenerator;

impl KeyGenerator for DefaultKeyGenerator {
    fn generate(&self, request: &Request) -> CacheKey {
        if let Some(ref id) = request.id {
            return CacheKey::from_id(id);
        }

        let method = request.method.as_str().to_ascii_lowercase();
        let url = normalize_url(request.base_url.as_deref(), &request.url);
        let mut parts = vec![
            KeyPart::new("method", Some(method)),
            KeyPart::new("url", Some(url)),
        ];
        if let Some(ref params) = request.params {
            parts.push(KeyPart::new("params", Some(canonical_json(params))));
        }
        if let Some(ref data) = request.data {
            parts.push(KeyPart::new("data", Some(canonical_json(data))));
        }
        CacheKey::from_parts(&parts)
    }
}

fn normalize_url(base: Option<&str>, url: &str) -> String {
    let path = url.trim_matches('/');
    match base {
        Some(base) if !url.contains("://") => {
            let base = base.trim_end_matches('/');
            if path.is_empty() {
                base.to_owned()
            } else if base.is_empty() {
                format!("/{path}")
            } else {
                format!("{base}/{path}")
            }
        }
        _ if url.contains("://") => url.trim_end_matches('/').to_owned(),
        _ => format!("/{path}"),
    }
}

/// Serializes `value` with object keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Request header values that select one variant of a response.
///
/// Header names are lower-cased and sorted, so the order in which a server
/// lists them in `Vary` does not matter. A header absent from the request is
/// recorded as `None`, distinct from a header present with an empty value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pairs: Vec<(SmolStr, Option<SmolStr>)>,
}

impl Variant {
    /// Captures the values of `names` from request headers.
    pub fn from_request<S: AsRef<str>>(names: &[S], headers: &HeaderMap) -> Self {
        let mut pairs: Vec<(SmolStr, Option<SmolStr>)> = names
            .iter()
            .map(|name| {
                let name = name.as_ref().trim().to_ascii_lowercase();
                let value = header_value(headers, &name);
                (SmolStr::new(name), value)
            })
            .collect();
        pairs.sort();
        pairs.dedup_by(|a, b| a.0 == b.0);
        Variant { pairs }
    }

    /// Header names this variant is keyed on.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(name, _)| name.as_str())
    }

    /// Whether `headers` select this same variant.
    pub fn matches(&self, headers: &HeaderMap) -> bool {
        self.pairs
            .iter()
            .all(|(name, value)| header_value(headers, name).as_ref() == value.as_ref())
    }

    /// Whether the variant has no header names.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            f.write_str(name)?;
            if let Some(value) = value {
                write!(f, "={}", digest(value))?;
            }
        }
        Ok(())
    }
}

/// SHA-256 of `value`, truncated to 16 hex characters.
fn digest(value: &str) -> String {
    let hash = Sha256::digest(value.as_bytes());
    hex::encode(&hash[..8])
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<SmolStr> {
    let mut values = headers.get_all(name).iter().peekable();
    values.peek()?;
    let joined = values
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .collect::<Vec<_>>()
        .join(", ");
    Some(SmolStr::new(joined))
}

/// Parsed `Vary` response header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VaryHeader {
    /// No `Vary` header, or an empty one.
    None,
    /// `Vary: *`. No variant key can be trusted.
    Any,
    /// Lower-cased, de-duplicated header names.
    Names(Vec<String>),
}

impl VaryHeader {
    /// Parses every `Vary` value of a response.
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut names: Vec<String> = Vec::new();
        for value in headers.get_all(VARY) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for name in value.split(',') {
                let name = name.trim();
                if name == "*" {
                    return VaryHeader::Any;
                }
                if !name.is_empty() {
                    names.push(name.to_ascii_lowercase());
                }
            }
        }
        names.sort();
        names.dedup();
        if names.is_empty() {
            VaryHeader::None
        } else {
            VaryHeader::Names(names)
        }
    }
}
