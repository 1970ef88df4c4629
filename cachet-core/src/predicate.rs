//! Response cacheability predicates.
//!
//! A [`Predicate`] decides whether a successful response may be stored.
//! Predicates compose with [`PredicateExt`]:
//!
//! ```
//! use cachet_core::{HeaderPredicate, PredicateExt, Predicate, Response, StatusRange};
//!
//! let predicate = StatusRange::default()
//!     .and(HeaderPredicate::missing("set-cookie"));
//!
//! assert!(predicate.check(&Response::ok("body")));
//! assert!(!predicate.check(&Response::ok("body").with_header("set-cookie", "a=b")));
//! ```

use std::fmt::Debug;
use std::ops::Range;

use http::HeaderName;

use crate::response::Response;

/// Decides whether a response is cacheable.
pub trait Predicate: Debug + Send + Sync {
    /// Returns `true` when `response` may be stored.
    fn check(&self, response: &Response) -> bool;
}

/// Accepts every response.
#[derive(Debug, Default, Clone, Copy)]
pub struct Neutral;

impl Predicate for Neutral {
    fn check(&self, _response: &Response) -> bool {
        true
    }
}

/// Accepts responses whose status code lies in a range.
///
/// The default range is `200..400`.
#[derive(Debug, Clone)]
pub struct StatusRange {
    range: Range<u16>,
}

impl StatusRange {
    /// Creates a predicate for `range`.
    pub fn new(range: Range<u16>) -> Self {
        Self { range }
    }
}

impl Default for StatusRange {
    fn default() -> Self {
        Self::new(200..400)
    }
}

impl Predicate for StatusRange {
    fn check(&self, response: &Response) -> bool {
        self.range.contains(&response.status.as_u16())
    }
}

#[derive(Debug, Clone)]
enum HeaderOperation {
    Exists,
    Missing,
    Equals(String),
}

/// Checks a response header.
#[derive(Debug, Clone)]
pub struct HeaderPredicate {
    name: HeaderName,
    operation: HeaderOperation,
}

impl HeaderPredicate {
    /// Header must be present.
    pub fn exists(name: HeaderName) -> Self {
        Self {
            name,
            operation: HeaderOperation::Exists,
        }
    }

    /// Header must be absent.
    pub fn missing(name: &'static str) -> Self {
        Self {
            name: HeaderName::from_static(name),
            operation: HeaderOperation::Missing,
        }
    }

    /// Some value of the header must equal `value`.
    pub fn equals(name: HeaderName, value: impl Into<String>) -> Self {
        Self {
            name,
            operation: HeaderOperation::Equals(value.into()),
        }
    }
}

impl Predicate for HeaderPredicate {
    fn check(&self, response: &Response) -> bool {
        match self.operation {
            HeaderOperation::Exists => response.headers.contains_key(&self.name),
            HeaderOperation::Missing => !response.headers.contains_key(&self.name),
            HeaderOperation::Equals(ref expected) => response
                .headers
                .get_all(&self.name)
                .iter()
                .any(|value| value.as_bytes() == expected.as_bytes()),
        }
    }
}

/// Predicate backed by a closure. Built with [`predicate_fn`].
#[derive(Clone)]
pub struct FnPredicate<F>(F);

impl<F> Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPredicate").finish()
    }
}

/// Wraps a closure as a [`Predicate`].
pub fn predicate_fn<F>(f: F) -> FnPredicate<F>
where
    F: Fn(&Response) -> bool + Send + Sync,
{
    FnPredicate(f)
}

impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&Response) -> bool + Send + Sync,
{
    fn check(&self, response: &Response) -> bool {
        (self.0)(response)
    }
}

/// Inverts a predicate.
#[derive(Debug)]
pub struct Not<P> {
    predicate: P,
}

impl<P> Not<P> {
    /// Creates the inverted predicate.
    pub fn new(predicate: P) -> Self {
        Self { predicate }
    }
}

impl<P: Predicate> Predicate for Not<P> {
    fn check(&self, response: &Response) -> bool {
        !self.predicate.check(response)
    }
}

/// Both predicates must accept.
#[derive(Debug)]
pub struct And<L, R> {
    left: L,
    right: R,
}

impl<L, R> And<L, R> {
    /// Creates the conjunction.
    pub fn new(left: L, right: R) -> Self {
        Self { left, right }
    }
}

impl<L: Predicate, R: Predicate> Predicate for And<L, R> {
    fn check(&self, response: &Response) -> bool {
        self.left.check(response) && self.right.check(response)
    }
}

/// Either predicate must accept.
#[derive(Debug)]
pub struct Or<L, R> {
    left: L,
    right: R,
}

impl<L, R> Or<L, R> {
    /// Creates the disjunction.
    pub fn new(left: L, right: R) -> Self {
        Self { left, right }
    }
}

impl<L: Predicate, R: Predicate> Predicate for Or<L, R> {
    fn check(&self, response: &Response) -> bool {
        self.left.check(response) || self.right.check(response)
    }
}

/// Combinators for [`Predicate`].
pub trait PredicateExt: Predicate + Sized {
    /// Both `self` and `right` must accept.
    fn and<R: Predicate>(self, right: R) -> And<Self, R> {
        And::new(self, right)
    }

    /// Either `self` or `right` must accept.
    fn or<R: Predicate>(self, right: R) -> Or<Self, R> {
        Or::new(self, right)
    }

    /// Inverts `self`.
    fn not(self) -> Not<Self> {
        Not::new(self)
    }
}

impl<T: Predicate + Sized> PredicateExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use http::header::CACHE_CONTROL;

    #[test]
    fn test_default_status_range() {
        let predicate = StatusRange::default();
        assert!(predicate.check(&Response::ok("")));
        assert!(predicate.check(&Response::new(StatusCode::NOT_MODIFIED, "")));
        assert!(!predicate.check(&Response::new(StatusCode::NOT_FOUND, "")));
    }

    #[test]
    fn test_header_operations() {
        let response = Response::ok("").with_header("cache-control", "public");
        assert!(HeaderPredicate::exists(CACHE_CONTROL).check(&response));
        assert!(!HeaderPredicate::missing("cache-control").check(&response));
        assert!(HeaderPredicate::equals(CACHE_CONTROL, "public").check(&response));
        assert!(!HeaderPredicate::equals(CACHE_CONTROL, "private").check(&response));
    }

    #[test]
    fn test_combinators() {
        let small = predicate_fn(|response: &Response| response.body.len() < 4);
        let predicate = StatusRange::default().and(small).or(Neutral.not());
        assert!(predicate.check(&Response::ok("abc")));
        assert!(!predicate.check(&Response::ok("abcdef")));
    }
}
