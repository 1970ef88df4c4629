//! Transport abstraction.
//!
//! The cache never performs network I/O. It hands the (possibly decorated)
//! [`Request`](crate::Request) to an [`Upstream`] at most once per decision to
//! fetch, and interprets whatever comes back.
//!
//! ## Implementing
//!
//! ```
//! use std::future::Ready;
//! use cachet_core::{Request, Response, Upstream};
//!
//! struct Echo;
//!
//! impl Upstream<Request> for Echo {
//!     type Response = Result<Response, std::io::Error>;
//!     type Future = Ready<Self::Response>;
//!
//!     fn call(&mut self, req: Request) -> Self::Future {
//!         std::future::ready(Ok(Response::ok(req.url)))
//!     }
//! }
//! ```
//!
//! Closures returning futures can be adapted with [`upstream_fn`].

use std::fmt::Debug;
use std::future::Future;

/// Trait for calling the transport.
///
/// # Type Parameters
///
/// * `Req` - The request type sent to the transport
pub trait Upstream<Req> {
    /// The response type returned by the transport
    type Response;

    /// The future that resolves to the response
    type Future: Future<Output = Self::Response> + Send;

    /// Call the transport with the given request
    fn call(&mut self, req: Req) -> Self::Future;
}

/// [`Upstream`] backed by a closure. Built with [`upstream_fn`].
#[derive(Clone)]
pub struct UpstreamFn<F>(F);

impl<F> Debug for UpstreamFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamFn").finish()
    }
}

/// Adapts `FnMut(Req) -> impl Future` into an [`Upstream`].
pub fn upstream_fn<F>(f: F) -> UpstreamFn<F> {
    UpstreamFn(f)
}

impl<Req, F, Fut> Upstream<Req> for UpstreamFn<F>
where
    F: FnMut(Req) -> Fut,
    Fut: Future + Send,
{
    type Response = Fut::Output;
    type Future = Fut;

    fn call(&mut self, req: Req) -> Self::Future {
        (self.0)(req)
    }
}
