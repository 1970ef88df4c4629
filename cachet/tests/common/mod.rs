#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cachet::{Cache, CachePolicy};
use cachet_backend::MemoryBackend;
use cachet_core::clock::MockClock;
use cachet_core::{Request, Response, Upstream};
use http::StatusCode;
use thiserror::Error;

pub mod spans;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("transport failed: {0}")]
pub struct TransportError(pub &'static str);

type Reply = dyn Fn(&Request, usize) -> Result<Response, TransportError> + Send + Sync;

/// Scripted transport that counts calls and records what it was sent.
#[derive(Clone)]
pub struct Transport {
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Request>>>,
    reply: Arc<Reply>,
    delay: Duration,
}

impl Transport {
    /// `reply` receives the request and the 1-based call number.
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(&Request, usize) -> Result<Response, TransportError> + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            reply: Arc::new(reply),
            delay: Duration::ZERO,
        }
    }

    pub fn ok(body: &'static str) -> Self {
        Self::new(move |_, _| Ok(Response::ok(body)))
    }

    pub fn status(status: StatusCode) -> Self {
        Self::new(move |_, _| Ok(Response::new(status, "failed")))
    }

    pub fn failing() -> Self {
        Self::new(|_, _| Err(TransportError("connection reset")))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_request(&self) -> Request {
        self.requests().pop().expect("transport was never called")
    }
}

impl Upstream<Request> for Transport {
    type Response = Result<Response, TransportError>;
    type Future = Pin<Box<dyn Future<Output = Self::Response> + Send>>;

    fn call(&mut self, request: Request) -> Self::Future {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let result = (self.reply)(&request, call);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

pub type TestCache = Cache<MemoryBackend, TransportError>;

pub fn memory_cache(clock: &MockClock, policy: impl Into<CachePolicy>) -> TestCache {
    Cache::builder()
        .backend(MemoryBackend::builder().clock(clock.clone()).build())
        .clock(clock.clone())
        .policy(policy)
        .build()
        .expect("memory backend is valid")
}

pub fn get(url: &str) -> Request {
    Request::get(format!("https://api.example.com{url}"))
}
