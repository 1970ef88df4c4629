//! Request deduplication.
//!
//! The first caller for a key registers and fetches; later callers for the
//! same key wait for its settlement instead of calling the transport.
//!
//! - [`ConcurrencyDecision::Proceed`] hands out a [`FetchGuard`]. Resolving it
//!   wakes every waiter. Dropping it unresolved (the owner was cancelled)
//!   wakes them with [`ConcurrencyError::Closed`].
//! - [`ConcurrencyDecision::Await`] hands out a [`WaitHandle`].
//!
//! A registration past its deadline is replaced by the next caller.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cachet_core::CacheKey;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Why a [`WaitHandle`] did not receive a value.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyError {
    /// The owner went away without settling.
    #[error("in-flight request was abandoned")]
    Closed,
    /// The waiter's own timeout elapsed.
    #[error("timed out waiting for in-flight request")]
    Timeout,
}

/// Result of [`WaitingRegistry::check`].
pub enum ConcurrencyDecision<T> {
    /// No request in flight: fetch and resolve the guard.
    Proceed(FetchGuard<T>),
    /// Another caller is fetching: wait for it.
    Await(WaitHandle<T>),
}

impl<T> fmt::Debug for ConcurrencyDecision<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyDecision::Proceed(guard) => f.debug_tuple("Proceed").field(guard).finish(),
            ConcurrencyDecision::Await(handle) => f.debug_tuple("Await").field(handle).finish(),
        }
    }
}

struct Waiting<T> {
    id: u64,
    receiver: watch::Receiver<Option<T>>,
    deadline: Option<Instant>,
}

type Entries<T> = Arc<DashMap<CacheKey, Waiting<T>>>;

/// Keys with a fetch in flight.
pub struct WaitingRegistry<T> {
    entries: Entries<T>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for WaitingRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T> Default for WaitingRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T> fmt::Debug for WaitingRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitingRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<T> WaitingRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` or joins the fetch already registered for it.
    ///
    /// `timeout` bounds the registration: once it passes, the next caller
    /// takes over instead of waiting.
    pub fn check(&self, key: &CacheKey, timeout: Option<Duration>) -> ConcurrencyDecision<T> {
        let now = Instant::now();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let waiting = occupied.get();
                if waiting.deadline.is_some_and(|deadline| now >= deadline) {
                    warn!(key = %key, "in-flight request exceeded its deadline, taking over");
                    let (guard, waiting) = self.register(key, now, timeout);
                    occupied.insert(waiting);
                    return ConcurrencyDecision::Proceed(guard);
                }
                debug!(key = %key, "joining in-flight request");
                ConcurrencyDecision::Await(WaitHandle {
                    key: key.clone(),
                    id: waiting.id,
                    receiver: waiting.receiver.clone(),
                    entries: Arc::clone(&self.entries),
                })
            }
            Entry::Vacant(vacant) => {
                let (guard, waiting) = self.register(key, now, timeout);
                vacant.insert(waiting);
                ConcurrencyDecision::Proceed(guard)
            }
        }
    }

    fn register(
        &self,
        key: &CacheKey,
        now: Instant,
        timeout: Option<Duration>,
    ) -> (FetchGuard<T>, Waiting<T>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(None);
        let guard = FetchGuard {
            key: key.clone(),
            id,
            sender,
            entries: Arc::clone(&self.entries),
            settled: false,
        };
        let waiting = Waiting {
            id,
            receiver,
            deadline: timeout.and_then(|timeout| now.checked_add(timeout)),
        };
        (guard, waiting)
    }

    /// Drops the registration for `key`. Callers already waiting keep
    /// waiting for the owner they joined.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Whether a fetch is registered for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ownership of one in-flight fetch.
#[must_use = "dropping the guard abandons the fetch"]
pub struct FetchGuard<T> {
    key: CacheKey,
    id: u64,
    sender: watch::Sender<Option<T>>,
    entries: Entries<T>,
    settled: bool,
}

impl<T> fmt::Debug for FetchGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchGuard")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl<T> FetchGuard<T> {
    /// Key this guard owns.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Unregisters the key and hands `value` to every waiter.
    pub fn resolve(mut self, value: T) {
        self.unregister();
        self.sender.send_replace(Some(value));
        self.settled = true;
    }

    fn unregister(&self) {
        self.entries.remove_if(&self.key, |_, waiting| waiting.id == self.id);
    }
}

impl<T> Drop for FetchGuard<T> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(key = %self.key, "in-flight request abandoned");
            self.unregister();
        }
    }
}

/// A caller waiting for another caller's fetch.
pub struct WaitHandle<T> {
    key: CacheKey,
    id: u64,
    receiver: watch::Receiver<Option<T>>,
    entries: Entries<T>,
}

impl<T> fmt::Debug for WaitHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl<T: Clone> WaitHandle<T> {
    /// Waits for the owner to settle.
    ///
    /// When `timeout` elapses only this caller gives up. The registration is
    /// dropped so the next caller fetches on its own.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<T, ConcurrencyError> {
        let Some(timeout) = timeout else {
            return Self::settled(&mut self.receiver).await;
        };
        match tokio::time::timeout(timeout, Self::settled(&mut self.receiver)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(key = %self.key, ?timeout, "gave up waiting for in-flight request");
                self.entries
                    .remove_if(&self.key, |_, waiting| waiting.id == self.id);
                Err(ConcurrencyError::Timeout)
            }
        }
    }

    async fn settled(receiver: &mut watch::Receiver<Option<T>>) -> Result<T, ConcurrencyError> {
        let value = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ConcurrencyError::Closed)?;
        value.clone().ok_or(ConcurrencyError::Closed)
    }
}
