//! Time source for entry timestamps and expiry checks.
//!
//! Entries carry wall-clock timestamps (`created_at`, loading deadlines), so
//! every component that compares against "now" asks a [`Clock`] instead of
//! calling [`Utc::now`] directly. Production code uses [`SystemClock`]; tests
//! enable the `test-helpers` feature and drive a `MockClock` by hand.

use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use mock::MockClock;

#[cfg(any(test, feature = "test-helpers"))]
mod mock {
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    use chrono::{DateTime, Utc};

    use super::Clock;

    /// Manually advanced clock for tests.
    ///
    /// Clones share the same underlying instant, so a clock handed to a
    /// backend and to the engine moves in lockstep.
    #[derive(Debug, Clone)]
    pub struct MockClock {
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockClock {
        /// Creates a clock frozen at the current system time.
        pub fn new() -> Self {
            Self::at(Utc::now())
        }

        /// Creates a clock frozen at `now`.
        pub fn at(now: DateTime<Utc>) -> Self {
            Self {
                now: Arc::new(Mutex::new(now)),
            }
        }

        /// Moves the clock forward.
        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now += chrono::Duration::from_std(by).expect("mock clock advance out of range");
        }

        /// Sets the clock to an absolute instant.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}
