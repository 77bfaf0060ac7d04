//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from wall-clock time and randomness so tests can
//! drive a [`Client`](crate) deterministically instead of racing real
//! timers.

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration. The only async method in the
    /// trait; driver code only, never protocol logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u16`, used for RPC request IDs (§4.3).
    fn random_u16(&self) -> u16 {
        let mut bytes = [0u8; 2];
        self.random_bytes(&mut bytes);
        u16::from_be_bytes(bytes)
    }
}

/// A production [`Environment`] backed by `std`/`tokio`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::thread_rng().fill_bytes(buffer);
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils {
    //! A deterministic [`Environment`] for unit tests: virtual clock,
    //! seeded counter standing in for randomness.

    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::Environment;

    /// A deterministic virtual instant: nanoseconds since the clock's
    /// epoch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub struct MockInstant(u64);

    impl std::ops::Sub for MockInstant {
        type Output = Duration;

        fn sub(self, rhs: Self) -> Duration {
            Duration::from_nanos(self.0.saturating_sub(rhs.0))
        }
    }

    #[derive(Debug, Clone)]
    struct Inner {
        now_ns: u64,
        rng_state: u64,
    }

    /// A test [`Environment`] whose clock only advances when [`MockEnv::advance`]
    /// is called, and whose "randomness" is a deterministic counter.
    #[derive(Debug, Clone)]
    pub struct MockEnv {
        inner: Arc<Mutex<Inner>>,
    }

    impl MockEnv {
        /// Build a fresh mock environment at time zero.
        #[must_use]
        pub fn new() -> Self {
            Self { inner: Arc::new(Mutex::new(Inner { now_ns: 0, rng_state: 0x9E37_79B9 })) }
        }

        /// Advance the virtual clock by `duration`.
        pub fn advance(&self, duration: Duration) {
            let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            inner.now_ns += duration.as_nanos() as u64;
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = MockInstant;

        fn now(&self) -> Self::Instant {
            MockInstant(self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner).now_ns)
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            for byte in buffer.iter_mut() {
                // xorshift64 — deterministic, not secure, fine for tests.
                inner.rng_state ^= inner.rng_state << 13;
                inner.rng_state ^= inner.rng_state >> 7;
                inner.rng_state ^= inner.rng_state << 17;
                *byte = inner.rng_state as u8;
            }
        }
    }
}
