//! Environment abstraction for deterministic testing.
//!
//! Decouples the session pipeline from system resources (time, randomness),
//! so admission logic and HMAC verification can be exercised with a fake
//! clock and a seeded RNG in tests while production wires up real ones.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Abstract environment providing time, randomness, and async primitives.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use virtual time (e.g., `turmoil::Instant`).
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    ///
    /// # Invariants
    ///
    /// - This method MUST return values that never decrease within a single
    ///   execution context. Subsequent calls must return times >= previous
    ///   calls.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not protocol logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// This is a convenience method for common use cases like generating
    /// session IDs or request IDs.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random `u128`.
    ///
    /// Used to mint the session-UUID for a freshly accepted connection.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }

    /// Current wall-clock time as Unix seconds.
    ///
    /// Used to stamp `first_seen`/`last_seen` annotations and to derive
    /// today's `YYYYMMDD` counter bucket. Unlike [`Environment::now`], this is
    /// wall-clock (not monotonic) because it feeds externally visible dates.
    fn unix_time_secs(&self) -> u64;
}

/// Production environment: real system clock and OS-backed CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("OS entropy source unavailable");
    }

    fn unix_time_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_secs()
    }
}

/// Test-only environment with a pinned wall clock and deterministic
/// "randomness", shared with other modules' test suites.
///
/// Gated on `feature = "test-util"` as well as `cfg(test)` so downstream
/// crates (`d4-server`'s tests) can depend on this crate with that feature
/// enabled and reuse [`ManualEnv`] instead of rolling their own.
#[cfg(any(test, feature = "test-util"))]
pub mod tests {
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };

    use super::*;

    #[derive(Debug, Clone)]
    pub struct ManualEnv {
        unix_secs: Arc<AtomicU64>,
    }

    impl ManualEnv {
        #[must_use]
        pub fn new(unix_secs: u64) -> Self {
            Self { unix_secs: Arc::new(AtomicU64::new(unix_secs)) }
        }
    }

    impl Environment for ManualEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(0x42);
        }

        fn unix_time_secs(&self) -> u64 {
            self.unix_secs.load(Ordering::Relaxed)
        }
    }
}
