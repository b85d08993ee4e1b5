//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness). Enables
//! deterministic simulation (virtual clock, seeded RNG) and production use with
//! real system resources.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

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
    /// environments use [`VirtualInstant`].
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + std::fmt::Debug
        + Sub<Output = Duration>
        + Add<Duration, Output = Self::Instant>;

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

    /// Milliseconds since the Unix epoch.
    ///
    /// Only used for informational timestamps carried inside presence
    /// messages. Protocol timing always uses [`Environment::now`].
    fn wall_clock_millis(&self) -> u64;

    /// Generates a random `u64`.
    ///
    /// This is a convenience method for common use cases like generating
    /// socket IDs.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a fixed-size array of random bytes.
    ///
    /// Used for IVs, ephemeral key seeds and random room tokens.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}

/// Point on a virtual timeline, measured from the start of a simulation.
///
/// Subtraction saturates at zero so an out-of-order comparison never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualInstant(Duration);

impl VirtualInstant {
    /// The start of the timeline.
    pub const ZERO: Self = Self(Duration::ZERO);

    /// Instant at `elapsed` after the start of the timeline.
    pub fn from_elapsed(elapsed: Duration) -> Self {
        Self(elapsed)
    }

    /// Time elapsed since the start of the timeline.
    pub fn elapsed(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for VirtualInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs))
    }
}

impl Sub for VirtualInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Test environments shared by the unit and integration tests of downstream
/// crates.
pub mod test_utils {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    };

    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    use super::{Environment, VirtualInstant};

    /// Wall clock reading at virtual time zero (2024-01-01T00:00:00Z).
    const EPOCH_MILLIS: u64 = 1_704_067_200_000;

    /// Deterministic environment with a manually advanced clock.
    ///
    /// Randomness is a seeded ChaCha20 keystream. Clones share the clock and
    /// the stream position.
    #[derive(Debug, Clone)]
    pub struct MockEnv {
        seed: u64,
        clock_nanos: Arc<AtomicU64>,
        word_pos: Arc<AtomicU64>,
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockEnv {
        /// Create an environment at virtual time zero with a fixed seed.
        pub fn new() -> Self {
            Self::with_seed(0x5eed)
        }

        /// Create an environment whose random stream is keyed by `seed`.
        pub fn with_seed(seed: u64) -> Self {
            Self {
                seed,
                clock_nanos: Arc::new(AtomicU64::new(0)),
                word_pos: Arc::new(AtomicU64::new(0)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, duration: Duration) {
            let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
            self.clock_nanos.fetch_add(nanos, Ordering::SeqCst);
        }
    }

    impl Environment for MockEnv {
        type Instant = VirtualInstant;

        fn now(&self) -> Self::Instant {
            VirtualInstant::from_elapsed(Duration::from_nanos(
                self.clock_nanos.load(Ordering::SeqCst),
            ))
        }

        fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            self.advance(duration);
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            // Reserve whole 32-bit words so clones never reuse keystream.
            let words = buffer.len().div_ceil(4) as u64;
            let start = self.word_pos.fetch_add(words, Ordering::SeqCst);

            let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
            rng.set_word_pos(u128::from(start));
            rng.fill_bytes(buffer);
        }

        fn wall_clock_millis(&self) -> u64 {
            let elapsed = self.now().elapsed().as_millis() as u64;
            EPOCH_MILLIS + elapsed
        }
    }
}
