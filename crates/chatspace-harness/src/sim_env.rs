//! Simulation environment with a virtual clock and seeded ChaCha20 RNG.
//!
//! Every clone shares the same clock and the same random stream, so a whole
//! simulated network (relay plus clients) replays identically from one seed.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chatspace_core::{Environment, VirtualInstant};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Wall clock reading at virtual time zero (2024-01-01T00:00:00Z).
const EPOCH_MILLIS: u64 = 1_704_067_200_000;

/// Deterministic environment for simulations.
///
/// Random bytes are read from a ChaCha20 keystream at a shared word offset.
/// Each draw reserves its words up front, so concurrent clones never hand out
/// the same bytes twice and no lock is needed.
#[derive(Debug, Clone)]
pub struct SimEnv {
    seed: u64,
    clock_nanos: Arc<AtomicU64>,
    word_pos: Arc<AtomicU64>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Create an environment with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create an environment whose random stream is keyed by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            clock_nanos: Arc::new(AtomicU64::new(0)),
            word_pos: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Seed this environment was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.clock_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Virtual time since the start of the simulation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.clock_nanos.load(Ordering::SeqCst))
    }
}

impl Environment for SimEnv {
    type Instant = VirtualInstant;

    fn now(&self) -> Self::Instant {
        VirtualInstant::from_elapsed(self.elapsed())
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let words = buffer.len().div_ceil(4) as u64;
        let start = self.word_pos.fetch_add(words, Ordering::SeqCst);

        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
        rng.set_word_pos(u128::from(start));
        rng.fill_bytes(buffer);
    }

    fn wall_clock_millis(&self) -> u64 {
        EPOCH_MILLIS + self.elapsed().as_millis() as u64
    }
}
