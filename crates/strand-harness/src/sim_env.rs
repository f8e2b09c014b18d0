//! Deterministic environment for simulation.
//!
//! Time only moves when the test advances it and randomness comes from a
//! seeded ChaCha stream, so the same seed replays the same run. Clones share
//! the clock and the RNG.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strand_timeline::{Environment, Timestamp};

/// Wall-clock time every simulation starts at (2023-11-14T22:13:20Z).
pub const SIM_EPOCH: Timestamp = Timestamp::from_millis(1_700_000_000_000);

/// Simulated [`Environment`].
#[derive(Debug, Clone)]
pub struct SimEnv {
    clock: Arc<AtomicU64>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment at [`SIM_EPOCH`] with an RNG seeded from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(AtomicU64::new(SIM_EPOCH.as_millis())),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.clock.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the clock. Wall-clock time may step backwards.
    pub fn set_now(&self, now: Timestamp) {
        self.clock.store(now.as_millis(), Ordering::SeqCst);
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.clock.load(Ordering::SeqCst))
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
