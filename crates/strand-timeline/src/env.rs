//! Environment abstraction for deterministic testing.
//!
//! The timeline reads the clock when stamping local echoes and draws one
//! random nonce for echo placeholder ids. Both go through [`Environment`] so a
//! simulation can pin them.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

use crate::event::Timestamp;

/// Source of wall-clock time and randomness.
///
/// # Invariants
///
/// - `now()` is wall-clock time, not monotonic. It may step backwards; the
///   timeline never relies on it for ordering.
/// - Given the same seed, a simulated implementation produces the same
///   sequence from `random_u64()`.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current wall-clock time.
    fn now(&self) -> Timestamp;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Production environment using the system clock and thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Timestamp {
        // A clock set before 1970 reads as the epoch.
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        Timestamp::from_millis(millis)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::thread_rng().fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_reads_wall_clock() {
        let env = SystemEnv::new();
        // 2020-01-01T00:00:00Z
        assert!(env.now().as_millis() > 1_577_836_800_000);
    }

    #[test]
    fn system_env_random_bytes_are_random() {
        let env = SystemEnv::new();

        let mut bytes1 = [0u8; 32];
        let mut bytes2 = [0u8; 32];
        env.random_bytes(&mut bytes1);
        env.random_bytes(&mut bytes2);

        assert_ne!(bytes1, bytes2, "Random bytes should differ");
    }
}
