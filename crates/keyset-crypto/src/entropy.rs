//! Entropy abstraction for deterministic testing.
//!
//! Decouples key generation from the OS RNG. Production code uses
//! [`SystemEntropy`]; tests and the KDF use [`SeededStream`], a ChaCha20
//! stream that replays the same bytes for the same seed.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Source of random bytes.
///
/// # Invariants
///
/// - Production implementations MUST use cryptographically secure entropy
/// - Given the same seed, seeded implementations produce the same sequence
pub trait Entropy {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&mut self, buffer: &mut [u8]);

    /// Generates a random `u32` (big-endian interpretation of 4 bytes).
    fn random_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    /// Generates a random 32-byte array.
    fn random_array32(&mut self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.random_bytes(&mut bytes);
        bytes
    }
}

impl<E: Entropy + ?Sized> Entropy for &mut E {
    fn random_bytes(&mut self, buffer: &mut [u8]) {
        (**self).random_bytes(buffer);
    }
}

/// OS-backed entropy.
///
/// # Panics
///
/// Panics if the OS RNG fails. Generating keys without functioning
/// cryptographic randomness is never acceptable, and the failure indicates an
/// OS-level problem the caller cannot recover from.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEntropy;

impl SystemEntropy {
    /// Create a new system entropy source.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Entropy for SystemEntropy {
    #[allow(clippy::expect_used)]
    fn random_bytes(&mut self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - keys cannot be generated");
    }
}

/// Deterministic ChaCha20 stream seeded from 32 bytes.
///
/// Used as the KDF's seeded random stream (seed stored in a lock recipe) and
/// as reproducible entropy in tests.
#[derive(Clone)]
pub struct SeededStream {
    rng: ChaCha20Rng,
}

impl SeededStream {
    /// Create a stream from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { rng: ChaCha20Rng::from_seed(seed) }
    }

    /// Create a stream from a small integer seed (tests and fixtures).
    #[must_use]
    pub fn from_u64(seed: u64) -> Self {
        Self { rng: ChaCha20Rng::seed_from_u64(seed) }
    }

    /// Next 32-bit value from the stream.
    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }
}

impl Entropy for SeededStream {
    fn random_bytes(&mut self, buffer: &mut [u8]) {
        self.rng.fill_bytes(buffer);
    }
}

impl std::fmt::Debug for SeededStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeededStream").finish_non_exhaustive()
    }
}
