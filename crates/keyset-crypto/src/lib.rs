//! KeySet Cryptographic Primitives
//!
//! Cryptographic building blocks for the KeySet engine. Pure functions with
//! deterministic outputs. Randomness comes from a caller-provided
//! [`Entropy`] source so tests can replay every byte.
//!
//! # Key Lifecycle
//!
//! A [`KeySet`] is an ordered collection of independent symmetric keys, one
//! per chained cipher family. It is either generated from entropy or derived
//! from a shared secret or password through the iterated-MAC KDF.
//!
//! ```text
//! Password / Shared Secret ──┐
//!                            │   Seeded Stream (Recipe seed)
//!                            ▼          │
//!            Iterated dual-MAC KDF ◄────┘
//!            (Personalisation mixed into every section)
//!                            │
//!                            ▼
//!            KeySet [(Aes, k0), (ChaCha20, k1), ...]
//!                            │
//!                            ▼
//!            Cipher Chain: SIV ‖ stage_n(...stage_1(plaintext))
//! ```
//!
//! # Security
//!
//! Defense in depth:
//! - Every stage uses an independent key and an unrelated primitive family
//! - The synthetic IV is the XOR of one HMAC per stage, so forging it requires
//!   breaking every stage MAC
//!
//! Determinism:
//! - Wrapping is deterministic; identical plaintexts under one KeySet produce
//!   identical ciphertexts and nothing else leaks
//! - Derivation is reproducible from `(secret, iv, seed, length)`
//!
//! Secret hygiene:
//! - Keys, derived bytes and recovered plaintexts live in `Zeroizing` buffers
//! - Unwrap failures never reveal which stage or check failed

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod chain;
pub mod entropy;
pub mod error;
pub mod kdf;
pub mod keyset;
pub mod mac;
pub mod personalisation;

pub use chain::{
    SIV_SIZE, decryption_length, encryption_length, key_set_wrap_length, unwrap, wrap,
};
pub use entropy::{Entropy, SeededStream, SystemEntropy};
pub use error::{ChainError, DeriveError, KeySetError, PersonalisationError};
pub use kdf::{derive, derive_for_slot, derive_with};
pub use keyset::{CipherAlgorithmId, KeyLength, KeySet, KeySetSpec};
pub use mac::MacAlgorithm;
pub use personalisation::{DEFAULT_SEED_PHRASE, Personalisation};
