//! Canonical wire format for the KeySet engine.
//!
//! Every persisted structure (KeySetSpec, KeySet, Recipe, lock envelope) has
//! exactly one byte encoding: a versionless DER tree read and written with
//! the RustCrypto `der` crate. Decoders reject non-canonical input instead of
//! normalizing it, so `encode(decode(bytes)) == bytes` for every accepted
//! input.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Canonical trait (encoded_len/encode/decode)  │
//! ├───────────────┬───────────────┬──────────────┤
//! │ KeySetSpec    │ Recipe        │ LockEnvelope │
//! │ KeySet        │               │              │
//! ├───────────────┴───────────────┴──────────────┤
//! │ tlv: read_sequence/write_integer/... (der)   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Length helpers compute exact sizes from a spec alone, without key
//! material, so callers can size buffers before deriving anything.
//!
//! # Errors
//!
//! [`ProtocolError::kind`] splits failures into `Io` (not a well-formed tree)
//! and `Data` (well-formed but unacceptable values).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod canonical;
pub mod errors;
mod key_set;
mod recipe;
pub mod tlv;

pub use canonical::Canonical;
pub use der;
pub use errors::{ErrorKind, ProtocolError, Result};
pub use key_set::{key_set_encoded_len, spec_encoded_len};
pub use recipe::{
    INIT_VECTOR_SIZE, LockEnvelope, LockTarget, Recipe, SEED_SIZE, lock_encoded_len, recipe_encoded_len,
};
