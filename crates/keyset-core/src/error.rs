//! Error types for the KeySet engine core.
//!
//! Strongly-typed errors per layer: lock errors (state transitions, decoding,
//! credentials), agreement errors (negotiation and rejection), factory and
//! session cipher errors. [`EngineError`] unifies them for the collaborator
//! API.
//!
//! No error carries secret bytes. A wrong password and a tampered lock
//! payload are deliberately the same error.

use keyset_crypto::{ChainError, KeySetError, PersonalisationError};
use keyset_proto::{LockTarget, ProtocolError};
use thiserror::Error;

use crate::{agreement::AgreementState, lock::LockState};

/// Errors from locking and resolving password locks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Operation not allowed in the current state
    #[error("invalid lock state: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: LockState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Lock bytes are not a canonical lock envelope
    #[error("lock decode failed: {0}")]
    Decode(#[from] ProtocolError),

    /// Lock protects a different kind of object than requested
    #[error("lock target mismatch: expected {expected}, found {actual}")]
    TargetMismatch {
        /// Target the caller asked for
        expected: LockTarget,
        /// Target named by the recipe
        actual: LockTarget,
    },

    /// Password did not unlock the payload (or the payload was modified)
    #[error("wrong password")]
    WrongPassword,

    /// Payload unwrapped but does not decode as the locked object
    #[error("locked payload is invalid: {0}")]
    Data(ProtocolError),

    /// Locking KeySet could not be derived
    #[error("locking key set derivation failed: {0}")]
    KeySet(#[from] KeySetError),

    /// Object or lock too large to encode
    #[error("lock encode failed: {0}")]
    Encode(ProtocolError),
}

impl LockError {
    /// Returns true if the caller should ask for the password again.
    ///
    /// Every other lock error is permanent for the given bytes.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::WrongPassword)
    }
}

/// Errors from the agreement state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgreementError {
    /// Operation not allowed in the current state
    #[error("invalid agreement state: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: AgreementState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// The agreement settled as rejected
    #[error("agreement rejected: {reason}")]
    Rejected {
        /// First rejection reason recorded
        reason: String,
    },

    /// The handshake received a malformed or unexpected message
    #[error("handshake failed: {reason}")]
    Handshake {
        /// What went wrong
        reason: String,
    },

    /// Result material could not be derived
    #[error("result derivation failed: {0}")]
    Derive(#[from] KeySetError),
}

/// Errors from security factories.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    /// Context-bound derivation requires a non-empty context
    #[error("derivation context must not be empty")]
    EmptyContext,

    /// KeySet derivation failed
    #[error("key set derivation failed: {0}")]
    KeySet(#[from] KeySetError),
}

/// Errors from session ciphers produced by an agreement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Authentication tag or key did not verify
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Why decryption failed
        reason: String,
    },

    /// Message sequence is older than the next expected one
    #[error("replayed message: expected sequence >= {expected}, got {actual}")]
    Replay {
        /// Next sequence the receiver accepts
        expected: u64,
        /// Sequence carried by the message
        actual: u64,
    },

    /// The outbound sequence counter cannot advance any further
    #[error("sequence numbers exhausted")]
    SequenceExhausted,
}

/// Umbrella error for the collaborator API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Lock or unlock failed
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Agreement failed
    #[error(transparent)]
    Agreement(#[from] AgreementError),

    /// Factory operation failed
    #[error(transparent)]
    Factory(#[from] FactoryError),

    /// KeySet construction failed
    #[error(transparent)]
    KeySet(#[from] KeySetError),

    /// Cipher chain unwrap failed
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Canonical decode failed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Personalisation could not be installed
    #[error(transparent)]
    Personalisation(#[from] PersonalisationError),

    /// A raw key handed to `wrap_key` has the wrong size
    #[error("raw key length: expected {expected}, got {actual}")]
    RawKeyLength {
        /// Key length of the wrapping KeySet
        expected: usize,
        /// Length provided
        actual: usize,
    },
}

impl EngineError {
    /// Returns true if retrying with a different password may succeed.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::Lock(err) if err.is_credential_failure())
    }
}
