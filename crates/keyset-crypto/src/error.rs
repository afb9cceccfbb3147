//! Error types for KeySet cryptographic operations

use thiserror::Error;

use crate::keyset::CipherAlgorithmId;

/// Errors from the key derivation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeriveError {
    /// The secret to derive from was empty
    #[error("cannot derive from an empty secret")]
    EmptySecret,

    /// Zero output bytes were requested
    #[error("derived output length must be non-zero")]
    ZeroLength,

    /// Requested output does not fit the 32-bit length field
    #[error("derived output length {requested} exceeds u32::MAX")]
    LengthTooLarge {
        /// Requested number of bytes
        requested: usize,
    },
}

/// Errors from building or validating a [`crate::KeySet`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySetError {
    /// Key length or cipher count outside the supported range
    #[error("invalid key set spec: {key_length_bits}-bit keys, {cipher_count} ciphers")]
    InvalidSpec {
        /// Requested key length in bits
        key_length_bits: u64,
        /// Requested number of chained ciphers
        cipher_count: u64,
    },

    /// The same cipher algorithm appears twice
    #[error("duplicate cipher algorithm: {algorithm}")]
    DuplicateAlgorithm {
        /// The repeated algorithm
        algorithm: CipherAlgorithmId,
    },

    /// A key does not match the spec's key length
    #[error("invalid key length for {algorithm}: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Algorithm the key belongs to
        algorithm: CipherAlgorithmId,
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// Number of keys differs from the spec's cipher count
    #[error("wrong number of keys: expected {expected}, got {actual}")]
    WrongEntryCount {
        /// Cipher count from the spec
        expected: usize,
        /// Keys supplied
        actual: usize,
    },

    /// Key derivation failed
    #[error("key derivation failed: {0}")]
    Derive(#[from] DeriveError),
}

/// Errors from the cipher chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Ciphertext was too short, corrupted, or wrapped under another KeySet.
    ///
    /// Deliberately carries no detail about which check failed.
    #[error("unwrap failed: integrity check did not pass")]
    UnwrapFailed,
}

/// Errors from installing the process-wide personalisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PersonalisationError {
    /// A different seed phrase was already installed for this process
    #[error("personalisation already initialized with a different seed phrase")]
    AlreadyInitialized,
}

impl KeySetError {
    /// Returns true if the error came from malformed caller input rather than
    /// a derivation failure.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::Derive(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_error_converts_into_key_set_error() {
        let err: KeySetError = DeriveError::EmptySecret.into();
        assert_eq!(err, KeySetError::Derive(DeriveError::EmptySecret));
        assert!(!err.is_structural());
    }

    #[test]
    fn structural_errors() {
        assert!(KeySetError::WrongEntryCount { expected: 2, actual: 1 }.is_structural());
        assert!(
            KeySetError::DuplicateAlgorithm { algorithm: CipherAlgorithmId::Aes }.is_structural()
        );
    }

    #[test]
    fn error_display() {
        let err = KeySetError::InvalidKeyLength {
            algorithm: CipherAlgorithmId::ChaCha20,
            expected: 32,
            actual: 16,
        };
        assert_eq!(err.to_string(), "invalid key length for ChaCha20: expected 32 bytes, got 16");
        assert_eq!(ChainError::UnwrapFailed.to_string(), "unwrap failed: integrity check did not pass");
    }
}
