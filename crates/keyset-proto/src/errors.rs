//! Protocol error types.

use keyset_crypto::{CipherAlgorithmId, KeySetError};

/// Result alias for canonical encoding operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Coarse classification of a decode failure.
///
/// `Io` means the bytes are not a well-formed TLV tree. `Data` means the tree
/// is well-formed but its values are unacceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structural failure while reading the tree
    Io,
    /// Well-formed tree with invalid contents
    Data,
}

/// Errors that occur while decoding canonical bytes.
///
/// Never carries secret bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Malformed DER: short input, wrong tag, bad length or integer encoding
    #[error("Unable to parse sequence")]
    Parse {
        /// Why the reader gave up
        reason: String,
    },

    /// A value too large for the canonical encoding
    #[error("unable to encode: {reason}")]
    Encode {
        /// Why the writer gave up
        reason: String,
    },

    /// A sequence (or the root) held more elements than its shape allows
    #[error("Unexpected additional values")]
    UnexpectedValues,

    /// Empty input or a NULL where a sequence was expected
    #[error("Null sequence")]
    NullSequence,

    /// Algorithm wire value outside `1..=N`
    #[error("invalid cipher algorithm id: {value}")]
    InvalidAlgorithm {
        /// Wire value as decoded
        value: u64,
    },

    /// The same algorithm appears twice in one KeySet
    #[error("duplicate cipher algorithm: {algorithm}")]
    DuplicateAlgorithm {
        /// Repeated algorithm
        algorithm: CipherAlgorithmId,
    },

    /// Key length does not match the KeySet spec
    #[error("invalid key length for {algorithm}: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Algorithm owning the key
        algorithm: CipherAlgorithmId,
        /// Length required by the spec
        expected: usize,
        /// Length found
        actual: usize,
    },

    /// Key length or cipher count outside the supported range
    #[error("invalid key set spec: {key_length_bits} bits, {cipher_count} ciphers")]
    InvalidSpec {
        /// Decoded key length in bits
        key_length_bits: u64,
        /// Decoded cipher count
        cipher_count: u64,
    },

    /// A fixed-size field or element count has the wrong size
    #[error("invalid {field}: expected {expected}, got {actual}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Required size
        expected: usize,
        /// Size found
        actual: usize,
    },

    /// An enumerated INTEGER field holds an unknown value
    #[error("invalid {field}: {value}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Wire value as decoded
        value: u64,
    },

    /// A text field is not valid UTF-8
    #[error("invalid {field}: not UTF-8")]
    InvalidText {
        /// Field name
        field: &'static str,
    },

    /// Recipe target is neither factory nor key set
    #[error("unknown lock target: {value}")]
    UnknownTarget {
        /// Wire value as decoded
        value: u64,
    },
}

impl ProtocolError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } | Self::Encode { .. } => ErrorKind::Io,
            Self::UnexpectedValues
            | Self::NullSequence
            | Self::InvalidAlgorithm { .. }
            | Self::DuplicateAlgorithm { .. }
            | Self::InvalidKeyLength { .. }
            | Self::InvalidSpec { .. }
            | Self::InvalidField { .. }
            | Self::InvalidValue { .. }
            | Self::InvalidText { .. }
            | Self::UnknownTarget { .. } => ErrorKind::Data,
        }
    }

    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::Parse { reason: reason.into() }
    }

    /// Wrap a `der` failure that happened while encoding.
    pub fn encode(err: der::Error) -> Self {
        Self::Encode { reason: err.to_string() }
    }
}

impl From<der::Error> for ProtocolError {
    fn from(err: der::Error) -> Self {
        match err.kind() {
            der::ErrorKind::TrailingData { .. } => Self::UnexpectedValues,
            _ => Self::parse(err.to_string()),
        }
    }
}

impl From<KeySetError> for ProtocolError {
    fn from(err: KeySetError) -> Self {
        match err {
            KeySetError::InvalidSpec { key_length_bits, cipher_count } => {
                Self::InvalidSpec { key_length_bits, cipher_count }
            },
            KeySetError::DuplicateAlgorithm { algorithm } => Self::DuplicateAlgorithm { algorithm },
            KeySetError::InvalidKeyLength { algorithm, expected, actual } => {
                Self::InvalidKeyLength { algorithm, expected, actual }
            },
            KeySetError::WrongEntryCount { expected, actual } => {
                Self::InvalidField { field: "key entries", expected, actual }
            },
            // Decoding never runs the KDF
            KeySetError::Derive(_) => Self::parse("unexpected derivation failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_wire_contract() {
        assert_eq!(ProtocolError::parse("x").to_string(), "Unable to parse sequence");
        assert_eq!(ProtocolError::UnexpectedValues.to_string(), "Unexpected additional values");
        assert_eq!(ProtocolError::NullSequence.to_string(), "Null sequence");
    }

    #[test]
    fn only_parse_failures_are_io() {
        assert_eq!(ProtocolError::parse("x").kind(), ErrorKind::Io);
        assert_eq!(ProtocolError::UnexpectedValues.kind(), ErrorKind::Data);
        assert_eq!(ProtocolError::NullSequence.kind(), ErrorKind::Data);
        assert_eq!(ProtocolError::InvalidAlgorithm { value: 9 }.kind(), ErrorKind::Data);
        assert_eq!(ProtocolError::UnknownTarget { value: 0 }.kind(), ErrorKind::Data);
    }

    #[test]
    fn der_errors_map_to_io_except_trailing_data() {
        let truncated = ProtocolError::from(der::Error::incomplete(der::Length::ONE));
        assert!(matches!(truncated, ProtocolError::Parse { .. }));
        assert_eq!(truncated.kind(), ErrorKind::Io);

        let trailing = der::ErrorKind::TrailingData { decoded: der::Length::ONE, remaining: der::Length::ONE };
        assert_eq!(ProtocolError::from(der::Error::from(trailing)), ProtocolError::UnexpectedValues);
    }

    #[test]
    fn key_set_errors_map_to_data() {
        let err = ProtocolError::from(KeySetError::WrongEntryCount { expected: 2, actual: 1 });
        assert_eq!(err, ProtocolError::InvalidField { field: "key entries", expected: 2, actual: 1 });
        assert_eq!(err.kind(), ErrorKind::Data);
    }
}
