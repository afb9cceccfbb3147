//! Session ciphers handed out by an agreement.
//!
//! Nonce suffixes come from the caller, so a seeded test replays every
//! ciphertext exactly.

use chacha20::{
    ChaCha20,
    cipher::{KeyIvInit, StreamCipher, StreamCipherSeek},
};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use zeroize::Zeroizing;

use crate::error::SessionError;

/// Size of the random suffix in the nonce (8 bytes)
pub const NONCE_RANDOM_SIZE: usize = 8;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Size of a session key
pub const SESSION_KEY_SIZE: usize = 32;

/// Size of a keystream nonce (IETF ChaCha20)
pub const STREAM_NONCE_SIZE: usize = 12;

/// Traffic direction, bound into every nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server
    ClientToServer,
    /// Server to client
    ServerToClient,
}

impl Direction {
    fn wire_value(self) -> u32 {
        match self {
            Self::ClientToServer => 1,
            Self::ServerToClient => 2,
        }
    }
}

/// A sealed message with the metadata needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    /// Sender's sequence number
    pub sequence: u64,
    /// The 24-byte `XChaCha20` nonce
    pub nonce: [u8; 24],
    /// The ciphertext including 16-byte Poly1305 tag
    pub ciphertext: Vec<u8>,
}

impl SealedMessage {
    /// Plaintext length (ciphertext length minus authentication tag).
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(POLY1305_TAG_SIZE)
    }
}

/// One direction of an authenticated session using `XChaCha20-Poly1305`.
///
/// # Invariants
///
/// - Outbound sequence numbers strictly increase
/// - Inbound messages below the next expected sequence are rejected
pub struct SessionCipher {
    key: Zeroizing<[u8; SESSION_KEY_SIZE]>,
    direction: Direction,
    next_sequence: u64,
}

impl SessionCipher {
    /// Create a cipher for one direction.
    pub fn new(key: Zeroizing<[u8; SESSION_KEY_SIZE]>, direction: Direction) -> Self {
        Self { key, direction, next_sequence: 0 }
    }

    /// Direction this cipher protects.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Next sequence number to be sealed or accepted.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Encrypt `plaintext` as the next message in this direction.
    ///
    /// # Security
    ///
    /// - Nonce is unique per (direction, sequence, random suffix)
    /// - Caller MUST provide cryptographically secure random bytes in
    ///   production
    ///
    /// # Errors
    ///
    /// - `SessionError::SequenceExhausted` once `u64::MAX` messages were sent
    pub fn seal(
        &mut self,
        plaintext: &[u8],
        random_suffix: [u8; NONCE_RANDOM_SIZE],
    ) -> Result<SealedMessage, SessionError> {
        let sequence = self.next_sequence;
        let next = sequence.checked_add(1).ok_or(SessionError::SequenceExhausted)?;

        let nonce = build_nonce(sequence, self.direction, random_suffix);
        let cipher = XChaCha20Poly1305::new((&*self.key).into());

        let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
            unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
        };

        self.next_sequence = next;
        Ok(SealedMessage { sequence, nonce, ciphertext })
    }

    /// Decrypt a message sealed by the peer's matching cipher.
    ///
    /// # Errors
    ///
    /// - `SessionError::Replay` if the sequence was already accepted
    /// - `SessionError::DecryptionFailed` if the nonce does not bind this
    ///   direction and sequence, or authentication fails
    pub fn open(&mut self, message: &SealedMessage) -> Result<Vec<u8>, SessionError> {
        if message.sequence < self.next_sequence {
            return Err(SessionError::Replay { expected: self.next_sequence, actual: message.sequence });
        }

        let mut suffix = [0u8; NONCE_RANDOM_SIZE];
        suffix.copy_from_slice(&message.nonce[16..24]);
        if build_nonce(message.sequence, self.direction, suffix) != message.nonce {
            return Err(SessionError::DecryptionFailed { reason: "nonce binding mismatch".to_owned() });
        }

        let cipher = XChaCha20Poly1305::new((&*self.key).into());
        let plaintext = cipher
            .decrypt(XNonce::from_slice(&message.nonce), message.ciphertext.as_slice())
            .map_err(|_| SessionError::DecryptionFailed { reason: "authentication failed".to_owned() })?;

        self.next_sequence = message.sequence.saturating_add(1);
        Ok(plaintext)
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher")
            .field("direction", &self.direction)
            .field("next_sequence", &self.next_sequence)
            .finish_non_exhaustive()
    }
}

/// Build a 24-byte nonce for `XChaCha20`.
///
/// Structure:
/// - bytes 0-7: sequence (big-endian)
/// - bytes 8-11: direction (big-endian)
/// - bytes 12-15: zero
/// - bytes 16-23: random suffix (caller-provided)
fn build_nonce(sequence: u64, direction: Direction, random_suffix: [u8; NONCE_RANDOM_SIZE]) -> [u8; 24] {
    let mut nonce = [0u8; 24];
    nonce[0..8].copy_from_slice(&sequence.to_be_bytes());
    nonce[8..12].copy_from_slice(&direction.wire_value().to_be_bytes());
    nonce[16..24].copy_from_slice(&random_suffix);
    nonce
}

/// One direction of a raw ChaCha20 keystream.
///
/// Unauthenticated: callers that need integrity use [`SessionCipher`].
pub struct StreamKeystream {
    cipher: ChaCha20,
    direction: Direction,
}

impl StreamKeystream {
    /// Create a keystream from a key and nonce.
    pub fn new(
        key: &[u8; SESSION_KEY_SIZE],
        nonce: &[u8; STREAM_NONCE_SIZE],
        direction: Direction,
    ) -> Self {
        Self { cipher: ChaCha20::new(key.into(), nonce.into()), direction }
    }

    /// Direction this keystream protects.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// XOR the next keystream bytes into `buf`.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.cipher.apply_keystream(buf);
    }

    /// Current keystream position in bytes.
    pub fn position(&self) -> u64 {
        self.cipher.current_pos()
    }

    /// Move to an absolute keystream position.
    pub fn seek(&mut self, position: u64) {
        self.cipher.seek(position);
    }
}

impl std::fmt::Debug for StreamKeystream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamKeystream")
            .field("direction", &self.direction)
            .field("position", &self.position())
            .finish_non_exhaustive()
    }
}
