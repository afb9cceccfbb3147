//! Two-party handshakes feeding an agreement.
//!
//! The agreement state machine only needs a transcript and a shared secret
//! from its handshake. [`PresharedHandshake`] provides both from a
//! pre-shared key and one random nonce per party.
//!
//! ```text
//! Client                          Server
//!   │ ── client_nonce (32) ──────> │
//!   │ <────── server_nonce (32) ── │
//!
//! transcript = client_nonce ‖ server_nonce
//! secret     = HMAC-SHA256(psk, label ‖ transcript ‖ params)
//! ```

use hmac::{Hmac, Mac};
use keyset_crypto::Entropy;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::params::AgreementParams;
use crate::error::AgreementError;

/// Size of a handshake nonce
pub const NONCE_SIZE: usize = 32;

/// Size of a derived shared secret
pub const SHARED_SECRET_SIZE: usize = 32;

const SECRET_LABEL: &[u8] = b"keysetPresharedHandshakeV1";

/// Which side of the handshake this party plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Initiating party
    Client,
    /// Responding party
    Server,
}

/// A two-party handshake producing a shared secret.
///
/// Implementations are message-driven and perform no I/O: the caller moves
/// bytes between [`Handshake::next_message`] and [`Handshake::receive`].
pub trait Handshake {
    /// This party's role.
    fn role(&self) -> Role;

    /// Next outbound message, if any is pending.
    fn next_message(&mut self) -> Option<Vec<u8>>;

    /// Feed one inbound message.
    ///
    /// # Errors
    ///
    /// - `AgreementError::Handshake` on a malformed or unexpected message
    fn receive(&mut self, message: &[u8]) -> Result<(), AgreementError>;

    /// Whether both sides have exchanged everything needed.
    fn is_complete(&self) -> bool;

    /// Role-independent transcript of the exchange. Empty until complete.
    fn transcript(&self) -> Vec<u8>;

    /// Shared secret bound to `params`. `None` until complete.
    fn shared_secret(&self, params: &AgreementParams) -> Option<Zeroizing<[u8; SHARED_SECRET_SIZE]>>;
}

/// Nonce exchange authenticated by a pre-shared key.
pub struct PresharedHandshake {
    role: Role,
    psk: Zeroizing<Vec<u8>>,
    local_nonce: [u8; NONCE_SIZE],
    peer_nonce: Option<[u8; NONCE_SIZE]>,
    sent: bool,
}

impl PresharedHandshake {
    /// Start a handshake with a fresh nonce from `entropy`.
    pub fn new(role: Role, psk: &[u8], entropy: &mut impl Entropy) -> Self {
        Self {
            role,
            psk: Zeroizing::new(psk.to_vec()),
            local_nonce: entropy.random_array32(),
            peer_nonce: None,
            sent: false,
        }
    }

    fn ordered_nonces(&self) -> Option<([u8; NONCE_SIZE], [u8; NONCE_SIZE])> {
        let peer = self.peer_nonce?;
        Some(match self.role {
            Role::Client => (self.local_nonce, peer),
            Role::Server => (peer, self.local_nonce),
        })
    }
}

impl Handshake for PresharedHandshake {
    fn role(&self) -> Role {
        self.role
    }

    fn next_message(&mut self) -> Option<Vec<u8>> {
        // The server answers only after hearing from the client
        let ready = match self.role {
            Role::Client => true,
            Role::Server => self.peer_nonce.is_some(),
        };
        if self.sent || !ready {
            return None;
        }

        self.sent = true;
        Some(self.local_nonce.to_vec())
    }

    fn receive(&mut self, message: &[u8]) -> Result<(), AgreementError> {
        if self.peer_nonce.is_some() {
            return Err(AgreementError::Handshake { reason: "unexpected extra message".to_owned() });
        }

        let nonce = <[u8; NONCE_SIZE]>::try_from(message).map_err(|_| AgreementError::Handshake {
            reason: format!("nonce must be {NONCE_SIZE} bytes, got {}", message.len()),
        })?;
        if nonce == self.local_nonce {
            return Err(AgreementError::Handshake { reason: "reflected nonce".to_owned() });
        }

        self.peer_nonce = Some(nonce);
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.sent && self.peer_nonce.is_some()
    }

    fn transcript(&self) -> Vec<u8> {
        if !self.is_complete() {
            return Vec::new();
        }
        self.ordered_nonces()
            .map(|(client, server)| [client, server].concat())
            .unwrap_or_default()
    }

    fn shared_secret(&self, params: &AgreementParams) -> Option<Zeroizing<[u8; SHARED_SECRET_SIZE]>> {
        if !self.is_complete() {
            return None;
        }
        let (client, server) = self.ordered_nonces()?;

        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&self.psk) else {
            unreachable!("HMAC accepts any key size");
        };
        mac.update(SECRET_LABEL);
        mac.update(&client);
        mac.update(&server);
        mac.update(&params.binding_bytes());

        let mut secret = Zeroizing::new([0u8; SHARED_SECRET_SIZE]);
        secret.copy_from_slice(&mac.finalize().into_bytes());
        Some(secret)
    }
}

impl std::fmt::Debug for PresharedHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresharedHandshake")
            .field("role", &self.role)
            .field("sent", &self.sent)
            .field("received", &self.peer_nonce.is_some())
            .finish_non_exhaustive()
    }
}
