//! Agreement result negotiation.
//!
//! A thin state machine around a two-party [`Handshake`]. On success it
//! settles on exactly one [`AgreementResult`] of the requested kind; on
//! failure it settles on a rejection reason. Settlement is permanent.
//!
//! ```text
//!        update_params / set_signer / receive_message
//!   New ─────────────────────────────────────────────> Updated
//!    │                                                   │
//!    │ set_error                               finalize  │
//!    ▼                                                   ▼
//!  Rejected <──────── set_error / failure ─────── Agreed | Rejected
//! ```
//!
//! # Invariants
//!
//! - `Agreed` and `Rejected` are terminal
//! - Once `Rejected`, the first reason is kept
//! - `Agreed` holds exactly one result matching `params.result_type`

mod handshake;
mod params;
mod result;
mod session;

pub use handshake::{Handshake, NONCE_SIZE, PresharedHandshake, Role, SHARED_SECRET_SIZE};
pub use params::{AgreementParams, ResultType};
pub use result::{AGREED_FACTORY_LABEL, AgreementResult, StreamCipherPair, SymCipherPair};
pub use session::{
    Direction, NONCE_RANDOM_SIZE, SESSION_KEY_SIZE, STREAM_NONCE_SIZE, SealedMessage, SessionCipher,
    StreamKeystream,
};

use keyset_crypto::KeySet;

use crate::{error::AgreementError, factory::SecurityFactory};

/// Agreement lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgreementState {
    /// Created, nothing negotiated yet
    New,
    /// Parameters or handshake progressed
    Updated,
    /// Settled with a result
    Agreed,
    /// Settled with a rejection reason
    Rejected,
}

impl AgreementState {
    /// Whether the agreement has settled.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Agreed | Self::Rejected)
    }
}

/// A negotiation between two parties over a handshake `H`.
#[derive(Debug)]
pub struct Agreement<H: Handshake> {
    params: AgreementParams,
    handshake: H,
    state: AgreementState,
    result: Option<AgreementResult>,
    rejection_reason: Option<String>,
}

impl<H: Handshake> Agreement<H> {
    /// Start a negotiation.
    pub fn new(params: AgreementParams, handshake: H) -> Self {
        Self { params, handshake, state: AgreementState::New, result: None, rejection_reason: None }
    }

    /// Current state.
    pub fn state(&self) -> AgreementState {
        self.state
    }

    /// Parameters currently in force.
    pub fn params(&self) -> &AgreementParams {
        &self.params
    }

    /// This party's handshake role.
    pub fn role(&self) -> Role {
        self.handshake.role()
    }

    /// Replace the negotiation parameters.
    ///
    /// # Errors
    ///
    /// - `AgreementError::InvalidState` once settled
    pub fn update_params(&mut self, params: AgreementParams) -> Result<(), AgreementError> {
        self.require_open("update params")?;
        self.params = params;
        self.transition(AgreementState::Updated);
        Ok(())
    }

    /// Set the signer certificate bound into the result.
    ///
    /// # Errors
    ///
    /// - `AgreementError::InvalidState` once settled
    pub fn set_signer(&mut self, certificate: impl Into<Vec<u8>>) -> Result<(), AgreementError> {
        self.require_open("set signer")?;
        self.params.signer_certificate = Some(certificate.into());
        self.transition(AgreementState::Updated);
        Ok(())
    }

    /// Next outbound handshake message, or `None` if nothing is pending.
    ///
    /// Always `None` once settled.
    pub fn next_message(&mut self) -> Option<Vec<u8>> {
        if self.state.is_terminal() {
            return None;
        }
        self.handshake.next_message()
    }

    /// Feed an inbound handshake message.
    ///
    /// A malformed message rejects the agreement.
    ///
    /// # Errors
    ///
    /// - `AgreementError::InvalidState` once settled
    /// - `AgreementError::Handshake` if the handshake refused the message
    pub fn receive_message(&mut self, message: &[u8]) -> Result<(), AgreementError> {
        self.require_open("receive message")?;

        if let Err(err) = self.handshake.receive(message) {
            self.reject(err.to_string());
            return Err(err);
        }

        self.transition(AgreementState::Updated);
        Ok(())
    }

    /// Force the agreement into `Rejected`.
    ///
    /// Repeated calls keep the first reason.
    ///
    /// # Errors
    ///
    /// - `AgreementError::InvalidState` if already `Agreed`
    pub fn set_error(&mut self, message: impl Into<String>) -> Result<(), AgreementError> {
        match self.state {
            AgreementState::Agreed => {
                Err(AgreementError::InvalidState { state: self.state, operation: "set error" })
            },
            AgreementState::Rejected => Ok(()),
            AgreementState::New | AgreementState::Updated => {
                self.reject(message.into());
                Ok(())
            },
        }
    }

    /// Settle the agreement by deriving the requested result.
    ///
    /// # Errors
    ///
    /// - `AgreementError::InvalidState` unless `Updated`
    /// - `AgreementError::Rejected` if the handshake is incomplete or the
    ///   result cannot be derived; the agreement is then `Rejected`
    pub fn finalize(&mut self) -> Result<(), AgreementError> {
        if self.state != AgreementState::Updated {
            return Err(AgreementError::InvalidState { state: self.state, operation: "finalize" });
        }

        let Some(secret) = self.handshake.shared_secret(&self.params) else {
            return Err(self.reject("handshake incomplete: no shared secret".to_owned()));
        };

        let transcript = self.handshake.transcript();
        match result::derive_result(&secret, &transcript, &self.params, self.handshake.role()) {
            Ok(result) => {
                self.result = Some(result);
                self.transition(AgreementState::Agreed);
                Ok(())
            },
            Err(err) => Err(self.reject(err.to_string())),
        }
    }

    /// The settled result.
    ///
    /// # Errors
    ///
    /// - `AgreementError::Rejected` carrying the rejection reason
    /// - `AgreementError::InvalidState` before settlement
    pub fn result(&self) -> Result<&AgreementResult, AgreementError> {
        match (&self.result, &self.rejection_reason) {
            (Some(result), _) => Ok(result),
            (None, Some(reason)) => Err(AgreementError::Rejected { reason: reason.clone() }),
            (None, None) => Err(AgreementError::InvalidState { state: self.state, operation: "read result" }),
        }
    }

    /// Take ownership of the settled result.
    ///
    /// # Errors
    ///
    /// Same as [`Agreement::result`].
    pub fn into_result(self) -> Result<AgreementResult, AgreementError> {
        match (self.result, self.rejection_reason) {
            (Some(result), _) => Ok(result),
            (None, Some(reason)) => Err(AgreementError::Rejected { reason }),
            (None, None) => Err(AgreementError::InvalidState { state: self.state, operation: "read result" }),
        }
    }

    /// Rejection reason, once `Rejected`.
    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    /// Factory result, if agreed on one.
    pub fn factory(&self) -> Option<&SecurityFactory> {
        self.result.as_ref().and_then(AgreementResult::factory)
    }

    /// KeySet result, if agreed on one.
    pub fn key_set(&self) -> Option<&KeySet> {
        self.result.as_ref().and_then(AgreementResult::key_set)
    }

    /// Session cipher pair, if agreed on one.
    pub fn sym_cipher_pair(&mut self) -> Option<&mut SymCipherPair> {
        self.result.as_mut().and_then(AgreementResult::sym_cipher_pair)
    }

    /// Keystream pair, if agreed on one.
    pub fn stream_cipher_pair(&mut self) -> Option<&mut StreamCipherPair> {
        self.result.as_mut().and_then(AgreementResult::stream_cipher_pair)
    }

    /// Shared bytes, if agreed on them.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.result.as_ref().and_then(AgreementResult::bytes)
    }

    fn require_open(&self, operation: &'static str) -> Result<(), AgreementError> {
        if self.state.is_terminal() {
            return Err(AgreementError::InvalidState { state: self.state, operation });
        }
        Ok(())
    }

    fn transition(&mut self, to: AgreementState) {
        if self.state != to {
            tracing::debug!(from = ?self.state, to = ?to, result_type = ?self.params.result_type, "agreement transition");
            self.state = to;
        }
    }

    /// Record a rejection and return the matching error.
    fn reject(&mut self, reason: String) -> AgreementError {
        tracing::warn!(from = ?self.state, reason = %reason, "agreement rejected");
        self.state = AgreementState::Rejected;
        self.rejection_reason = Some(reason.clone());
        AgreementError::Rejected { reason }
    }
}
