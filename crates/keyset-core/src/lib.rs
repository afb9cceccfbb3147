//! KeySet Engine Core
//!
//! Security factories, password locks and agreement negotiation built on
//! [`keyset_crypto`] and [`keyset_proto`].
//!
//! # Architecture
//!
//! Every component is a synchronous state machine or a pure function.
//! Randomness enters only through a caller-provided [`Entropy`] source, so a
//! seeded stream replays every lock, factory and handshake byte for byte.
//!
//! ```text
//!   Collaborators ──► api (create/derive, lock/unlock, wrap/unwrap)
//!                        │
//!          ┌─────────────┼──────────────────┐
//!          ▼             ▼                  ▼
//!   SecurityFactory   Lock<T> /         Agreement<H>
//!                     LockResolver<T>     │ Handshake
//!          │             │                ▼
//!          └──────┬──────┘           AgreementResult
//!                 ▼
//!        KeySet + cipher chain + canonical TLV
//! ```
//!
//! # Components
//!
//! - [`SecurityFactory`]: Lockable master secret handing out KeySets
//! - [`Lock`] / [`LockResolver`]: Password lock protocol
//! - [`Agreement`]: Result negotiation over a [`Handshake`]
//! - [`Engine`]: Configured handle over the [`api`] functions

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod agreement;
pub mod api;
pub mod config;
pub mod error;
pub mod factory;
pub mod lock;

pub use agreement::{
    Agreement, AgreementParams, AgreementResult, AgreementState, Handshake, PresharedHandshake, ResultType,
    Role, StreamCipherPair, SymCipherPair,
};
pub use api::Engine;
pub use config::EngineConfig;
pub use error::{AgreementError, EngineError, FactoryError, LockError, SessionError};
pub use factory::{FactorySource, SecurityFactory};
pub use keyset_crypto::{Entropy, KeySet, KeySetSpec, SeededStream, SystemEntropy};
pub use lock::{
    FactoryLock, KeySetLock, Lock, LockResolver, LockState, Lockable, LockedObject, WipeOnDrop, unlock,
    unlock_with_password_bytes,
};
