//! Password lock protocol.
//!
//! A lock protects the canonical encoding of a factory or KeySet under a
//! KeySet derived from a password and a fresh Recipe. Only the Recipe and the
//! wrapped payload are ever serialized.
//!
//! # State Machine
//!
//! ```text
//!         lock()
//! ┌─────┐ ─────────────────────────────────────────> ┌────────┐
//! │ New │                                            │ Locked │
//! └─────┘ ───────────┐                               └────────┘
//!   LockResolver::new│
//!                    ↓
//!             ┌───────────┐  resolve() ok    ┌──────────┐
//!             │ Unlocking │ ───────────────> │ Unlocked │
//!             └───────────┘                  └──────────┘
//!                    │ resolve() err
//!                    ↓
//!               ┌────────┐
//!               │ Failed │
//!               └────────┘
//! ```
//!
//! Unlocked and Failed are terminal for a resolver: a failed attempt needs a
//! new resolver, so every attempt starts from the original lock bytes.
//!
//! # Security
//!
//! - Password bytes, the locking KeySet and the payload plaintext live in
//!   zeroizing buffers and are wiped on every exit path
//! - A wrong password and a modified payload produce the same error
//! - Lock bytes never contain plaintext

use std::{fmt, marker::PhantomData, ops::Deref};

use keyset_crypto::{Entropy, KeySet, KeySetSpec, SeededStream, unwrap, wrap};
use keyset_proto::{Canonical, LockEnvelope, LockTarget, Recipe};
use zeroize::{Zeroize, Zeroizing};

use crate::{error::LockError, factory::SecurityFactory};

/// Lifecycle of a lock or lock resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Nothing locked or decoded yet
    New,
    /// Object locked; lock bytes available
    Locked,
    /// Lock bytes decoded; waiting for a password
    Unlocking,
    /// Password accepted; object recovered
    Unlocked,
    /// Password rejected or payload invalid
    Failed,
}

/// Objects that can be protected by a password lock.
pub trait Lockable: Canonical + PartialEq + fmt::Debug {
    /// Recipe target written for this object kind
    const TARGET: LockTarget;

    /// Refuse objects that must never be locked.
    fn check_lockable(&self) -> Result<(), LockError> {
        Ok(())
    }
}

impl Lockable for KeySet {
    const TARGET: LockTarget = LockTarget::KeySet;
}

impl Lockable for SecurityFactory {
    const TARGET: LockTarget = LockTarget::Factory;

    fn check_lockable(&self) -> Result<(), LockError> {
        if self.is_lockable() {
            Ok(())
        } else {
            Err(LockError::InvalidState { state: LockState::New, operation: "lock a deterministic factory" })
        }
    }
}

/// A lock protecting a security factory
pub type FactoryLock = Lock<SecurityFactory>;

/// A lock protecting a KeySet
pub type KeySetLock = Lock<KeySet>;

/// Wipes a caller-owned buffer when dropped.
pub struct WipeOnDrop<'a>(&'a mut [u8]);

impl<'a> WipeOnDrop<'a> {
    /// Guard `buf` until the end of the current scope.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self(buf)
    }
}

impl Deref for WipeOnDrop<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0
    }
}

impl Drop for WipeOnDrop<'_> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Derive the KeySet that wraps a lock payload.
fn locking_key_set(recipe: &Recipe, password: &[u8]) -> Result<KeySet, LockError> {
    let mut stream = SeededStream::from_seed(*recipe.seed());
    Ok(KeySet::from_secret(recipe.spec(), password, recipe.init_vector(), &mut stream)?)
}

/// A locked (or unlocked) object together with its lock bytes.
///
/// Holds the object in plaintext; only [`Lock::lock_bytes`] is meant to be
/// persisted.
#[derive(Debug, Clone)]
pub struct Lock<T: Lockable> {
    envelope: LockEnvelope,
    lock_bytes: Vec<u8>,
    object: T,
    state: LockState,
}

impl<T: Lockable> Lock<T> {
    /// Lock `object` under `password`.
    ///
    /// # Errors
    ///
    /// - `LockError::InvalidState` if the object refuses to be locked
    /// - `LockError::KeySet` if the password is empty
    pub fn lock(
        password: &str,
        spec: KeySetSpec,
        object: T,
        entropy: &mut impl Entropy,
    ) -> Result<Self, LockError> {
        Self::seal(password.as_bytes(), spec, object, entropy)
    }

    /// Lock `object` under a password held in a caller buffer.
    ///
    /// The buffer is zeroed before returning, on success and on failure.
    pub fn lock_with_password_bytes(
        password: &mut [u8],
        spec: KeySetSpec,
        object: T,
        entropy: &mut impl Entropy,
    ) -> Result<Self, LockError> {
        let password = WipeOnDrop::new(password);
        Self::seal(&password, spec, object, entropy)
    }

    fn seal(
        password: &[u8],
        spec: KeySetSpec,
        object: T,
        entropy: &mut impl Entropy,
    ) -> Result<Self, LockError> {
        object.check_lockable()?;

        let recipe = Recipe::generate(T::TARGET, spec, entropy);
        let locking = locking_key_set(&recipe, password)?;

        let plaintext = Zeroizing::new(object.to_canonical_bytes().map_err(LockError::Encode)?);
        let payload = wrap(&locking, &plaintext);

        let envelope = LockEnvelope { recipe, payload };
        let lock_bytes = envelope.to_canonical_bytes().map_err(LockError::Encode)?;

        tracing::debug!(
            lock_target = %T::TARGET,
            spec = ?spec,
            lock_len = lock_bytes.len(),
            "locked object"
        );

        Ok(Self { envelope, lock_bytes, object, state: LockState::Locked })
    }

    /// Current state (`Locked` or `Unlocked`).
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Recipe used to derive the locking KeySet.
    pub fn recipe(&self) -> &Recipe {
        &self.envelope.recipe
    }

    /// Wrapped payload.
    pub fn payload(&self) -> &[u8] {
        &self.envelope.payload
    }

    /// Exact canonical bytes of this lock.
    pub fn lock_bytes(&self) -> &[u8] {
        &self.lock_bytes
    }

    /// The protected object.
    pub fn object(&self) -> &T {
        &self.object
    }

    /// Consume the lock, returning the protected object.
    pub fn into_object(self) -> T {
        self.object
    }

    /// Re-encode the Recipe and payload.
    ///
    /// Always equal to [`Lock::lock_bytes`].
    pub fn reencode(&self) -> Vec<u8> {
        let envelope =
            LockEnvelope { recipe: self.envelope.recipe.clone(), payload: self.envelope.payload.clone() };
        let Ok(bytes) = envelope.to_canonical_bytes() else {
            unreachable!("the envelope was encoded or decoded once already, so it fits");
        };
        bytes
    }
}

impl<T: Lockable> PartialEq for Lock<T> {
    fn eq(&self, other: &Self) -> bool {
        self.object == other.object && self.lock_bytes == other.lock_bytes
    }
}

/// Resolves lock bytes back into a [`Lock`] given the right password.
#[derive(Debug)]
pub struct LockResolver<T: Lockable> {
    envelope: LockEnvelope,
    lock_bytes: Vec<u8>,
    state: LockState,
    _target: PhantomData<T>,
}

impl<T: Lockable> LockResolver<T> {
    /// Decode `lock_bytes` and prepare to resolve them.
    ///
    /// # Errors
    ///
    /// - `LockError::Decode` if the bytes are not a canonical lock
    /// - `LockError::TargetMismatch` if the lock protects another kind of
    ///   object
    pub fn new(lock_bytes: &[u8]) -> Result<Self, LockError> {
        let envelope = LockEnvelope::from_canonical_bytes(lock_bytes)?;
        Self::from_envelope(envelope, lock_bytes)
    }

    fn from_envelope(envelope: LockEnvelope, lock_bytes: &[u8]) -> Result<Self, LockError> {
        let actual = envelope.recipe.target();
        if actual != T::TARGET {
            return Err(LockError::TargetMismatch { expected: T::TARGET, actual });
        }

        Ok(Self { envelope, lock_bytes: lock_bytes.to_vec(), state: LockState::Unlocking, _target: PhantomData })
    }

    /// Current state.
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Recipe of the lock being resolved.
    pub fn recipe(&self) -> &Recipe {
        &self.envelope.recipe
    }

    /// Resolve with `password`.
    ///
    /// # Errors
    ///
    /// - `LockError::InvalidState` if already resolved or failed
    /// - `LockError::WrongPassword` if the payload does not unwrap
    /// - `LockError::Data` if the unwrapped payload is not a valid object
    pub fn resolve(&mut self, password: &str) -> Result<Lock<T>, LockError> {
        self.resolve_inner(password.as_bytes())
    }

    /// Resolve with a password held in a caller buffer.
    ///
    /// The buffer is zeroed before returning, on success and on failure.
    pub fn resolve_with_password_bytes(&mut self, password: &mut [u8]) -> Result<Lock<T>, LockError> {
        let password = WipeOnDrop::new(password);
        self.resolve_inner(&password)
    }

    fn resolve_inner(&mut self, password: &[u8]) -> Result<Lock<T>, LockError> {
        if self.state != LockState::Unlocking {
            return Err(LockError::InvalidState { state: self.state, operation: "resolve" });
        }

        match self.try_resolve(password) {
            Ok(lock) => {
                self.state = LockState::Unlocked;
                tracing::debug!(lock_target = %T::TARGET, "unlocked object");
                Ok(lock)
            },
            Err(err) => {
                self.state = LockState::Failed;
                tracing::warn!(lock_target = %T::TARGET, error = %err, "lock resolution failed");
                Err(err)
            },
        }
    }

    fn try_resolve(&self, password: &[u8]) -> Result<Lock<T>, LockError> {
        // An underivable password (empty) cannot be the right one
        let locking =
            locking_key_set(&self.envelope.recipe, password).map_err(|_| LockError::WrongPassword)?;

        let plaintext =
            unwrap(&locking, &self.envelope.payload).map_err(|_| LockError::WrongPassword)?;
        let object = T::from_canonical_bytes(&plaintext).map_err(LockError::Data)?;

        Ok(Lock {
            envelope: self.envelope.clone(),
            lock_bytes: self.lock_bytes.clone(),
            object,
            state: LockState::Unlocked,
        })
    }
}

/// An unlocked object of whichever kind the lock protected.
#[derive(Debug, Clone, PartialEq)]
pub enum LockedObject {
    /// Lock protected a security factory
    Factory(FactoryLock),
    /// Lock protected a KeySet
    KeySet(KeySetLock),
}

impl LockedObject {
    /// Kind of object recovered.
    pub fn target(&self) -> LockTarget {
        match self {
            Self::Factory(_) => LockTarget::Factory,
            Self::KeySet(_) => LockTarget::KeySet,
        }
    }

    /// The factory lock, if this lock protected a factory.
    pub fn into_factory(self) -> Option<FactoryLock> {
        match self {
            Self::Factory(lock) => Some(lock),
            Self::KeySet(_) => None,
        }
    }

    /// The KeySet lock, if this lock protected a KeySet.
    pub fn into_key_set(self) -> Option<KeySetLock> {
        match self {
            Self::KeySet(lock) => Some(lock),
            Self::Factory(_) => None,
        }
    }
}

/// Unlock `lock_bytes`, dispatching on the Recipe target.
///
/// # Errors
///
/// Same as [`LockResolver::new`] and [`LockResolver::resolve`].
pub fn unlock(lock_bytes: &[u8], password: &str) -> Result<LockedObject, LockError> {
    unlock_inner(lock_bytes, password.as_bytes())
}

/// Unlock `lock_bytes` with a password held in a caller buffer.
///
/// The buffer is zeroed before returning on every path, including lock bytes
/// that fail to decode.
///
/// # Errors
///
/// Same as [`unlock`].
pub fn unlock_with_password_bytes(lock_bytes: &[u8], password: &mut [u8]) -> Result<LockedObject, LockError> {
    let password = WipeOnDrop::new(password);
    unlock_inner(lock_bytes, &password)
}

fn unlock_inner(lock_bytes: &[u8], password: &[u8]) -> Result<LockedObject, LockError> {
    let envelope = LockEnvelope::from_canonical_bytes(lock_bytes)?;

    match envelope.recipe.target() {
        LockTarget::Factory => {
            let mut resolver = LockResolver::<SecurityFactory>::from_envelope(envelope, lock_bytes)?;
            resolver.resolve_inner(password).map(LockedObject::Factory)
        },
        LockTarget::KeySet => {
            let mut resolver = LockResolver::<KeySet>::from_envelope(envelope, lock_bytes)?;
            resolver.resolve_inner(password).map(LockedObject::KeySet)
        },
    }
}
