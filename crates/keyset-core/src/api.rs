//! Collaborator interface.
//!
//! The three narrow operations outside callers need: create or derive a
//! KeySet, lock or unlock an object with a password, and wrap or unwrap raw
//! key bytes. Free functions take every input explicitly; [`Engine`] bundles
//! an [`EngineConfig`] with an entropy source for callers that prefer a
//! handle.
//!
//! Personalisation is process-wide and fixed by the first derivation. A
//! deployment with its own phrase calls [`install_personalisation`] (or
//! builds its [`Engine`]) before any other function here; otherwise the
//! first derivation installs the default phrase and a later custom phrase is
//! rejected.

use keyset_crypto::{
    DEFAULT_SEED_PHRASE, Entropy, KeySet, KeySetSpec, Personalisation, SeededStream, SystemEntropy,
    key_set_wrap_length,
};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{
    config::EngineConfig,
    error::EngineError,
    factory::SecurityFactory,
    lock::{self, FactoryLock, KeySetLock, LockedObject},
};

/// Install the configured personalisation phrase, or the default phrase.
///
/// Idempotent for the same phrase.
///
/// # Errors
///
/// - `EngineError::Personalisation` if a different phrase is already
///   installed, including the default installed lazily by an earlier
///   derivation
pub fn install_personalisation(config: &EngineConfig) -> Result<(), EngineError> {
    let phrase = config.personalisation_phrase.as_deref().unwrap_or(DEFAULT_SEED_PHRASE);
    Personalisation::initialize(phrase)?;
    Ok(())
}

/// Create a fresh random KeySet.
pub fn create_key_set(spec: KeySetSpec, entropy: &mut impl Entropy) -> KeySet {
    KeySet::random(spec, entropy)
}

/// Derive a KeySet from a shared secret.
///
/// The KDF stream is seeded with SHA-256 of `init_vector`, so the same
/// `(spec, secret, init_vector)` always yield the same KeySet.
///
/// # Errors
///
/// - `EngineError::KeySet` if `secret` is empty
pub fn derive_key_set(spec: KeySetSpec, secret: &[u8], init_vector: &[u8]) -> Result<KeySet, EngineError> {
    let seed: [u8; 32] = Sha256::digest(init_vector).into();
    let key_set = KeySet::from_secret(spec, secret, init_vector, &mut SeededStream::from_seed(seed))?;
    Ok(key_set)
}

/// Lock a security factory under `password`.
///
/// # Errors
///
/// - `EngineError::Lock` if the factory is deterministic or the password is
///   empty
pub fn lock_factory(
    password: &str,
    lock_spec: KeySetSpec,
    factory: SecurityFactory,
    entropy: &mut impl Entropy,
) -> Result<FactoryLock, EngineError> {
    Ok(FactoryLock::lock(password, lock_spec, factory, entropy)?)
}

/// Lock a KeySet under `password`.
///
/// # Errors
///
/// - `EngineError::Lock` if the password is empty
pub fn lock_key_set(
    password: &str,
    lock_spec: KeySetSpec,
    key_set: KeySet,
    entropy: &mut impl Entropy,
) -> Result<KeySetLock, EngineError> {
    Ok(KeySetLock::lock(password, lock_spec, key_set, entropy)?)
}

/// Lock a security factory under a password held in a caller buffer.
///
/// The buffer is zeroed before returning, on success and on failure.
///
/// # Errors
///
/// Same as [`lock_factory`].
pub fn lock_factory_with_password_bytes(
    password: &mut [u8],
    lock_spec: KeySetSpec,
    factory: SecurityFactory,
    entropy: &mut impl Entropy,
) -> Result<FactoryLock, EngineError> {
    Ok(FactoryLock::lock_with_password_bytes(password, lock_spec, factory, entropy)?)
}

/// Lock a KeySet under a password held in a caller buffer.
///
/// The buffer is zeroed before returning, on success and on failure.
///
/// # Errors
///
/// Same as [`lock_key_set`].
pub fn lock_key_set_with_password_bytes(
    password: &mut [u8],
    lock_spec: KeySetSpec,
    key_set: KeySet,
    entropy: &mut impl Entropy,
) -> Result<KeySetLock, EngineError> {
    Ok(KeySetLock::lock_with_password_bytes(password, lock_spec, key_set, entropy)?)
}

/// Unlock lock bytes of either kind.
///
/// # Errors
///
/// - `EngineError::Lock` wrapping `WrongPassword` for a wrong password or a
///   modified payload; use [`EngineError::is_credential_failure`] to decide
///   whether to prompt again
/// - `EngineError::Lock` wrapping a decode error for malformed bytes
pub fn unlock(lock_bytes: &[u8], password: &str) -> Result<LockedObject, EngineError> {
    Ok(lock::unlock(lock_bytes, password)?)
}

/// Unlock lock bytes of either kind with a password held in a caller buffer.
///
/// The buffer is zeroed before returning on every path.
///
/// # Errors
///
/// Same as [`unlock`].
pub fn unlock_with_password_bytes(lock_bytes: &[u8], password: &mut [u8]) -> Result<LockedObject, EngineError> {
    Ok(lock::unlock_with_password_bytes(lock_bytes, password)?)
}

/// Wrap a raw key of the KeySet's key length.
///
/// The result is exactly [`key_set_wrap_length`] bytes long.
///
/// # Errors
///
/// - `EngineError::RawKeyLength` if `raw_key` has the wrong size
pub fn wrap_key(key_set: &KeySet, raw_key: &[u8]) -> Result<Vec<u8>, EngineError> {
    let expected = key_set.spec().key_length().bytes();
    if raw_key.len() != expected {
        return Err(EngineError::RawKeyLength { expected, actual: raw_key.len() });
    }

    let wrapped = keyset_crypto::wrap(key_set, raw_key);
    debug_assert_eq!(wrapped.len(), key_set_wrap_length(key_set.spec().key_length()));
    Ok(wrapped)
}

/// Recover a raw key wrapped by [`wrap_key`].
///
/// # Errors
///
/// - `EngineError::Chain` if the bytes were not wrapped under `key_set`
/// - `EngineError::RawKeyLength` if the recovered key has the wrong size
pub fn unwrap_key(key_set: &KeySet, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, EngineError> {
    let raw_key = keyset_crypto::unwrap(key_set, wrapped)?;

    let expected = key_set.spec().key_length().bytes();
    if raw_key.len() != expected {
        return Err(EngineError::RawKeyLength { expected, actual: raw_key.len() });
    }
    Ok(raw_key)
}

/// Configured engine handle.
///
/// Applies the configured personalisation once on construction and uses the
/// configured specs for every operation.
#[derive(Debug)]
pub struct Engine<E: Entropy = SystemEntropy> {
    config: EngineConfig,
    entropy: E,
}

impl Engine<SystemEntropy> {
    /// Engine backed by OS entropy.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::new`].
    pub fn system(config: EngineConfig) -> Result<Self, EngineError> {
        Self::new(config, SystemEntropy::new())
    }
}

impl<E: Entropy> Engine<E> {
    /// Create an engine, installing its personalisation phrase.
    ///
    /// Build the engine before calling any free function of this module: the
    /// first derivation in a process installs the default phrase, after which
    /// an engine configured with a different phrase cannot be created.
    ///
    /// # Errors
    ///
    /// - `EngineError::Personalisation` if a different phrase is already
    ///   installed in this process
    pub fn new(config: EngineConfig, entropy: E) -> Result<Self, EngineError> {
        install_personalisation(&config)?;
        Ok(Self { config, entropy })
    }

    /// Configuration in force.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a random KeySet of the default spec.
    pub fn create_key_set(&mut self) -> KeySet {
        create_key_set(self.config.default_key_set_spec, &mut self.entropy)
    }

    /// Derive a KeySet of the default spec.
    ///
    /// # Errors
    ///
    /// Same as [`derive_key_set`].
    pub fn derive_key_set(&self, secret: &[u8], init_vector: &[u8]) -> Result<KeySet, EngineError> {
        derive_key_set(self.config.default_key_set_spec, secret, init_vector)
    }

    /// Create a random factory of the default KeySet spec.
    pub fn create_factory(&mut self, label: impl Into<String>) -> SecurityFactory {
        SecurityFactory::random(self.config.default_key_set_spec, label, &mut self.entropy)
    }

    /// Lock a factory with the default lock spec.
    ///
    /// # Errors
    ///
    /// Same as [`lock_factory`].
    pub fn lock_factory(&mut self, password: &str, factory: SecurityFactory) -> Result<FactoryLock, EngineError> {
        lock_factory(password, self.config.default_lock_spec, factory, &mut self.entropy)
    }

    /// Lock a KeySet with the default lock spec.
    ///
    /// # Errors
    ///
    /// Same as [`lock_key_set`].
    pub fn lock_key_set(&mut self, password: &str, key_set: KeySet) -> Result<KeySetLock, EngineError> {
        lock_key_set(password, self.config.default_lock_spec, key_set, &mut self.entropy)
    }

    /// Lock a factory with the default lock spec and a password buffer.
    ///
    /// # Errors
    ///
    /// Same as [`lock_factory`].
    pub fn lock_factory_with_password_bytes(
        &mut self,
        password: &mut [u8],
        factory: SecurityFactory,
    ) -> Result<FactoryLock, EngineError> {
        lock_factory_with_password_bytes(password, self.config.default_lock_spec, factory, &mut self.entropy)
    }

    /// Lock a KeySet with the default lock spec and a password buffer.
    ///
    /// # Errors
    ///
    /// Same as [`lock_key_set`].
    pub fn lock_key_set_with_password_bytes(
        &mut self,
        password: &mut [u8],
        key_set: KeySet,
    ) -> Result<KeySetLock, EngineError> {
        lock_key_set_with_password_bytes(password, self.config.default_lock_spec, key_set, &mut self.entropy)
    }

    /// Unlock lock bytes of either kind.
    ///
    /// Locks made with any spec unlock; the spec travels in the Recipe.
    ///
    /// # Errors
    ///
    /// Same as [`unlock`].
    pub fn unlock(&self, lock_bytes: &[u8], password: &str) -> Result<LockedObject, EngineError> {
        unlock(lock_bytes, password)
    }

    /// Unlock lock bytes of either kind with a password buffer.
    ///
    /// # Errors
    ///
    /// Same as [`unlock`].
    pub fn unlock_with_password_bytes(
        &self,
        lock_bytes: &[u8],
        password: &mut [u8],
    ) -> Result<LockedObject, EngineError> {
        unlock_with_password_bytes(lock_bytes, password)
    }
}

#[cfg(test)]
mod tests {
    use keyset_crypto::{ChainError, KeyLength};

    use super::*;
    use crate::error::LockError;

    fn spec(key_length: KeyLength, count: usize) -> KeySetSpec {
        KeySetSpec::new(key_length, count).unwrap()
    }

    #[test]
    fn derive_key_set_is_deterministic() {
        let a = derive_key_set(spec(KeyLength::Bits128, 2), b"secret", b"iv").unwrap();
        let b = derive_key_set(spec(KeyLength::Bits128, 2), b"secret", b"iv").unwrap();
        let c = derive_key_set(spec(KeyLength::Bits128, 2), b"secret", b"other iv").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(matches!(derive_key_set(spec(KeyLength::Bits128, 2), b"", b"iv"), Err(EngineError::KeySet(_))));
    }

    #[test]
    fn wrap_unwrap_key() {
        let ks = create_key_set(spec(KeyLength::Bits256, 3), &mut SeededStream::from_u64(1));
        let raw = [0x42u8; 32];

        let wrapped = wrap_key(&ks, &raw).unwrap();
        assert_eq!(wrapped.len(), key_set_wrap_length(KeyLength::Bits256));
        assert_eq!(&unwrap_key(&ks, &wrapped).unwrap()[..], &raw);
    }

    #[test]
    fn wrap_key_rejects_wrong_size() {
        let ks = create_key_set(spec(KeyLength::Bits128, 1), &mut SeededStream::from_u64(2));
        assert_eq!(wrap_key(&ks, &[0u8; 32]), Err(EngineError::RawKeyLength { expected: 16, actual: 32 }));
    }

    #[test]
    fn unwrap_key_rejects_other_key_set_and_wrong_size() {
        let mut entropy = SeededStream::from_u64(3);
        let ks = create_key_set(spec(KeyLength::Bits128, 2), &mut entropy);
        let other = create_key_set(spec(KeyLength::Bits128, 2), &mut entropy);

        let wrapped = wrap_key(&ks, &[7u8; 16]).unwrap();
        assert_eq!(unwrap_key(&other, &wrapped), Err(EngineError::Chain(ChainError::UnwrapFailed)));

        // Valid wrap of a payload that is not a key of this length
        let not_a_key = keyset_crypto::wrap(&ks, &[1u8; 5]);
        assert_eq!(unwrap_key(&ks, &not_a_key), Err(EngineError::RawKeyLength { expected: 16, actual: 5 }));
    }

    #[test]
    fn engine_uses_configured_specs() {
        let mut engine = Engine::new(EngineConfig::default(), SeededStream::from_u64(4)).unwrap();
        let ks = engine.create_key_set();
        assert_eq!(ks.spec(), engine.config().default_key_set_spec);

        let lock = engine.lock_key_set("pw", ks.clone()).unwrap();
        assert_eq!(lock.recipe().spec(), engine.config().default_lock_spec);

        let unlocked = engine.unlock(lock.lock_bytes(), "pw").unwrap();
        assert_eq!(unlocked.into_key_set().unwrap().object(), &ks);
    }

    #[test]
    fn engine_password_buffers_are_wiped() {
        let mut engine = Engine::new(EngineConfig::default(), SeededStream::from_u64(6)).unwrap();
        let ks = engine.create_key_set();

        let mut password = *b"hunter2";
        let lock = engine.lock_key_set_with_password_bytes(&mut password, ks.clone()).unwrap();
        assert_eq!(password, [0u8; 7]);

        let mut password = *b"hunter2";
        let unlocked = engine.unlock_with_password_bytes(lock.lock_bytes(), &mut password).unwrap();
        assert_eq!(unlocked.into_key_set().unwrap().object(), &ks);
        assert_eq!(password, [0u8; 7]);

        let mut password = *b"hunter3";
        let err = unlock_with_password_bytes(lock.lock_bytes(), &mut password).unwrap_err();
        assert!(err.is_credential_failure());
        assert_eq!(password, [0u8; 7]);

        let mut password = *b"pw";
        let factory = engine.create_factory("books");
        let lock = lock_factory_with_password_bytes(
            &mut password,
            engine.config().default_lock_spec,
            factory.clone(),
            &mut SeededStream::from_u64(7),
        )
        .unwrap();
        assert_eq!(password, [0u8; 2]);
        assert_eq!(engine.unlock(lock.lock_bytes(), "pw").unwrap().into_factory().unwrap().object(), &factory);
    }

    #[test]
    fn custom_phrase_after_first_derivation_is_rejected() {
        // Any derivation pins the default phrase for the process
        derive_key_set(spec(KeyLength::Bits128, 1), b"secret", b"iv").unwrap();
        assert!(Personalisation::is_installed());

        let custom = EngineConfig { personalisation_phrase: Some("tenant 7".to_owned()), ..EngineConfig::default() };
        assert!(matches!(
            Engine::new(custom, SeededStream::from_u64(8)),
            Err(EngineError::Personalisation(_))
        ));

        // The default phrase stays accepted
        let default =
            EngineConfig { personalisation_phrase: Some(DEFAULT_SEED_PHRASE.to_owned()), ..EngineConfig::default() };
        assert!(Engine::new(default, SeededStream::from_u64(9)).is_ok());
        assert!(install_personalisation(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn engine_reports_wrong_password_as_credential_failure() {
        let mut engine = Engine::new(EngineConfig::default(), SeededStream::from_u64(5)).unwrap();
        let factory = engine.create_factory("accounts");
        let lock = engine.lock_factory("right", factory).unwrap();

        let err = engine.unlock(lock.lock_bytes(), "wrong").unwrap_err();
        assert_eq!(err, EngineError::Lock(LockError::WrongPassword));
        assert!(err.is_credential_failure());
    }
}
