//! End-to-end scenarios through the collaborator API.
//!
//! These tests drive the engine the way an application would: create or
//! derive KeySets, lock and unlock factories with a password, wrap and
//! unwrap raw keys.

use keyset_core::{
    Engine, EngineConfig, EngineError, LockError, LockState, SecurityFactory,
    api::{self, create_key_set, derive_key_set, lock_factory, lock_key_set, unwrap_key, wrap_key},
};
use keyset_crypto::{KeyLength, KeySetSpec, SeededStream, encryption_length, unwrap, wrap};

fn spec(key_length: KeyLength, count: usize) -> KeySetSpec {
    KeySetSpec::new(key_length, count).unwrap()
}

/// 37 bytes of 0xAB under a random `{128, 3}` KeySet.
#[test]
fn wrap_37_bytes_under_three_ciphers() {
    let spec = spec(KeyLength::Bits128, 3);
    let ks = create_key_set(spec, &mut SeededStream::from_u64(0x37));
    let plaintext = [0xABu8; 37];

    let wrapped = wrap(&ks, &plaintext);
    assert_eq!(wrapped.len(), encryption_length(spec, 37));
    assert_eq!(unwrap(&ks, &wrapped).unwrap().as_slice(), &plaintext);
}

/// A factory locked with "correct-horse" only opens with that password.
#[test]
fn correct_horse_factory_lock() {
    let mut entropy = SeededStream::from_u64(0xC0FFEE);
    let factory = SecurityFactory::random(spec(KeyLength::Bits256, 2), "household", &mut entropy);
    let lock = lock_factory("correct-horse", spec(KeyLength::Bits256, 3), factory.clone(), &mut entropy).unwrap();

    let unlocked = api::unlock(lock.lock_bytes(), "correct-horse").unwrap().into_factory().unwrap();
    assert_eq!(unlocked.object(), &factory);
    assert_eq!(unlocked.state(), LockState::Unlocked);

    let err = api::unlock(lock.lock_bytes(), "wrong-password").unwrap_err();
    assert_eq!(err, EngineError::Lock(LockError::WrongPassword));
    assert!(err.is_credential_failure());
}

#[test]
fn deterministic_factory_cannot_be_locked() {
    let factory = SecurityFactory::deterministic(spec(KeyLength::Bits256, 2), "fixture", b"seed");
    let err = lock_factory("pw", spec(KeyLength::Bits256, 3), factory, &mut SeededStream::from_u64(1)).unwrap_err();

    assert!(matches!(err, EngineError::Lock(LockError::InvalidState { .. })));
    assert!(!err.is_credential_failure());
}

#[test]
fn derived_key_set_wraps_a_locked_key_set() {
    // Both parties derive the same KeySet from a shared secret
    let a = derive_key_set(spec(KeyLength::Bits256, 4), b"shared secret", b"ledger").unwrap();
    let b = derive_key_set(spec(KeyLength::Bits256, 4), b"shared secret", b"ledger").unwrap();
    assert_eq!(a, b);

    // A raw data key travels wrapped under it
    let data_key = [0x24u8; 32];
    let wrapped = wrap_key(&a, &data_key).unwrap();
    assert_eq!(&unwrap_key(&b, &wrapped).unwrap()[..], &data_key);

    // The derived KeySet itself can be password locked
    let lock = lock_key_set("pw", spec(KeyLength::Bits128, 2), a, &mut SeededStream::from_u64(2)).unwrap();
    let unlocked = api::unlock(lock.lock_bytes(), "pw").unwrap().into_key_set().unwrap();
    assert_eq!(unlocked.into_object(), b);
}

#[test]
fn truncated_lock_is_a_decode_error() {
    let mut entropy = SeededStream::from_u64(3);
    let ks = create_key_set(spec(KeyLength::Bits128, 1), &mut entropy);
    let lock = lock_key_set("pw", spec(KeyLength::Bits128, 1), ks, &mut entropy).unwrap();

    let bytes = lock.lock_bytes();
    let err = api::unlock(&bytes[..bytes.len() - 1], "pw").unwrap_err();
    assert!(matches!(err, EngineError::Lock(LockError::Decode(_))));
    assert!(!err.is_credential_failure());
}

#[test]
fn engine_round_trip_with_system_entropy() {
    let mut engine = Engine::system(EngineConfig::default()).unwrap();
    let factory = engine.create_factory("accounts");
    let derived = factory.derive_key_set(b"2024").unwrap();

    let lock = engine.lock_factory("pw", factory.clone()).unwrap();
    let recovered = engine.unlock(lock.lock_bytes(), "pw").unwrap().into_factory().unwrap().into_object();

    assert_eq!(recovered, factory);
    assert_eq!(recovered.derive_key_set(b"2024").unwrap(), derived);
}
