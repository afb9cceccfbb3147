//! Fuzz target for lock decoding and resolution
//!
//! # Strategy
//!
//! - Build a valid lock from a fuzzed seed and password
//! - Mutate it: flip bits, truncate, append, or replace it outright
//! - Resolve the result with the right or a wrong password
//!
//! # Invariants
//!
//! - Resolution NEVER panics
//! - An unmodified lock opens with its password and yields the original
//! - A wrong password never opens a lock
//! - Anything that does open yields exactly the original object

#![no_main]

use arbitrary::Arbitrary;
use keyset_core::{KeySetLock, LockError, unlock};
use keyset_crypto::{KeyLength, KeySet, KeySetSpec, SeededStream};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct LockScenario {
    seed: u64,
    password: String,
    wrong_password: bool,
    mutation: Mutation,
}

#[derive(Debug, Clone, Arbitrary)]
enum Mutation {
    None,
    FlipBit { index: u16, bit: u8 },
    Truncate { keep: u16 },
    Append { bytes: Vec<u8> },
    Replace { bytes: Vec<u8> },
}

fuzz_target!(|scenario: LockScenario| {
    if scenario.password.is_empty() {
        return;
    }

    // Small specs keep each iteration to a few KDF sections
    let Ok(spec) = KeySetSpec::new(KeyLength::Bits128, 1) else {
        return;
    };
    let mut entropy = SeededStream::from_u64(scenario.seed);
    let key_set = KeySet::random(spec, &mut entropy);
    let Ok(lock) = KeySetLock::lock(&scenario.password, spec, key_set.clone(), &mut entropy) else {
        return;
    };

    let mut bytes = lock.lock_bytes().to_vec();
    let modified = match scenario.mutation {
        Mutation::None => false,
        Mutation::FlipBit { index, bit } => {
            let at = usize::from(index) % bytes.len();
            bytes[at] ^= 1 << (bit % 8);
            true
        },
        Mutation::Truncate { keep } => {
            bytes.truncate(usize::from(keep) % bytes.len());
            true
        },
        Mutation::Append { bytes: extra } => {
            bytes.extend_from_slice(&extra);
            !extra.is_empty()
        },
        Mutation::Replace { bytes: replacement } => {
            let changed = replacement != bytes;
            bytes = replacement;
            changed
        },
    };

    let password =
        if scenario.wrong_password { format!("{}x", scenario.password) } else { scenario.password };

    match unlock(&bytes, &password) {
        Ok(object) => {
            assert!(!scenario.wrong_password, "wrong password opened a lock");
            let Some(recovered) = object.into_key_set() else {
                panic!("replaced bytes opened as a different target");
            };
            assert_eq!(recovered.object(), &key_set);
        },
        Err(err) => {
            assert!(modified || scenario.wrong_password, "unmodified lock failed: {err}");
            if !modified {
                assert_eq!(err, LockError::WrongPassword);
            }
        },
    }
});
