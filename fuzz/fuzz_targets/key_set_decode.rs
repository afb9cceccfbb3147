//! Fuzz target for canonical decoding
//!
//! Feeds arbitrary bytes to every canonical decoder.
//!
//! # Invariants
//!
//! - Decoding NEVER panics; invalid input returns an error
//! - Anything that decodes re-encodes to exactly the input bytes
//! - Decoded KeySets honour their spec (entry count, key lengths)

#![no_main]

use keyset_core::SecurityFactory;
use keyset_crypto::{KeySet, KeySetSpec};
use keyset_proto::{Canonical, LockEnvelope};
use libfuzzer_sys::fuzz_target;

fn check<T: Canonical>(data: &[u8]) -> Option<T> {
    let value = T::from_canonical_bytes(data).ok()?;
    assert_eq!(value.to_canonical_bytes().as_deref(), Ok(data), "decode accepted a non-canonical encoding");
    Some(value)
}

fuzz_target!(|data: &[u8]| {
    let _ = check::<KeySetSpec>(data);
    let _ = check::<LockEnvelope>(data);
    let _ = check::<SecurityFactory>(data);

    if let Some(key_set) = check::<KeySet>(data) {
        let spec = key_set.spec();
        assert_eq!(key_set.iter().count(), spec.cipher_count());
        for (_, key) in key_set.iter() {
            assert_eq!(key.len(), spec.key_length().bytes());
        }
    }
});
