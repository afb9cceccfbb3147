//! Fuzz target for the iterated-MAC KDF
//!
//! # Invariants
//!
//! - Output length is exactly the requested length
//! - Same inputs always produce the same bytes
//! - Fails only for an empty secret or a zero length

#![no_main]

use arbitrary::Arbitrary;
use keyset_crypto::{DeriveError, SeededStream, derive};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct KdfInput {
    secret: Vec<u8>,
    init_vector: Vec<u8>,
    seed: [u8; 32],
    length: u16,
}

fuzz_target!(|input: KdfInput| {
    let length = usize::from(input.length % 2048);

    let first = derive(&input.secret, &input.init_vector, &mut SeededStream::from_seed(input.seed), length);
    let second = derive(&input.secret, &input.init_vector, &mut SeededStream::from_seed(input.seed), length);

    match (&first, input.secret.is_empty(), length) {
        (Err(DeriveError::EmptySecret), true, _) => {},
        (Err(DeriveError::ZeroLength), false, 0) => {},
        (Ok(bytes), false, n) if n > 0 => {
            assert_eq!(bytes.len(), n);
        },
        other => panic!("unexpected derive outcome: {other:?}"),
    }
    assert_eq!(first, second, "derive is not deterministic");
});
