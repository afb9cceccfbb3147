//! KeySets: ordered collections of independent cipher keys
//!
//! # Invariants
//!
//! - Exactly `cipher_count` entries, no algorithm twice
//! - Every key is exactly `key_length` bytes
//! - Iteration order is insertion order is wire order. The cipher chain runs
//!   stages in this order and the canonical encoding writes keys in it.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::{
    entropy::{Entropy, SeededStream},
    error::KeySetError,
    kdf,
};

/// Supported key lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyLength {
    /// 128-bit keys
    Bits128,
    /// 256-bit keys
    Bits256,
}

impl KeyLength {
    /// Key length in bits.
    pub fn bits(self) -> u32 {
        match self {
            Self::Bits128 => 128,
            Self::Bits256 => 256,
        }
    }

    /// Key length in bytes.
    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Parse a bit count. `None` if unsupported.
    pub fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            128 => Some(Self::Bits128),
            256 => Some(Self::Bits256),
            _ => None,
        }
    }
}

/// Cipher families that can occupy a chain stage.
///
/// Ordinals are stable across versions. On the wire an algorithm is written as
/// `ordinal + 1`, so 0 is never valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CipherAlgorithmId {
    /// AES in CTR mode (AES-128 or AES-256 depending on key length)
    Aes,
    /// ChaCha20 stream cipher
    ChaCha20,
    /// BLAKE3 keyed extendable output as a keystream
    Blake3,
    /// SHAKE256 extendable output as a keystream
    Shake256,
}

impl CipherAlgorithmId {
    /// All algorithms in ordinal order.
    pub const ALL: [Self; 4] = [Self::Aes, Self::ChaCha20, Self::Blake3, Self::Shake256];

    /// Number of known algorithms (upper bound for `cipher_count`).
    pub const COUNT: usize = Self::ALL.len();

    /// Stable ordinal.
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Aes => 0,
            Self::ChaCha20 => 1,
            Self::Blake3 => 2,
            Self::Shake256 => 3,
        }
    }

    /// Value written to the wire (`ordinal + 1`).
    pub fn wire_value(self) -> u8 {
        self.ordinal() + 1
    }

    /// Parse a wire value. `None` for 0 or anything beyond the last ordinal.
    pub fn from_wire_value(value: u64) -> Option<Self> {
        let ordinal = value.checked_sub(1)?;
        Self::ALL.get(usize::try_from(ordinal).ok()?).copied()
    }

    /// Algorithm name, also used as a domain label for stage key expansion.
    pub fn name(self) -> &'static str {
        match self {
            Self::Aes => "AES",
            Self::ChaCha20 => "ChaCha20",
            Self::Blake3 => "BLAKE3",
            Self::Shake256 => "SHAKE256",
        }
    }
}

impl fmt::Display for CipherAlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a KeySet: key length and number of chained ciphers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySetSpec {
    key_length: KeyLength,
    cipher_count: u8,
}

impl KeySetSpec {
    /// Create a spec.
    ///
    /// # Errors
    ///
    /// - `KeySetError::InvalidSpec` if `cipher_count` is zero or exceeds the
    ///   number of known algorithms
    pub fn new(key_length: KeyLength, cipher_count: usize) -> Result<Self, KeySetError> {
        if cipher_count == 0 || cipher_count > CipherAlgorithmId::COUNT {
            return Err(KeySetError::InvalidSpec {
                key_length_bits: u64::from(key_length.bits()),
                cipher_count: cipher_count as u64,
            });
        }

        Ok(Self { key_length, cipher_count: cipher_count as u8 })
    }

    /// Create a spec from raw wire values.
    pub fn from_raw(key_length_bits: u64, cipher_count: u64) -> Result<Self, KeySetError> {
        let invalid = KeySetError::InvalidSpec { key_length_bits, cipher_count };
        let key_length = KeyLength::from_bits(key_length_bits).ok_or(invalid.clone())?;
        let cipher_count = usize::try_from(cipher_count).map_err(|_| invalid)?;
        Self::new(key_length, cipher_count)
    }

    /// Key length of every key in the set.
    pub fn key_length(&self) -> KeyLength {
        self.key_length
    }

    /// Number of chained ciphers.
    pub fn cipher_count(&self) -> usize {
        usize::from(self.cipher_count)
    }

    /// Total key bytes held by a KeySet of this spec.
    pub fn total_key_bytes(&self) -> usize {
        self.cipher_count() * self.key_length.bytes()
    }
}

/// An ordered set of cipher keys treated as one cryptographic unit.
///
/// Key bytes are zeroized on drop. `Clone` is available for callers that
/// need a second owner; every clone zeroizes itself independently.
#[derive(Clone)]
pub struct KeySet {
    spec: KeySetSpec,
    entries: Vec<(CipherAlgorithmId, Zeroizing<Vec<u8>>)>,
}

impl KeySet {
    /// Generate random keys for the first `cipher_count` algorithms in
    /// ordinal order.
    pub fn random(spec: KeySetSpec, entropy: &mut impl Entropy) -> Self {
        let algorithms = &CipherAlgorithmId::ALL[..spec.cipher_count()];
        Self::random_for(spec, algorithms, entropy)
    }

    /// Generate random keys for a randomly chosen set and order of
    /// algorithms.
    pub fn random_shuffled(spec: KeySetSpec, entropy: &mut impl Entropy) -> Self {
        let mut algorithms = CipherAlgorithmId::ALL;

        // Fisher-Yates
        for i in (1..algorithms.len()).rev() {
            let j = entropy.random_u32() as usize % (i + 1);
            algorithms.swap(i, j);
        }

        Self::random_for(spec, &algorithms[..spec.cipher_count()], entropy)
    }

    fn random_for(
        spec: KeySetSpec,
        algorithms: &[CipherAlgorithmId],
        entropy: &mut impl Entropy,
    ) -> Self {
        let entries = algorithms
            .iter()
            .map(|&algorithm| {
                let mut key = Zeroizing::new(vec![0u8; spec.key_length().bytes()]);
                entropy.random_bytes(&mut key);
                (algorithm, key)
            })
            .collect();

        Self { spec, entries }
    }

    /// Derive a KeySet from a secret.
    ///
    /// Each slot runs the KDF with its own stream draws and slot adjustment,
    /// so no two slots share key bytes.
    ///
    /// # Errors
    ///
    /// - `KeySetError::Derive` if the secret is empty
    pub fn from_secret(
        spec: KeySetSpec,
        secret: &[u8],
        init_vector: &[u8],
        stream: &mut SeededStream,
    ) -> Result<Self, KeySetError> {
        let mut entries = Vec::with_capacity(spec.cipher_count());

        for (slot, &algorithm) in CipherAlgorithmId::ALL[..spec.cipher_count()].iter().enumerate()
        {
            let key = kdf::derive_for_slot(
                secret,
                init_vector,
                stream,
                spec.key_length().bytes(),
                slot as u32,
            )?;
            entries.push((algorithm, key));
        }

        Ok(Self { spec, entries })
    }

    /// Build a KeySet from explicit entries, validating every invariant.
    ///
    /// # Errors
    ///
    /// - `KeySetError::WrongEntryCount` if the count differs from the spec
    /// - `KeySetError::DuplicateAlgorithm` if an algorithm repeats
    /// - `KeySetError::InvalidKeyLength` if a key has the wrong size
    pub fn from_parts(
        spec: KeySetSpec,
        parts: Vec<(CipherAlgorithmId, Zeroizing<Vec<u8>>)>,
    ) -> Result<Self, KeySetError> {
        if parts.len() != spec.cipher_count() {
            return Err(KeySetError::WrongEntryCount {
                expected: spec.cipher_count(),
                actual: parts.len(),
            });
        }

        for (i, (algorithm, key)) in parts.iter().enumerate() {
            if parts[..i].iter().any(|(seen, _)| seen == algorithm) {
                return Err(KeySetError::DuplicateAlgorithm { algorithm: *algorithm });
            }

            if key.len() != spec.key_length().bytes() {
                return Err(KeySetError::InvalidKeyLength {
                    algorithm: *algorithm,
                    expected: spec.key_length().bytes(),
                    actual: key.len(),
                });
            }
        }

        Ok(Self { spec, entries: parts })
    }

    /// Shape of this KeySet.
    pub fn spec(&self) -> KeySetSpec {
        self.spec
    }

    /// Algorithms in chain order.
    pub fn algorithms(&self) -> impl Iterator<Item = CipherAlgorithmId> + '_ {
        self.entries.iter().map(|(algorithm, _)| *algorithm)
    }

    /// `(algorithm, key)` pairs in chain order.
    pub fn iter(&self) -> impl Iterator<Item = (CipherAlgorithmId, &[u8])> + '_ {
        self.entries.iter().map(|(algorithm, key)| (*algorithm, key.as_slice()))
    }

    /// Key for `algorithm`. `None` if the algorithm is not in this set.
    pub fn key(&self, algorithm: CipherAlgorithmId) -> Option<&[u8]> {
        self.entries.iter().find(|(a, _)| *a == algorithm).map(|(_, key)| key.as_slice())
    }
}

impl Zeroize for KeySet {
    fn zeroize(&mut self) {
        for (_, key) in &mut self.entries {
            key.zeroize();
        }
    }
}

impl PartialEq for KeySet {
    fn eq(&self, other: &Self) -> bool {
        if self.spec != other.spec || self.entries.len() != other.entries.len() {
            return false;
        }

        self.entries.iter().zip(&other.entries).all(|((a, key_a), (b, key_b))| {
            a == b && bool::from(key_a.as_slice().ct_eq(key_b.as_slice()))
        })
    }
}

impl Eq for KeySet {}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("spec", &self.spec)
            .field("algorithms", &self.algorithms().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(bits: KeyLength, count: usize) -> KeySetSpec {
        KeySetSpec::new(bits, count).unwrap()
    }

    #[test]
    fn spec_rejects_zero_and_too_many_ciphers() {
        assert!(KeySetSpec::new(KeyLength::Bits128, 0).is_err());
        assert!(KeySetSpec::new(KeyLength::Bits128, CipherAlgorithmId::COUNT + 1).is_err());
        assert!(KeySetSpec::new(KeyLength::Bits256, CipherAlgorithmId::COUNT).is_ok());
    }

    #[test]
    fn spec_from_raw_rejects_unknown_key_length() {
        assert_eq!(
            KeySetSpec::from_raw(192, 2),
            Err(KeySetError::InvalidSpec { key_length_bits: 192, cipher_count: 2 })
        );
        assert_eq!(KeySetSpec::from_raw(256, 2), Ok(spec(KeyLength::Bits256, 2)));
    }

    #[test]
    fn spec_equality_requires_both_fields() {
        assert_eq!(spec(KeyLength::Bits128, 2), spec(KeyLength::Bits128, 2));
        assert_ne!(spec(KeyLength::Bits128, 2), spec(KeyLength::Bits256, 2));
        assert_ne!(spec(KeyLength::Bits128, 2), spec(KeyLength::Bits128, 3));
    }

    #[test]
    fn wire_values_are_ordinal_plus_one() {
        for algorithm in CipherAlgorithmId::ALL {
            assert_eq!(algorithm.wire_value(), algorithm.ordinal() + 1);
            assert_eq!(CipherAlgorithmId::from_wire_value(algorithm.wire_value().into()), Some(algorithm));
        }
        assert_eq!(CipherAlgorithmId::from_wire_value(0), None);
        assert_eq!(CipherAlgorithmId::from_wire_value(5), None);
        assert_eq!(CipherAlgorithmId::from_wire_value(u64::MAX), None);
    }

    #[test]
    fn random_uses_ordinal_order_and_key_length() {
        let mut entropy = SeededStream::from_u64(1);
        let ks = KeySet::random(spec(KeyLength::Bits128, 3), &mut entropy);

        assert_eq!(
            ks.algorithms().collect::<Vec<_>>(),
            vec![CipherAlgorithmId::Aes, CipherAlgorithmId::ChaCha20, CipherAlgorithmId::Blake3]
        );
        assert!(ks.iter().all(|(_, key)| key.len() == 16));
    }

    #[test]
    fn random_keys_are_independent() {
        let mut entropy = SeededStream::from_u64(2);
        let ks = KeySet::random(spec(KeyLength::Bits256, 4), &mut entropy);

        let keys: Vec<&[u8]> = ks.iter().map(|(_, key)| key).collect();
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                assert_ne!(keys[i], keys[j]);
            }
        }
    }

    #[test]
    fn shuffled_selection_has_no_duplicates() {
        let mut entropy = SeededStream::from_u64(3);
        for _ in 0..20 {
            let ks = KeySet::random_shuffled(spec(KeyLength::Bits256, 4), &mut entropy);
            let mut algorithms: Vec<_> = ks.algorithms().collect();
            algorithms.sort();
            algorithms.dedup();
            assert_eq!(algorithms.len(), 4);
        }
    }

    #[test]
    fn from_secret_is_deterministic() {
        let spec = spec(KeyLength::Bits256, 3);
        let a = KeySet::from_secret(spec, b"secret", b"iv", &mut SeededStream::from_u64(5)).unwrap();
        let b = KeySet::from_secret(spec, b"secret", b"iv", &mut SeededStream::from_u64(5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn from_secret_slots_never_share_keys() {
        let spec = spec(KeyLength::Bits128, 4);
        let ks = KeySet::from_secret(spec, b"secret", b"iv", &mut SeededStream::from_u64(6)).unwrap();

        let keys: Vec<&[u8]> = ks.iter().map(|(_, key)| key).collect();
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                assert_ne!(keys[i], keys[j], "slots {i} and {j} share key bytes");
            }
        }
    }

    #[test]
    fn from_secret_rejects_empty_secret() {
        let result = KeySet::from_secret(
            spec(KeyLength::Bits128, 1),
            b"",
            b"iv",
            &mut SeededStream::from_u64(0),
        );
        assert!(matches!(result, Err(KeySetError::Derive(_))));
    }

    #[test]
    fn from_parts_validates() {
        let spec = spec(KeyLength::Bits128, 2);
        let key = || Zeroizing::new(vec![1u8; 16]);

        assert!(matches!(
            KeySet::from_parts(spec, vec![(CipherAlgorithmId::Aes, key())]),
            Err(KeySetError::WrongEntryCount { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            KeySet::from_parts(
                spec,
                vec![(CipherAlgorithmId::Aes, key()), (CipherAlgorithmId::Aes, key())]
            ),
            Err(KeySetError::DuplicateAlgorithm { algorithm: CipherAlgorithmId::Aes })
        ));
        assert!(matches!(
            KeySet::from_parts(
                spec,
                vec![
                    (CipherAlgorithmId::Aes, key()),
                    (CipherAlgorithmId::Blake3, Zeroizing::new(vec![0u8; 32]))
                ]
            ),
            Err(KeySetError::InvalidKeyLength { expected: 16, actual: 32, .. })
        ));

        let ks = KeySet::from_parts(
            spec,
            vec![(CipherAlgorithmId::Shake256, key()), (CipherAlgorithmId::Aes, key())],
        )
        .unwrap();
        assert_eq!(
            ks.algorithms().collect::<Vec<_>>(),
            vec![CipherAlgorithmId::Shake256, CipherAlgorithmId::Aes],
            "insertion order must be preserved"
        );
    }

    #[test]
    fn zeroize_clears_every_key() {
        let mut ks = KeySet::random(spec(KeyLength::Bits256, 2), &mut SeededStream::from_u64(7));
        ks.zeroize();
        assert!(ks.iter().all(|(_, key)| key.iter().all(|&b| b == 0)));
    }

    #[test]
    fn debug_redacts_keys() {
        let ks = KeySet::random(spec(KeyLength::Bits128, 1), &mut SeededStream::from_u64(8));
        let rendered = format!("{ks:?}");
        assert!(rendered.contains("Aes"));
        assert!(!rendered.contains(&format!("{:?}", ks.key(CipherAlgorithmId::Aes).unwrap())));
    }
}
