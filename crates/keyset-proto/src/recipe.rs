//! Recipes and lock envelopes.
//!
//! A Recipe carries everything needed to re-derive a locking KeySet from a
//! password. The envelope pairs it with the wrapped payload.
//!
//! ```text
//! Recipe       ::= SEQUENCE { target INTEGER, spec KeySetSpec,
//!                             seed OCTET STRING (32), initVector OCTET STRING (16) }
//! LockEnvelope ::= SEQUENCE { recipe Recipe, payload OCTET STRING }
//! ```
//!
//! # Security
//!
//! Recipe fields are public by construction. Secrecy rests entirely on the
//! password; the seed and IV only make every lock's derivation unique.

use der::{Length, SliceReader, Writer};
use keyset_crypto::{Entropy, KeySetSpec};

use crate::{
    canonical::Canonical,
    errors::{ProtocolError, Result},
    tlv,
};

/// Size of the KDF stream seed
pub const SEED_SIZE: usize = 32;

/// Size of the KDF initialization vector
pub const INIT_VECTOR_SIZE: usize = 16;

/// Kind of object protected by a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockTarget {
    /// A security factory configuration
    Factory,
    /// A KeySet
    KeySet,
}

impl LockTarget {
    /// Value written to the wire.
    pub fn wire_value(self) -> u64 {
        match self {
            Self::Factory => 1,
            Self::KeySet => 2,
        }
    }

    /// Parse a wire value.
    pub fn from_wire_value(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Factory),
            2 => Some(Self::KeySet),
            _ => None,
        }
    }
}

impl std::fmt::Display for LockTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Factory => f.write_str("factory"),
            Self::KeySet => f.write_str("key set"),
        }
    }
}

/// Parameters for re-deriving a locking KeySet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    target: LockTarget,
    spec: KeySetSpec,
    seed: [u8; SEED_SIZE],
    init_vector: [u8; INIT_VECTOR_SIZE],
}

impl Recipe {
    /// Create a recipe from explicit parts.
    pub fn new(
        target: LockTarget,
        spec: KeySetSpec,
        seed: [u8; SEED_SIZE],
        init_vector: [u8; INIT_VECTOR_SIZE],
    ) -> Self {
        Self { target, spec, seed, init_vector }
    }

    /// Create a recipe with a fresh random seed and IV.
    pub fn generate(target: LockTarget, spec: KeySetSpec, entropy: &mut impl Entropy) -> Self {
        let mut seed = [0u8; SEED_SIZE];
        entropy.random_bytes(&mut seed);
        let mut init_vector = [0u8; INIT_VECTOR_SIZE];
        entropy.random_bytes(&mut init_vector);

        Self { target, spec, seed, init_vector }
    }

    /// Kind of locked object.
    pub fn target(&self) -> LockTarget {
        self.target
    }

    /// Spec of the locking KeySet.
    pub fn spec(&self) -> KeySetSpec {
        self.spec
    }

    /// KDF stream seed.
    pub fn seed(&self) -> &[u8; SEED_SIZE] {
        &self.seed
    }

    /// KDF initialization vector.
    pub fn init_vector(&self) -> &[u8; INIT_VECTOR_SIZE] {
        &self.init_vector
    }

    /// Total key bytes the KDF produces for the locking KeySet.
    pub fn derived_key_bytes(&self) -> usize {
        self.spec.total_key_bytes()
    }
}

fn recipe_content_len(spec: KeySetSpec) -> der::Result<Length> {
    tlv::sum([
        // Target wire values are single-byte INTEGERs
        tlv::integer_len(LockTarget::Factory.wire_value()),
        spec.encoded_len(),
        tlv::octet_string_len(SEED_SIZE),
        tlv::octet_string_len(INIT_VECTOR_SIZE),
    ])
}

fn recipe_len(spec: KeySetSpec) -> der::Result<Length> {
    tlv::sequence_len(recipe_content_len(spec)?)
}

/// Encoded length of a Recipe for a locking KeySet of `spec`.
pub fn recipe_encoded_len(spec: KeySetSpec) -> usize {
    let Ok(len) = tlv::to_usize(recipe_len(spec)) else {
        unreachable!("a Recipe encodes in under a hundred bytes");
    };
    len
}

fn read_fixed<const N: usize>(reader: &mut SliceReader<'_>, field: &'static str) -> Result<[u8; N]> {
    let bytes = tlv::read_octet_string(reader)?;
    <[u8; N]>::try_from(bytes)
        .map_err(|_| ProtocolError::InvalidField { field, expected: N, actual: bytes.len() })
}

impl Canonical for Recipe {
    fn encoded_len(&self) -> der::Result<Length> {
        recipe_len(self.spec)
    }

    fn encode(&self, writer: &mut impl Writer) -> der::Result<()> {
        tlv::write_sequence_header(writer, recipe_content_len(self.spec)?)?;
        tlv::write_integer(writer, self.target.wire_value())?;
        self.spec.encode(writer)?;
        tlv::write_octet_string(writer, &self.seed)?;
        tlv::write_octet_string(writer, &self.init_vector)
    }

    fn decode_from(reader: &mut SliceReader<'_>) -> Result<Self> {
        let mut seq = tlv::read_sequence(reader)?;

        let value = tlv::read_integer(&mut seq)?;
        let target = LockTarget::from_wire_value(value).ok_or(ProtocolError::UnknownTarget { value })?;
        let spec = KeySetSpec::decode_from(&mut seq)?;
        let seed = read_fixed::<SEED_SIZE>(&mut seq, "seed")?;
        let init_vector = read_fixed::<INIT_VECTOR_SIZE>(&mut seq, "init vector")?;
        tlv::finish(&seq)?;

        Ok(Self { target, spec, seed, init_vector })
    }
}

/// A recipe paired with the payload it protects.
///
/// The payload is ciphertext; this type never holds a plaintext object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEnvelope {
    /// Derivation parameters
    pub recipe: Recipe,
    /// Wrapped canonical encoding of the locked object
    pub payload: Vec<u8>,
}

fn lock_content_len(spec: KeySetSpec, payload_len: usize) -> der::Result<Length> {
    tlv::sum([recipe_len(spec), tlv::octet_string_len(payload_len)])
}

fn lock_len(spec: KeySetSpec, payload_len: usize) -> der::Result<Length> {
    tlv::sequence_len(lock_content_len(spec, payload_len)?)
}

/// Encoded length of a lock whose payload is `payload_len` bytes.
///
/// # Errors
///
/// - `ProtocolError::Encode` if the payload is beyond the largest DER length
pub fn lock_encoded_len(spec: KeySetSpec, payload_len: usize) -> Result<usize> {
    tlv::to_usize(lock_len(spec, payload_len))
}

impl Canonical for LockEnvelope {
    fn encoded_len(&self) -> der::Result<Length> {
        lock_len(self.recipe.spec, self.payload.len())
    }

    fn encode(&self, writer: &mut impl Writer) -> der::Result<()> {
        tlv::write_sequence_header(writer, lock_content_len(self.recipe.spec, self.payload.len())?)?;
        self.recipe.encode(writer)?;
        tlv::write_octet_string(writer, &self.payload)
    }

    fn decode_from(reader: &mut SliceReader<'_>) -> Result<Self> {
        let mut seq = tlv::read_sequence(reader)?;
        let recipe = Recipe::decode_from(&mut seq)?;
        let payload = tlv::read_octet_string(&mut seq)?.to_vec();
        tlv::finish(&seq)?;

        Ok(Self { recipe, payload })
    }
}
