//! Security factories.
//!
//! A factory is the lockable "security configuration" of a deployment: a
//! master secret plus the default KeySet shape. It hands out fresh random
//! KeySets and re-derives context-bound KeySets from its master secret.
//!
//! ```text
//! SecurityFactory ::= SEQUENCE { source INTEGER, spec KeySetSpec,
//!                                label OCTET STRING (UTF-8),
//!                                masterSecret OCTET STRING (32) }
//! ```
//!
//! # Security
//!
//! - The master secret is zeroized on drop and never printed
//! - Equality compares the master secret in constant time
//! - Deterministic factories are reproducible from a caller seed and are
//!   therefore refused by the lock protocol

use std::fmt;

use keyset_crypto::{Entropy, KeySet, KeySetSpec, SeededStream};
use keyset_proto::{
    Canonical, ProtocolError, Result as ProtoResult,
    der::{self, Length, SliceReader, Writer},
    tlv,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::FactoryError;

/// Size of a factory master secret
pub const MASTER_SECRET_SIZE: usize = 32;

const DETERMINISTIC_LABEL: &[u8] = b"keysetDeterministicFactory";
const CONTEXT_LABEL: &[u8] = b"keysetFactoryContext";

/// Where a factory's master secret came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactorySource {
    /// OS entropy
    Random,
    /// Fixed from a caller seed (tests, fixtures)
    Deterministic,
    /// Produced by a completed agreement
    Agreed,
}

impl FactorySource {
    fn wire_value(self) -> u64 {
        match self {
            Self::Random => 1,
            Self::Deterministic => 2,
            Self::Agreed => 3,
        }
    }

    fn from_wire_value(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Random),
            2 => Some(Self::Deterministic),
            3 => Some(Self::Agreed),
            _ => None,
        }
    }
}

/// A security-factory configuration.
#[derive(Clone)]
pub struct SecurityFactory {
    source: FactorySource,
    spec: KeySetSpec,
    label: String,
    master_secret: Zeroizing<[u8; MASTER_SECRET_SIZE]>,
}

impl SecurityFactory {
    /// Create a factory with a fresh random master secret.
    pub fn random(spec: KeySetSpec, label: impl Into<String>, entropy: &mut impl Entropy) -> Self {
        let mut master_secret = Zeroizing::new([0u8; MASTER_SECRET_SIZE]);
        entropy.random_bytes(&mut master_secret[..]);

        let factory = Self { source: FactorySource::Random, spec, label: label.into(), master_secret };
        tracing::debug!(label = %factory.label, spec = ?spec, "created random security factory");
        factory
    }

    /// Create a reproducible factory whose master secret is fixed by `seed`.
    ///
    /// Deterministic factories cannot be locked.
    pub fn deterministic(spec: KeySetSpec, label: impl Into<String>, seed: &[u8]) -> Self {
        let digest = Sha256::new().chain_update(DETERMINISTIC_LABEL).chain_update(seed).finalize();
        let mut master_secret = Zeroizing::new([0u8; MASTER_SECRET_SIZE]);
        master_secret.copy_from_slice(&digest);

        Self { source: FactorySource::Deterministic, spec, label: label.into(), master_secret }
    }

    pub(crate) fn agreed(
        spec: KeySetSpec,
        label: impl Into<String>,
        master_secret: Zeroizing<[u8; MASTER_SECRET_SIZE]>,
    ) -> Self {
        Self { source: FactorySource::Agreed, spec, label: label.into(), master_secret }
    }

    /// Origin of the master secret.
    pub fn source(&self) -> FactorySource {
        self.source
    }

    /// Default shape of KeySets created by this factory.
    pub fn spec(&self) -> KeySetSpec {
        self.spec
    }

    /// Human-readable label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether this factory may be protected by a password lock.
    pub fn is_lockable(&self) -> bool {
        self.source != FactorySource::Deterministic
    }

    /// Create a fresh random KeySet of the factory's spec.
    pub fn create_key_set(&self, entropy: &mut impl Entropy) -> KeySet {
        KeySet::random(self.spec, entropy)
    }

    /// Re-derive the KeySet bound to `context`.
    ///
    /// The same factory and context always produce the same KeySet;
    /// different contexts produce unrelated KeySets.
    ///
    /// # Errors
    ///
    /// - `FactoryError::EmptyContext` if `context` is empty
    pub fn derive_key_set(&self, context: &[u8]) -> Result<KeySet, FactoryError> {
        if context.is_empty() {
            return Err(FactoryError::EmptyContext);
        }

        let seed: [u8; 32] = Sha256::new()
            .chain_update(CONTEXT_LABEL)
            .chain_update((self.label.len() as u64).to_be_bytes())
            .chain_update(self.label.as_bytes())
            .chain_update(context)
            .finalize()
            .into();

        let key_set =
            KeySet::from_secret(self.spec, &self.master_secret[..], context, &mut SeededStream::from_seed(seed))?;
        Ok(key_set)
    }
}

impl PartialEq for SecurityFactory {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.spec == other.spec
            && self.label == other.label
            && bool::from(self.master_secret[..].ct_eq(&other.master_secret[..]))
    }
}

impl Eq for SecurityFactory {}

impl fmt::Debug for SecurityFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityFactory")
            .field("source", &self.source)
            .field("spec", &self.spec)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

fn content_len(spec: KeySetSpec, label_len: usize) -> der::Result<Length> {
    tlv::sum([
        // Source wire values are single-byte INTEGERs
        tlv::integer_len(FactorySource::Random.wire_value()),
        spec.encoded_len(),
        tlv::octet_string_len(label_len),
        tlv::octet_string_len(MASTER_SECRET_SIZE),
    ])
}

impl Canonical for SecurityFactory {
    fn encoded_len(&self) -> der::Result<Length> {
        tlv::sequence_len(content_len(self.spec, self.label.len())?)
    }

    fn encode(&self, writer: &mut impl Writer) -> der::Result<()> {
        tlv::write_sequence_header(writer, content_len(self.spec, self.label.len())?)?;
        tlv::write_integer(writer, self.source.wire_value())?;
        self.spec.encode(writer)?;
        tlv::write_octet_string(writer, self.label.as_bytes())?;
        tlv::write_octet_string(writer, &self.master_secret[..])
    }

    fn decode_from(reader: &mut SliceReader<'_>) -> ProtoResult<Self> {
        let mut seq = tlv::read_sequence(reader)?;

        let value = tlv::read_integer(&mut seq)?;
        let source = FactorySource::from_wire_value(value)
            .ok_or(ProtocolError::InvalidValue { field: "factory source", value })?;
        let spec = KeySetSpec::decode_from(&mut seq)?;

        let label = std::str::from_utf8(tlv::read_octet_string(&mut seq)?)
            .map_err(|_| ProtocolError::InvalidText { field: "factory label" })?
            .to_owned();

        let secret = tlv::read_octet_string(&mut seq)?;
        if secret.len() != MASTER_SECRET_SIZE {
            return Err(ProtocolError::InvalidField {
                field: "master secret",
                expected: MASTER_SECRET_SIZE,
                actual: secret.len(),
            });
        }
        let mut master_secret = Zeroizing::new([0u8; MASTER_SECRET_SIZE]);
        master_secret.copy_from_slice(secret);

        tlv::finish(&seq)?;

        Ok(Self { source, spec, label, master_secret })
    }
}

#[cfg(test)]
mod tests {
    use keyset_crypto::{KeyLength, SeededStream};

    use super::*;

    fn spec() -> KeySetSpec {
        KeySetSpec::new(KeyLength::Bits256, 2).unwrap()
    }

    #[test]
    fn random_factories_differ() {
        let mut entropy = SeededStream::from_u64(1);
        let a = SecurityFactory::random(spec(), "books", &mut entropy);
        let b = SecurityFactory::random(spec(), "books", &mut entropy);
        assert_ne!(a, b);
        assert!(a.is_lockable());
        assert_eq!(a.source(), FactorySource::Random);
    }

    #[test]
    fn deterministic_factories_are_reproducible_and_not_lockable() {
        let a = SecurityFactory::deterministic(spec(), "fixture", b"seed");
        let b = SecurityFactory::deterministic(spec(), "fixture", b"seed");
        let c = SecurityFactory::deterministic(spec(), "fixture", b"other seed");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_lockable());
    }

    #[test]
    fn created_key_sets_use_factory_spec() {
        let factory = SecurityFactory::random(spec(), "books", &mut SeededStream::from_u64(2));
        let ks = factory.create_key_set(&mut SeededStream::from_u64(3));
        assert_eq!(ks.spec(), spec());
    }

    #[test]
    fn derive_key_set_is_context_bound() {
        let factory = SecurityFactory::deterministic(spec(), "fixture", b"seed");

        let a = factory.derive_key_set(b"ledger-2024").unwrap();
        let b = factory.derive_key_set(b"ledger-2024").unwrap();
        let c = factory.derive_key_set(b"ledger-2025").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(factory.derive_key_set(b""), Err(FactoryError::EmptyContext));
    }

    #[test]
    fn label_separates_derivations() {
        let a = SecurityFactory::deterministic(spec(), "one", b"seed");
        let mut b = a.clone();
        b.label = "two".to_owned();

        assert_ne!(a.derive_key_set(b"ctx").unwrap(), b.derive_key_set(b"ctx").unwrap());
    }

    #[test]
    fn canonical_roundtrip() {
        let factory = SecurityFactory::random(spec(), "household accounts", &mut SeededStream::from_u64(4));
        let bytes = factory.to_canonical_bytes().unwrap();

        assert_eq!(Length::try_from(bytes.len()).unwrap(), factory.encoded_len().unwrap());
        assert_eq!(SecurityFactory::from_canonical_bytes(&bytes).unwrap(), factory);
    }

    #[test]
    fn factory_layout_snapshot() {
        let factory = SecurityFactory::agreed(spec(), "books", Zeroizing::new([0x11; MASTER_SECRET_SIZE]));

        insta::assert_snapshot!(
            hex::encode(factory.to_canonical_bytes().unwrap()),
            @"30350201033007020201000201020405626f6f6b7304201111111111111111111111111111111111111111111111111111111111111111"
        );
    }

    #[test]
    fn decode_rejects_unknown_source() {
        let factory = SecurityFactory::random(spec(), "x", &mut SeededStream::from_u64(5));
        let mut bytes = factory.to_canonical_bytes().unwrap();
        // SEQUENCE header (2), INTEGER header (2), source value
        assert_eq!(bytes[4], 0x01);
        bytes[4] = 0x09;

        assert_eq!(
            SecurityFactory::from_canonical_bytes(&bytes),
            Err(ProtocolError::InvalidValue { field: "factory source", value: 9 })
        );
    }

    #[test]
    fn decode_rejects_invalid_label() {
        let content = content_len(spec(), 2).unwrap();
        let mut bytes = vec![0u8; usize::try_from(tlv::sequence_len(content).unwrap()).unwrap()];
        let mut writer = der::SliceWriter::new(&mut bytes);
        tlv::write_sequence_header(&mut writer, content).unwrap();
        tlv::write_integer(&mut writer, 1).unwrap();
        spec().encode(&mut writer).unwrap();
        tlv::write_octet_string(&mut writer, &[0xFF, 0xFE]).unwrap();
        tlv::write_octet_string(&mut writer, &[0u8; MASTER_SECRET_SIZE]).unwrap();
        writer.finish().unwrap();

        assert_eq!(
            SecurityFactory::from_canonical_bytes(&bytes),
            Err(ProtocolError::InvalidText { field: "factory label" })
        );
    }

    #[test]
    fn debug_redacts_master_secret() {
        let factory = SecurityFactory::deterministic(spec(), "fixture", b"seed");
        let rendered = format!("{factory:?}");
        assert!(rendered.contains("fixture"));
        assert!(!rendered.contains("master_secret"));
    }
}
