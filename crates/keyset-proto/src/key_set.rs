//! Canonical encoding of KeySetSpec and KeySet.
//!
//! ```text
//! KeySetSpec ::= SEQUENCE { keyLength INTEGER (bits), cipherCount INTEGER }
//! KeySet     ::= SEQUENCE { spec KeySetSpec, keys SEQUENCE OF KeyEntry }
//! KeyEntry   ::= SEQUENCE { algorithm INTEGER (ordinal + 1), key OCTET STRING }
//! ```
//!
//! Entries are written in KeySet order. That order is the cipher chain's stage
//! order, so it must survive a round trip.

use der::{Length, Reader, SliceReader, Writer};
use keyset_crypto::{CipherAlgorithmId, KeySet, KeySetSpec};
use zeroize::Zeroizing;

use crate::{
    canonical::Canonical,
    errors::{ProtocolError, Result},
    tlv,
};

fn spec_content_len(spec: KeySetSpec) -> der::Result<Length> {
    tlv::sum([
        tlv::integer_len(u64::from(spec.key_length().bits())),
        tlv::integer_len(spec.cipher_count() as u64),
    ])
}

/// Content length of one key entry. Wire values are all below 0x80, so every
/// algorithm INTEGER has the length of the first one.
fn entry_content_len(key_len: usize) -> der::Result<Length> {
    tlv::sum([tlv::integer_len(u64::from(CipherAlgorithmId::Aes.wire_value())), tlv::octet_string_len(key_len)])
}

fn entries_content_len(spec: KeySetSpec) -> der::Result<Length> {
    let entry = tlv::sequence_len(entry_content_len(spec.key_length().bytes())?);
    tlv::sum((0..spec.cipher_count()).map(|_| entry))
}

fn spec_len(spec: KeySetSpec) -> der::Result<Length> {
    tlv::sequence_len(spec_content_len(spec)?)
}

fn key_set_content_len(spec: KeySetSpec) -> der::Result<Length> {
    tlv::sum([spec_len(spec), entries_content_len(spec).and_then(tlv::sequence_len)])
}

fn key_set_len(spec: KeySetSpec) -> der::Result<Length> {
    tlv::sequence_len(key_set_content_len(spec)?)
}

/// Encoded length of a KeySetSpec.
pub fn spec_encoded_len(spec: KeySetSpec) -> usize {
    let Ok(len) = tlv::to_usize(spec_len(spec)) else {
        unreachable!("a KeySetSpec encodes in a handful of bytes");
    };
    len
}

/// Encoded length of any KeySet of `spec`, computed without key material.
pub fn key_set_encoded_len(spec: KeySetSpec) -> usize {
    let Ok(len) = tlv::to_usize(key_set_len(spec)) else {
        unreachable!("a KeySet holds at most a few hundred key bytes");
    };
    len
}

impl Canonical for KeySetSpec {
    fn encoded_len(&self) -> der::Result<Length> {
        spec_len(*self)
    }

    fn encode(&self, writer: &mut impl Writer) -> der::Result<()> {
        tlv::write_sequence_header(writer, spec_content_len(*self)?)?;
        tlv::write_integer(writer, u64::from(self.key_length().bits()))?;
        tlv::write_integer(writer, self.cipher_count() as u64)
    }

    fn decode_from(reader: &mut SliceReader<'_>) -> Result<Self> {
        let mut seq = tlv::read_sequence(reader)?;
        let key_length_bits = tlv::read_integer(&mut seq)?;
        let cipher_count = tlv::read_integer(&mut seq)?;
        tlv::finish(&seq)?;

        Ok(Self::from_raw(key_length_bits, cipher_count)?)
    }
}

impl Canonical for KeySet {
    fn encoded_len(&self) -> der::Result<Length> {
        key_set_len(self.spec())
    }

    fn encode(&self, writer: &mut impl Writer) -> der::Result<()> {
        let spec = self.spec();
        tlv::write_sequence_header(writer, key_set_content_len(spec)?)?;
        spec.encode(writer)?;

        tlv::write_sequence_header(writer, entries_content_len(spec)?)?;
        for (algorithm, key) in self.iter() {
            tlv::write_sequence_header(writer, entry_content_len(key.len())?)?;
            tlv::write_integer(writer, u64::from(algorithm.wire_value()))?;
            tlv::write_octet_string(writer, key)?;
        }
        Ok(())
    }

    fn decode_from(reader: &mut SliceReader<'_>) -> Result<Self> {
        let mut seq = tlv::read_sequence(reader)?;
        let spec = KeySetSpec::decode_from(&mut seq)?;
        let mut entries_reader = tlv::read_sequence(&mut seq)?;
        tlv::finish(&seq)?;

        // Never read more entries than the spec allows
        let mut entries = Vec::with_capacity(spec.cipher_count());
        while entries.len() < spec.cipher_count() && !entries_reader.is_finished() {
            let mut entry = tlv::read_sequence(&mut entries_reader)?;
            let value = tlv::read_integer(&mut entry)?;
            let algorithm = CipherAlgorithmId::from_wire_value(value)
                .ok_or(ProtocolError::InvalidAlgorithm { value })?;
            let key = Zeroizing::new(tlv::read_octet_string(&mut entry)?.to_vec());
            tlv::finish(&entry)?;

            entries.push((algorithm, key));
        }
        tlv::finish(&entries_reader)?;

        Ok(Self::from_parts(spec, entries)?)
    }
}
