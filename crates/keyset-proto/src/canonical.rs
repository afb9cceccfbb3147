//! The `Canonical` trait: one exact byte encoding per value.

use der::{Length, SliceReader, SliceWriter, Writer};

use crate::{
    errors::{ProtocolError, Result},
    tlv,
};

/// A value with exactly one canonical DER encoding.
///
/// # Invariants
///
/// - `encode` writes exactly `encoded_len()` bytes
/// - `decode_from(encode(x)) == x` and consumes exactly those bytes
/// - Decoding rejects every non-canonical input rather than normalizing it
pub trait Canonical: Sized {
    /// Exact length of the encoding.
    ///
    /// # Errors
    ///
    /// Fails only if the encoding would exceed the largest DER length.
    fn encoded_len(&self) -> der::Result<Length>;

    /// Write the encoding.
    ///
    /// # Errors
    ///
    /// Fails if `writer` runs out of space or a length overflows.
    fn encode(&self, writer: &mut impl Writer) -> der::Result<()>;

    /// Read one value from the current level of `reader`.
    fn decode_from(reader: &mut SliceReader<'_>) -> Result<Self>;

    /// Encode into a freshly allocated buffer.
    ///
    /// The buffer is allocated at its final size and never reallocates, so a
    /// caller wrapping it in `Zeroizing` wipes every copy of secret content.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if the value is too large to encode
    fn to_canonical_bytes(&self) -> Result<Vec<u8>> {
        encode_exact(self).map_err(ProtocolError::encode)
    }

    /// Decode a complete encoding, rejecting trailing bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::NullSequence` for empty input or a NULL root
    /// - `ProtocolError::UnexpectedValues` for bytes after the root element
    /// - Any error from [`Canonical::decode_from`]
    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = tlv::root(bytes)?;
        let value = Self::decode_from(&mut reader)?;
        tlv::finish(&reader)?;
        Ok(value)
    }
}

fn encode_exact<T: Canonical>(value: &T) -> der::Result<Vec<u8>> {
    let mut buf = vec![0u8; usize::try_from(value.encoded_len()?)?];

    let mut writer = SliceWriter::new(&mut buf);
    value.encode(&mut writer)?;
    let written = writer.finish()?.len();

    debug_assert_eq!(written, buf.len(), "encoded_len disagrees with encode");
    buf.truncate(written);
    Ok(buf)
}
