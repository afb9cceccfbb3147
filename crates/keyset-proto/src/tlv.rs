//! Field helpers over the `der` crate.
//!
//! The canonical shapes only need SEQUENCE, INTEGER and OCTET STRING, plus
//! NULL, which reads as a null sequence. `der` enforces minimal lengths and
//! minimal integers in both directions, so each value has exactly one
//! encoding.
//!
//! Decoding walks one level at a time: [`read_sequence`] returns a fresh
//! [`SliceReader`] over the sequence content, and [`finish`] requires that a
//! level was fully consumed.
//!
//! # Security
//!
//! - Bounds: `der` checks every length against the remaining input before
//!   taking a slice, so decoding never panics on untrusted bytes
//! - No recursion: readers only descend as deep as the caller's fixed shape
//!   asks them to

use der::{
    Decode, Encode, Header, Length, Reader, SliceReader, Tag, Writer,
    asn1::{Null, OctetStringRef},
};

use crate::errors::{ProtocolError, Result};

/// Reader over a complete encoded object.
///
/// # Errors
///
/// - `ProtocolError::NullSequence` if `bytes` is empty
pub fn root(bytes: &[u8]) -> Result<SliceReader<'_>> {
    if bytes.is_empty() {
        return Err(ProtocolError::NullSequence);
    }
    Ok(SliceReader::new(bytes)?)
}

/// Require that `reader` is fully consumed.
///
/// # Errors
///
/// - `ProtocolError::UnexpectedValues` if bytes remain
pub fn finish(reader: &SliceReader<'_>) -> Result<()> {
    if reader.is_finished() { Ok(()) } else { Err(ProtocolError::UnexpectedValues) }
}

/// Read the next SEQUENCE and return a reader over its content.
///
/// # Errors
///
/// - `ProtocolError::NullSequence` if the element is an empty NULL
/// - `ProtocolError::Parse` on any other tag or a malformed element
pub fn read_sequence<'a>(reader: &mut SliceReader<'a>) -> Result<SliceReader<'a>> {
    if reader.peek_tag()? == Tag::Null {
        Null::decode(reader)?;
        return Err(ProtocolError::NullSequence);
    }

    let header = Header::decode(reader)?;
    header.tag.assert_eq(Tag::Sequence)?;
    let content = reader.read_slice(header.length)?;
    Ok(SliceReader::new(content)?)
}

/// Read the next INTEGER as a non-negative `u64`.
///
/// # Errors
///
/// - `ProtocolError::Parse` on a wrong tag, a negative or non-minimal
///   encoding, or a value above `u64::MAX`
pub fn read_integer(reader: &mut SliceReader<'_>) -> Result<u64> {
    Ok(u64::decode(reader)?)
}

/// Read the next OCTET STRING.
///
/// # Errors
///
/// - `ProtocolError::Parse` on a wrong tag or a malformed length
pub fn read_octet_string<'a>(reader: &mut SliceReader<'a>) -> Result<&'a [u8]> {
    Ok(OctetStringRef::decode(reader)?.as_bytes())
}

/// Encoded length of an INTEGER holding `value`.
pub fn integer_len(value: u64) -> der::Result<Length> {
    value.encoded_len()
}

/// Encoded length of an OCTET STRING of `len` bytes.
pub fn octet_string_len(len: usize) -> der::Result<Length> {
    Length::try_from(len)?.for_tlv()
}

/// Encoded length of a SEQUENCE with `content_len` bytes of content.
pub fn sequence_len(content_len: Length) -> der::Result<Length> {
    content_len.for_tlv()
}

/// Sum element lengths, failing on the first error or on overflow.
pub fn sum(parts: impl IntoIterator<Item = der::Result<Length>>) -> der::Result<Length> {
    parts.into_iter().try_fold(Length::ZERO, |total, part| total + part?)
}

/// Convert a length for callers that size buffers in `usize`.
///
/// # Errors
///
/// - `ProtocolError::Encode` if the length cannot be computed
pub fn to_usize(len: der::Result<Length>) -> Result<usize> {
    len.and_then(usize::try_from).map_err(ProtocolError::encode)
}

/// Write a SEQUENCE header for `content_len` bytes of content.
pub fn write_sequence_header(writer: &mut impl Writer, content_len: Length) -> der::Result<()> {
    Header::new(Tag::Sequence, content_len)?.encode(writer)
}

/// Write a complete INTEGER element.
pub fn write_integer(writer: &mut impl Writer, value: u64) -> der::Result<()> {
    value.encode(writer)
}

/// Write a complete OCTET STRING element.
pub fn write_octet_string(writer: &mut impl Writer, bytes: &[u8]) -> der::Result<()> {
    OctetStringRef::new(bytes)?.encode(writer)
}

#[cfg(test)]
mod tests {
    use der::SliceWriter;

    use super::*;
    use crate::ErrorKind;

    fn written(write: impl FnOnce(&mut SliceWriter<'_>) -> der::Result<()>) -> Vec<u8> {
        let mut buf = vec![0u8; 1024];
        let mut writer = SliceWriter::new(&mut buf);
        write(&mut writer).unwrap();
        writer.finish().unwrap().to_vec()
    }

    fn integer_bytes(value: u64) -> Vec<u8> {
        written(|w| write_integer(w, value))
    }

    fn is_parse_error<T: std::fmt::Debug>(result: Result<T>) -> bool {
        matches!(result, Err(ProtocolError::Parse { .. }))
    }

    #[test]
    fn integer_encoding_is_minimal() {
        assert_eq!(integer_bytes(0), [0x02, 0x01, 0x00]);
        assert_eq!(integer_bytes(3), [0x02, 0x01, 0x03]);
        assert_eq!(integer_bytes(127), [0x02, 0x01, 0x7F]);
        assert_eq!(integer_bytes(128), [0x02, 0x02, 0x00, 0x80]);
        assert_eq!(integer_bytes(256), [0x02, 0x02, 0x01, 0x00]);
        assert_eq!(integer_bytes(u64::MAX).len(), 2 + 9);
    }

    #[test]
    fn integer_len_matches_writer() {
        for value in [0, 1, 0x7F, 0x80, 0xFF, 0x100, 0x7FFF, 0x8000, u64::from(u32::MAX), u64::MAX] {
            let expected = usize::try_from(integer_len(value).unwrap()).unwrap();
            assert_eq!(integer_bytes(value).len(), expected, "value {value}");
        }
    }

    #[test]
    fn integer_roundtrip_edges() {
        for value in [0, 1, 0x7F, 0x80, 0xFF, 0x100, u64::MAX - 1, u64::MAX] {
            let bytes = integer_bytes(value);
            let mut reader = SliceReader::new(&bytes).unwrap();
            assert_eq!(read_integer(&mut reader).unwrap(), value);
            assert_eq!(finish(&reader), Ok(()));
        }
    }

    #[test]
    fn rejects_non_minimal_integers() {
        let mut reader = SliceReader::new(&[0x02, 0x02, 0x00, 0x01]).unwrap();
        assert!(is_parse_error(read_integer(&mut reader)));
    }

    #[test]
    fn rejects_negative_and_empty_integers() {
        assert!(is_parse_error(read_integer(&mut SliceReader::new(&[0x02, 0x01, 0x80]).unwrap())));
        assert!(is_parse_error(read_integer(&mut SliceReader::new(&[0x02, 0x00]).unwrap())));
    }

    #[test]
    fn rejects_oversized_integers() {
        let mut bytes = vec![0x02, 0x09, 0x01];
        bytes.extend_from_slice(&[0u8; 8]);
        assert!(is_parse_error(read_integer(&mut SliceReader::new(&bytes).unwrap())));
    }

    #[test]
    fn long_form_lengths() {
        let payload = vec![0xAAu8; 300];
        let bytes = written(|w| write_octet_string(w, &payload));
        assert_eq!(&bytes[..4], &[0x04, 0x82, 0x01, 0x2C]);
        assert_eq!(bytes.len(), usize::try_from(octet_string_len(300).unwrap()).unwrap());

        let mut reader = SliceReader::new(&bytes).unwrap();
        assert_eq!(read_octet_string(&mut reader).unwrap(), payload.as_slice());
    }

    #[test]
    fn rejects_non_minimal_lengths() {
        // 0x81 0x05 should have been written as 0x05
        let bytes = [0x04, 0x81, 0x05, 1, 2, 3, 4, 5];
        assert!(is_parse_error(read_octet_string(&mut SliceReader::new(&bytes).unwrap())));

        // Leading zero length octet
        let bytes = [0x04, 0x82, 0x00, 0x80];
        assert!(is_parse_error(read_octet_string(&mut SliceReader::new(&bytes).unwrap())));
    }

    #[test]
    fn rejects_indefinite_and_huge_lengths() {
        assert!(is_parse_error(read_sequence(&mut SliceReader::new(&[0x30, 0x80, 0x00, 0x00]).unwrap())));
        assert!(is_parse_error(read_octet_string(&mut SliceReader::new(&[0x04, 0x85, 1, 0, 0, 0, 0]).unwrap())));
    }

    #[test]
    fn truncated_content_is_io_error() {
        let err = read_octet_string(&mut SliceReader::new(&[0x04, 0x05, 1, 2]).unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn null_reads_as_null_sequence() {
        let mut reader = SliceReader::new(&[0x05, 0x00]).unwrap();
        assert_eq!(read_sequence(&mut reader).unwrap_err(), ProtocolError::NullSequence);

        let mut reader = SliceReader::new(&[0x05, 0x01, 0x00]).unwrap();
        assert!(is_parse_error(read_sequence(&mut reader)));
    }

    #[test]
    fn wrong_tag_is_rejected() {
        assert!(is_parse_error(read_sequence(&mut SliceReader::new(&[0x04, 0x00]).unwrap())));
        assert!(is_parse_error(read_integer(&mut SliceReader::new(&[0x30, 0x00]).unwrap())));
    }

    #[test]
    fn sequence_reader_covers_only_its_content() {
        let bytes = [0x30, 0x03, 0x02, 0x01, 0x07, 0x02, 0x01, 0x08];
        let mut outer = SliceReader::new(&bytes).unwrap();

        let mut inner = read_sequence(&mut outer).unwrap();
        assert_eq!(read_integer(&mut inner).unwrap(), 7);
        assert_eq!(finish(&inner), Ok(()));

        assert_eq!(finish(&outer), Err(ProtocolError::UnexpectedValues));
        assert_eq!(read_integer(&mut outer).unwrap(), 8);
        assert_eq!(finish(&outer), Ok(()));
    }

    #[test]
    fn root_rejects_empty_input() {
        assert_eq!(root(&[]).unwrap_err(), ProtocolError::NullSequence);
    }

    #[test]
    fn sum_adds_element_lengths() {
        let total = sum([integer_len(1), octet_string_len(16), octet_string_len(300)]).unwrap();
        assert_eq!(usize::try_from(total).unwrap(), 3 + 18 + 304);
        assert_eq!(usize::try_from(sequence_len(total).unwrap()).unwrap(), 3 + 18 + 304 + 4);
    }
}
