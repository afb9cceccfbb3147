//! Keyed MAC algorithms used by the KDF.
//!
//! The KDF picks two of these per derivation from its seeded stream, so the
//! derivation path itself depends on the recipe seed.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use sha3::{Sha3_256, Sha3_512};
use zeroize::Zeroizing;

/// MAC algorithms available to the KDF, in stable index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAlgorithm {
    /// HMAC-SHA256 (32-byte output)
    HmacSha256,
    /// HMAC-SHA512 (64-byte output)
    HmacSha512,
    /// HMAC-SHA3-256 (32-byte output)
    HmacSha3_256,
    /// HMAC-SHA3-512 (64-byte output)
    HmacSha3_512,
}

impl MacAlgorithm {
    /// All algorithms in index order. The order is part of the derivation
    /// and must never change.
    pub const ALL: [Self; 4] = [Self::HmacSha256, Self::HmacSha512, Self::HmacSha3_256, Self::HmacSha3_512];

    /// Pick an algorithm from a stream value.
    pub fn from_stream_value(value: u32) -> Self {
        Self::ALL[value as usize % Self::ALL.len()]
    }

    /// Name mixed into every KDF section preamble.
    pub fn name(self) -> &'static str {
        match self {
            Self::HmacSha256 => "HMAC-SHA256",
            Self::HmacSha512 => "HMAC-SHA512",
            Self::HmacSha3_256 => "HMAC-SHA3-256",
            Self::HmacSha3_512 => "HMAC-SHA3-512",
        }
    }

    /// Output size in bytes.
    pub fn output_size(self) -> usize {
        match self {
            Self::HmacSha256 | Self::HmacSha3_256 => 32,
            Self::HmacSha512 | Self::HmacSha3_512 => 64,
        }
    }

    /// Key a MAC instance with `key`.
    pub(crate) fn keyed(self, key: &[u8]) -> KeyedMac {
        match self {
            Self::HmacSha256 => {
                let Ok(mac) = Hmac::<Sha256>::new_from_slice(key) else {
                    unreachable!("HMAC accepts any key size");
                };
                KeyedMac::Sha256(mac)
            },
            Self::HmacSha512 => {
                let Ok(mac) = Hmac::<Sha512>::new_from_slice(key) else {
                    unreachable!("HMAC accepts any key size");
                };
                KeyedMac::Sha512(mac)
            },
            Self::HmacSha3_256 => {
                let Ok(mac) = Hmac::<Sha3_256>::new_from_slice(key) else {
                    unreachable!("HMAC accepts any key size");
                };
                KeyedMac::Sha3_256(mac)
            },
            Self::HmacSha3_512 => {
                let Ok(mac) = Hmac::<Sha3_512>::new_from_slice(key) else {
                    unreachable!("HMAC accepts any key size");
                };
                KeyedMac::Sha3_512(mac)
            },
        }
    }
}

impl std::fmt::Display for MacAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A keyed MAC state. Cloning snapshots the state so a preamble can be
/// absorbed once and reused every round.
#[derive(Clone)]
pub(crate) enum KeyedMac {
    Sha256(Hmac<Sha256>),
    Sha512(Hmac<Sha512>),
    Sha3_256(Hmac<Sha3_256>),
    Sha3_512(Hmac<Sha3_512>),
}

impl KeyedMac {
    pub(crate) fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(mac) => mac.update(data),
            Self::Sha512(mac) => mac.update(data),
            Self::Sha3_256(mac) => mac.update(data),
            Self::Sha3_512(mac) => mac.update(data),
        }
    }

    pub(crate) fn finalize(self) -> Zeroizing<Vec<u8>> {
        match self {
            Self::Sha256(mac) => Zeroizing::new(mac.finalize().into_bytes().to_vec()),
            Self::Sha512(mac) => Zeroizing::new(mac.finalize().into_bytes().to_vec()),
            Self::Sha3_256(mac) => Zeroizing::new(mac.finalize().into_bytes().to_vec()),
            Self::Sha3_512(mac) => Zeroizing::new(mac.finalize().into_bytes().to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_sizes_match_finalized_length() {
        for algorithm in MacAlgorithm::ALL {
            let mut mac = algorithm.keyed(b"key");
            mac.update(b"data");
            assert_eq!(mac.finalize().len(), algorithm.output_size(), "{algorithm}");
        }
    }

    #[test]
    fn stream_value_selection_wraps() {
        assert_eq!(MacAlgorithm::from_stream_value(0), MacAlgorithm::HmacSha256);
        assert_eq!(MacAlgorithm::from_stream_value(3), MacAlgorithm::HmacSha3_512);
        assert_eq!(MacAlgorithm::from_stream_value(5), MacAlgorithm::HmacSha512);
        assert_eq!(MacAlgorithm::from_stream_value(u32::MAX), MacAlgorithm::HmacSha3_512);
    }

    #[test]
    fn cloned_state_continues_independently() {
        let mut base = MacAlgorithm::HmacSha256.keyed(b"key");
        base.update(b"preamble");

        let mut a = base.clone();
        a.update(b"round");
        let mut b = base;
        b.update(b"round");

        assert_eq!(*a.finalize(), *b.finalize());
    }

    #[test]
    fn hmac_sha256_known_answer() {
        // RFC 4231 test case 2
        let mut mac = MacAlgorithm::HmacSha256.keyed(b"Jefe");
        mac.update(b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(&*mac.finalize()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
