//! Cipher chain: cascade wrap/unwrap under a KeySet
//!
//! Every KeySet entry becomes one stage. Stages are keystream ciphers, so each
//! stage is its own inverse and unwrap runs them in the same forward order as
//! wrap. The stage position is bound into key expansion, so reordering a
//! KeySet yields a different cascade.
//!
//! ```text
//! stage_i keys  = HKDF(key_i, "enc" ‖ name_i ‖ i), HKDF(key_i, "mac" ‖ name_i ‖ i)
//! siv           = XOR_i HMAC(mac_i, plaintext)[..16]
//! body          = plaintext ^ ks_1(siv) ^ ks_2(siv) ^ ... ^ ks_n(siv)
//! ciphertext    = siv ‖ body
//! ```
//!
//! # Security
//!
//! - Deterministic (SIV): no nonce is stored or drawn from fresh randomness,
//!   so a password-derived KeySet reproduces the exact ciphertext
//! - Integrity: unwrap recomputes the SIV and compares in constant time
//! - Defense in depth: recovering the plaintext requires every stage key;
//!   forging the SIV requires every stage MAC key
//! - Deterministic encryption reveals equality of identical plaintexts under
//!   the same KeySet and nothing else

use aes::{Aes128, Aes256};
use chacha20::ChaCha20;
use ctr::{
    Ctr128BE,
    cipher::{KeyIvInit, StreamCipher},
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sha3::{
    Shake256,
    digest::{ExtendableOutput, Update, XofReader},
};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{
    error::ChainError,
    keyset::{CipherAlgorithmId, KeyLength, KeySet, KeySetSpec},
};

type HmacSha256 = Hmac<Sha256>;

/// Size of the synthetic IV prefixed to every ciphertext
pub const SIV_SIZE: usize = 16;

/// Label for stage encryption key expansion
const STAGE_ENC_LABEL: &[u8] = b"keysetStageEnc";

/// Label for stage MAC key expansion
const STAGE_MAC_LABEL: &[u8] = b"keysetStageMac";

/// Keystream block size used when an XOF fills the keystream
const KEYSTREAM_CHUNK: usize = 64;

/// One expanded chain stage.
struct Stage {
    algorithm: CipherAlgorithmId,
    enc_key: Zeroizing<Vec<u8>>,
    mac_key: Zeroizing<[u8; 32]>,
}

impl Stage {
    fn expand(position: u8, algorithm: CipherAlgorithmId, key: &[u8]) -> Self {
        let hkdf = Hkdf::<Sha256>::new(None, key);
        let name = algorithm.name().as_bytes();
        let position = [position];

        let enc_len = match algorithm {
            // AES keeps the KeySet's key strength: AES-128 or AES-256
            CipherAlgorithmId::Aes => key.len(),
            CipherAlgorithmId::ChaCha20 | CipherAlgorithmId::Blake3 | CipherAlgorithmId::Shake256 => 32,
        };

        let mut enc_key = Zeroizing::new(vec![0u8; enc_len]);
        let Ok(()) = hkdf.expand_multi_info(&[STAGE_ENC_LABEL, name, &position[..]], &mut enc_key)
        else {
            unreachable!("stage keys are far below the HKDF-SHA256 output limit");
        };

        let mut mac_key = Zeroizing::new([0u8; 32]);
        let Ok(()) = hkdf.expand_multi_info(&[STAGE_MAC_LABEL, name, &position[..]], &mut mac_key[..]) else {
            unreachable!("32 bytes is a valid HKDF-SHA256 output length");
        };

        Self { algorithm, enc_key, mac_key }
    }

    /// First 16 bytes of this stage's MAC over the plaintext.
    fn tag(&self, plaintext: &[u8]) -> [u8; SIV_SIZE] {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.mac_key[..]) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        // Both `Mac` and the XOF `Update` trait are in scope here
        Mac::update(&mut mac, self.algorithm.name().as_bytes());
        Mac::update(&mut mac, plaintext);
        let result = mac.finalize().into_bytes();

        let mut tag = [0u8; SIV_SIZE];
        tag.copy_from_slice(&result[..SIV_SIZE]);
        tag
    }

    /// XOR this stage's keystream (nonce derived from the SIV) into `buf`.
    fn apply_keystream(&self, siv: &[u8; SIV_SIZE], buf: &mut [u8]) {
        match self.algorithm {
            CipherAlgorithmId::Aes => {
                if self.enc_key.len() == KeyLength::Bits128.bytes() {
                    apply_stream_cipher::<Ctr128BE<Aes128>>(&self.enc_key, siv, buf);
                } else {
                    apply_stream_cipher::<Ctr128BE<Aes256>>(&self.enc_key, siv, buf);
                }
            },
            CipherAlgorithmId::ChaCha20 => {
                apply_stream_cipher::<ChaCha20>(&self.enc_key, &siv[..12], buf);
            },
            CipherAlgorithmId::Blake3 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&self.enc_key);
                let mut hasher = blake3::Hasher::new_keyed(&key);
                hasher.update(siv);
                let mut reader = hasher.finalize_xof();
                xor_from_reader(|chunk| reader.fill(chunk), buf);
                zeroize::Zeroize::zeroize(&mut key);
            },
            CipherAlgorithmId::Shake256 => {
                let mut hasher = Shake256::default();
                hasher.update(&self.enc_key);
                hasher.update(siv);
                let mut reader = hasher.finalize_xof();
                xor_from_reader(|chunk| reader.read(chunk), buf);
            },
        }
    }
}

fn apply_stream_cipher<C: KeyIvInit + StreamCipher>(key: &[u8], iv: &[u8], buf: &mut [u8]) {
    let Ok(mut cipher) = C::new_from_slices(key, iv) else {
        unreachable!("stage key and nonce sizes match the cipher");
    };
    cipher.apply_keystream(buf);
}

fn xor_from_reader(mut fill: impl FnMut(&mut [u8]), buf: &mut [u8]) {
    let mut keystream = Zeroizing::new([0u8; KEYSTREAM_CHUNK]);
    for block in buf.chunks_mut(KEYSTREAM_CHUNK) {
        let keystream = &mut keystream[..block.len()];
        fill(keystream);
        for (b, k) in block.iter_mut().zip(keystream.iter()) {
            *b ^= k;
        }
    }
}

fn expand_stages(key_set: &KeySet) -> Vec<Stage> {
    // A KeySet holds at most one entry per algorithm, so positions fit in a u8
    key_set
        .iter()
        .zip(0u8..)
        .map(|((algorithm, key), position)| Stage::expand(position, algorithm, key))
        .collect()
}

fn synthetic_iv(stages: &[Stage], plaintext: &[u8]) -> [u8; SIV_SIZE] {
    let mut siv = [0u8; SIV_SIZE];
    for stage in stages {
        for (s, t) in siv.iter_mut().zip(stage.tag(plaintext)) {
            *s ^= t;
        }
    }
    siv
}

/// Wrap `plaintext` under every stage of `key_set`.
///
/// Output is exactly [`encryption_length`] bytes and deterministic for a
/// given KeySet and plaintext.
pub fn wrap(key_set: &KeySet, plaintext: &[u8]) -> Vec<u8> {
    let stages = expand_stages(key_set);
    let siv = synthetic_iv(&stages, plaintext);

    let mut out = Vec::with_capacity(encryption_length(key_set.spec(), plaintext.len()));
    out.extend_from_slice(&siv);
    out.extend_from_slice(plaintext);

    let body = &mut out[SIV_SIZE..];
    for stage in &stages {
        stage.apply_keystream(&siv, body);
    }

    out
}

/// Unwrap a ciphertext produced by [`wrap`] under the same KeySet.
///
/// # Errors
///
/// - `ChainError::UnwrapFailed` if the input is shorter than the SIV or the
///   recomputed SIV does not match (wrong KeySet or tampering)
pub fn unwrap(key_set: &KeySet, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, ChainError> {
    if ciphertext.len() < SIV_SIZE {
        return Err(ChainError::UnwrapFailed);
    }

    let (siv_bytes, body) = ciphertext.split_at(SIV_SIZE);
    let mut siv = [0u8; SIV_SIZE];
    siv.copy_from_slice(siv_bytes);

    let stages = expand_stages(key_set);
    let mut plaintext = Zeroizing::new(body.to_vec());
    for stage in &stages {
        stage.apply_keystream(&siv, &mut plaintext);
    }

    let expected = synthetic_iv(&stages, &plaintext);
    if !bool::from(expected.ct_eq(&siv)) {
        // `plaintext` is zeroized on drop
        return Err(ChainError::UnwrapFailed);
    }

    Ok(plaintext)
}

/// Exact ciphertext length for a plaintext of `plaintext_len` bytes.
pub fn encryption_length(_spec: KeySetSpec, plaintext_len: usize) -> usize {
    plaintext_len + SIV_SIZE
}

/// Plaintext length for a ciphertext. `None` if too short to be valid.
pub fn decryption_length(ciphertext_len: usize) -> Option<usize> {
    ciphertext_len.checked_sub(SIV_SIZE)
}

/// Exact wrapped length of one raw key of `key_length`.
pub fn key_set_wrap_length(key_length: KeyLength) -> usize {
    key_length.bytes() + SIV_SIZE
}
