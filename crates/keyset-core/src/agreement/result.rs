//! Agreement results.
//!
//! A settled agreement yields exactly one [`AgreementResult`] variant, chosen
//! by the requested [`ResultType`]. Every variant is derived from the
//! handshake's shared secret through the KDF:
//!
//! ```text
//! stream seed = SHA-256("keysetAgreementSeed" ‖ transcript)
//! iv          = result type label
//! material    = KDF(shared secret, iv, stream, length)
//! ```

use std::fmt;

use keyset_crypto::{KeySet, KeySetError, SeededStream, kdf};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{
    handshake::{Role, SHARED_SECRET_SIZE},
    params::{AgreementParams, ResultType},
    session::{Direction, SESSION_KEY_SIZE, STREAM_NONCE_SIZE, SessionCipher, StreamKeystream},
};
use crate::{
    error::AgreementError,
    factory::{MASTER_SECRET_SIZE, SecurityFactory},
};

const SEED_LABEL: &[u8] = b"keysetAgreementSeed";

/// Label given to factories produced by an agreement.
pub const AGREED_FACTORY_LABEL: &str = "agreed";

/// Authenticated session ciphers for both directions.
#[derive(Debug)]
pub struct SymCipherPair {
    /// Cipher for messages this party sends
    pub outbound: SessionCipher,
    /// Cipher for messages this party receives
    pub inbound: SessionCipher,
}

/// Raw ChaCha20 keystreams for both directions.
#[derive(Debug)]
pub struct StreamCipherPair {
    /// Keystream for bytes this party sends
    pub outbound: StreamKeystream,
    /// Keystream for bytes this party receives
    pub inbound: StreamKeystream,
}

/// The single value an agreed negotiation produces.
pub enum AgreementResult {
    /// A security factory sharing an agreed master secret
    Factory(SecurityFactory),
    /// A KeySet of the agreed spec
    KeySet(KeySet),
    /// Authenticated session ciphers
    SymCipherPair(SymCipherPair),
    /// Raw keystream ciphers
    StreamCipherPair(StreamCipherPair),
    /// Raw shared bytes
    Bytes(Zeroizing<Vec<u8>>),
}

impl AgreementResult {
    /// Result kind of this value.
    pub fn result_type(&self) -> ResultType {
        match self {
            Self::Factory(_) => ResultType::Factory,
            Self::KeySet(_) => ResultType::KeySet,
            Self::SymCipherPair(_) => ResultType::SymCipherPair,
            Self::StreamCipherPair(_) => ResultType::StreamCipherPair,
            Self::Bytes(bytes) => ResultType::Bytes { length: bytes.len() },
        }
    }

    /// The factory, if this is a factory result.
    pub fn factory(&self) -> Option<&SecurityFactory> {
        match self {
            Self::Factory(factory) => Some(factory),
            _ => None,
        }
    }

    /// The KeySet, if this is a KeySet result.
    pub fn key_set(&self) -> Option<&KeySet> {
        match self {
            Self::KeySet(key_set) => Some(key_set),
            _ => None,
        }
    }

    /// The session ciphers, if this is a sym-cipher-pair result.
    pub fn sym_cipher_pair(&mut self) -> Option<&mut SymCipherPair> {
        match self {
            Self::SymCipherPair(pair) => Some(pair),
            _ => None,
        }
    }

    /// The keystreams, if this is a stream-cipher-pair result.
    pub fn stream_cipher_pair(&mut self) -> Option<&mut StreamCipherPair> {
        match self {
            Self::StreamCipherPair(pair) => Some(pair),
            _ => None,
        }
    }

    /// The shared bytes, if this is a bytes result.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Debug for AgreementResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Variant and shape only; never key material
        match self {
            Self::Factory(factory) => f.debug_tuple("Factory").field(factory).finish(),
            Self::KeySet(key_set) => f.debug_tuple("KeySet").field(&key_set.spec()).finish(),
            Self::SymCipherPair(pair) => f.debug_tuple("SymCipherPair").field(pair).finish(),
            Self::StreamCipherPair(pair) => f.debug_tuple("StreamCipherPair").field(pair).finish(),
            Self::Bytes(bytes) => f.debug_struct("Bytes").field("length", &bytes.len()).finish(),
        }
    }
}

/// Derive the requested result from a completed handshake.
///
/// Both roles derive identical material; pair results are mirrored so one
/// side's outbound cipher matches the other side's inbound cipher.
pub(crate) fn derive_result(
    secret: &[u8; SHARED_SECRET_SIZE],
    transcript: &[u8],
    params: &AgreementParams,
    role: Role,
) -> Result<AgreementResult, AgreementError> {
    let seed: [u8; 32] = Sha256::new().chain_update(SEED_LABEL).chain_update(transcript).finalize().into();
    let mut stream = SeededStream::from_seed(seed);
    let iv = params.result_type.label();

    let result = match params.result_type {
        ResultType::Factory => {
            let bytes = material(secret, iv, &mut stream, MASTER_SECRET_SIZE)?;
            let mut master_secret = Zeroizing::new([0u8; MASTER_SECRET_SIZE]);
            master_secret.copy_from_slice(&bytes);
            AgreementResult::Factory(SecurityFactory::agreed(params.spec, AGREED_FACTORY_LABEL, master_secret))
        },
        ResultType::KeySet => {
            AgreementResult::KeySet(KeySet::from_secret(params.spec, secret, iv, &mut stream)?)
        },
        ResultType::SymCipherPair => {
            let bytes = material(secret, iv, &mut stream, 2 * SESSION_KEY_SIZE)?;
            let (c2s, s2c) = bytes.split_at(SESSION_KEY_SIZE);
            let client_to_server = SessionCipher::new(session_key(c2s), Direction::ClientToServer);
            let server_to_client = SessionCipher::new(session_key(s2c), Direction::ServerToClient);

            let pair = match role {
                Role::Client => SymCipherPair { outbound: client_to_server, inbound: server_to_client },
                Role::Server => SymCipherPair { outbound: server_to_client, inbound: client_to_server },
            };
            AgreementResult::SymCipherPair(pair)
        },
        ResultType::StreamCipherPair => {
            const HALF: usize = SESSION_KEY_SIZE + STREAM_NONCE_SIZE;
            let bytes = material(secret, iv, &mut stream, 2 * HALF)?;
            let (c2s, s2c) = bytes.split_at(HALF);
            let client_to_server = keystream(c2s, Direction::ClientToServer);
            let server_to_client = keystream(s2c, Direction::ServerToClient);

            let pair = match role {
                Role::Client => StreamCipherPair { outbound: client_to_server, inbound: server_to_client },
                Role::Server => StreamCipherPair { outbound: server_to_client, inbound: client_to_server },
            };
            AgreementResult::StreamCipherPair(pair)
        },
        ResultType::Bytes { length } => AgreementResult::Bytes(material(secret, iv, &mut stream, length)?),
    };

    Ok(result)
}

fn material(
    secret: &[u8],
    iv: &[u8],
    stream: &mut SeededStream,
    length: usize,
) -> Result<Zeroizing<Vec<u8>>, KeySetError> {
    Ok(kdf::derive(secret, iv, stream, length)?)
}

fn session_key(bytes: &[u8]) -> Zeroizing<[u8; SESSION_KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; SESSION_KEY_SIZE]);
    key.copy_from_slice(&bytes[..SESSION_KEY_SIZE]);
    key
}

fn keystream(bytes: &[u8], direction: Direction) -> StreamKeystream {
    let key = session_key(&bytes[..SESSION_KEY_SIZE]);
    let mut nonce = [0u8; STREAM_NONCE_SIZE];
    nonce.copy_from_slice(&bytes[SESSION_KEY_SIZE..SESSION_KEY_SIZE + STREAM_NONCE_SIZE]);
    StreamKeystream::new(&key, &nonce, direction)
}
