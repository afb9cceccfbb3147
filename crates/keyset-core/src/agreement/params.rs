//! Agreement parameters.

use bytes::BufMut;
use keyset_crypto::KeySetSpec;

/// Kind of result an agreement produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultType {
    /// A security factory with an agreed master secret
    Factory,
    /// A KeySet of the agreed spec
    KeySet,
    /// A pair of authenticated session ciphers
    SymCipherPair,
    /// A pair of raw keystream ciphers
    StreamCipherPair,
    /// Raw shared bytes
    Bytes {
        /// Number of bytes to derive
        length: usize,
    },
}

impl ResultType {
    /// Label binding derived material to the result kind.
    pub(crate) fn label(self) -> &'static [u8] {
        match self {
            Self::Factory => b"keysetAgreementFactory",
            Self::KeySet => b"keysetAgreementKeySet",
            Self::SymCipherPair => b"keysetAgreementSymCipherPair",
            Self::StreamCipherPair => b"keysetAgreementStreamCipherPair",
            Self::Bytes { .. } => b"keysetAgreementBytes",
        }
    }
}

/// What the two parties are agreeing on.
///
/// Both parties must use equal parameters. Every field is bound into the
/// shared secret, so a mismatch yields unrelated results rather than a
/// silently shared one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementParams {
    /// Spec for KeySet and factory results
    pub spec: KeySetSpec,
    /// Requested result kind
    pub result_type: ResultType,
    /// Client certificate bytes, opaque to the engine
    pub client_certificate: Option<Vec<u8>>,
    /// Server certificate bytes, opaque to the engine
    pub server_certificate: Option<Vec<u8>>,
    /// Signer certificate bytes, opaque to the engine
    pub signer_certificate: Option<Vec<u8>>,
    /// Caller data bound into the result
    pub additional_data: Option<Vec<u8>>,
}

impl AgreementParams {
    /// Parameters with no certificates or additional data.
    pub fn new(spec: KeySetSpec, result_type: ResultType) -> Self {
        Self {
            spec,
            result_type,
            client_certificate: None,
            server_certificate: None,
            signer_certificate: None,
            additional_data: None,
        }
    }

    /// Set the client certificate.
    #[must_use]
    pub fn with_client_certificate(mut self, certificate: impl Into<Vec<u8>>) -> Self {
        self.client_certificate = Some(certificate.into());
        self
    }

    /// Set the server certificate.
    #[must_use]
    pub fn with_server_certificate(mut self, certificate: impl Into<Vec<u8>>) -> Self {
        self.server_certificate = Some(certificate.into());
        self
    }

    /// Set the additional data.
    #[must_use]
    pub fn with_additional_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.additional_data = Some(data.into());
        self
    }

    /// Unambiguous byte encoding of every field, used as MAC input.
    ///
    /// Layout: bits u32 ‖ count u8 ‖ result label ‖ length u64 ‖ four
    /// optional fields, each `0` or `1 ‖ len u32 ‖ bytes`. All integers are
    /// big-endian.
    pub(crate) fn binding_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u32(self.spec.key_length().bits());
        buf.put_u8(self.spec.cipher_count() as u8);

        let label = self.result_type.label();
        buf.put_u8(label.len() as u8);
        buf.put_slice(label);
        let length = match self.result_type {
            ResultType::Bytes { length } => length as u64,
            _ => 0,
        };
        buf.put_u64(length);

        for field in [
            &self.client_certificate,
            &self.server_certificate,
            &self.signer_certificate,
            &self.additional_data,
        ] {
            match field {
                Some(bytes) => {
                    buf.put_u8(1);
                    buf.put_u32(bytes.len() as u32);
                    buf.put_slice(bytes);
                },
                None => buf.put_u8(0),
            }
        }

        buf
    }
}
