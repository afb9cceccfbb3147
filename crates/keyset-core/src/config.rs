//! Engine configuration.

use keyset_crypto::{KeyLength, KeySetSpec};

/// Default key length for password locks
pub const DEFAULT_LOCK_KEY_LENGTH: KeyLength = KeyLength::Bits256;

/// Default number of chained ciphers for password locks
pub const DEFAULT_LOCK_CIPHER_COUNT: usize = 3;

/// Default key length for collaborator KeySets
pub const DEFAULT_KEY_SET_KEY_LENGTH: KeyLength = KeyLength::Bits256;

/// Default number of chained ciphers for collaborator KeySets
pub const DEFAULT_KEY_SET_CIPHER_COUNT: usize = 2;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Spec of the KeySet derived from a password when locking
    pub default_lock_spec: KeySetSpec,
    /// Spec of KeySets created for collaborators
    pub default_key_set_spec: KeySetSpec,
    /// Deployment-wide personalisation phrase (default phrase when `None`)
    pub personalisation_phrase: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_lock_spec: default_spec(DEFAULT_LOCK_KEY_LENGTH, DEFAULT_LOCK_CIPHER_COUNT),
            default_key_set_spec: default_spec(DEFAULT_KEY_SET_KEY_LENGTH, DEFAULT_KEY_SET_CIPHER_COUNT),
            personalisation_phrase: None,
        }
    }
}

fn default_spec(key_length: KeyLength, cipher_count: usize) -> KeySetSpec {
    let Ok(spec) = KeySetSpec::new(key_length, cipher_count) else {
        unreachable!("default specs are within the supported range");
    };
    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_lock_spec.key_length(), KeyLength::Bits256);
        assert_eq!(config.default_lock_spec.cipher_count(), 3);
        assert_eq!(config.default_key_set_spec.cipher_count(), 2);
        assert!(config.personalisation_phrase.is_none());
    }
}
