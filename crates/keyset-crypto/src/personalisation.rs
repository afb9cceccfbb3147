//! Deployment-wide personalisation material.
//!
//! Every KDF section absorbs this material before anything else, so two
//! deployments with different seed phrases never derive the same keys from
//! the same password and recipe.
//!
//! # Invariants
//!
//! - The process-wide instance is installed at most once
//! - Material never changes after installation

use std::sync::OnceLock;

use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::PersonalisationError;

/// Seed phrase used when the process never installs its own.
pub const DEFAULT_SEED_PHRASE: &str = "keyset-engine default personalisation";

/// HKDF salt separating personalisation from any other use of the phrase
const PERSONALISATION_SALT: &[u8] = b"keysetPersonalisationV1";

/// Size of the derived material in bytes
pub const MATERIAL_SIZE: usize = 64;

static GLOBAL: OnceLock<Personalisation> = OnceLock::new();

/// Derived personalisation material.
pub struct Personalisation {
    material: Zeroizing<[u8; MATERIAL_SIZE]>,
}

impl Personalisation {
    /// Derive material from a seed phrase.
    pub fn from_phrase(phrase: &str) -> Self {
        let hkdf = Hkdf::<Sha256>::new(Some(PERSONALISATION_SALT), phrase.as_bytes());

        let mut material = Zeroizing::new([0u8; MATERIAL_SIZE]);
        let Ok(()) = hkdf.expand(b"material", &mut material[..]) else {
            unreachable!("64 bytes is a valid HKDF-SHA256 output length");
        };

        Self { material }
    }

    /// Install the process-wide personalisation.
    ///
    /// Installing the same phrase twice is a no-op. Once anything has been
    /// installed (including the default, lazily, by [`Self::global`]) a
    /// different phrase is rejected.
    pub fn initialize(phrase: &str) -> Result<&'static Self, PersonalisationError> {
        let candidate = Self::from_phrase(phrase);
        let installed = GLOBAL.get_or_init(|| Self::from_phrase(phrase));

        if bool::from(installed.material().ct_eq(candidate.material())) {
            tracing::debug!("personalisation installed");
            Ok(installed)
        } else {
            Err(PersonalisationError::AlreadyInitialized)
        }
    }

    /// Whether the process-wide personalisation has been installed, either
    /// explicitly or lazily by the first derivation.
    pub fn is_installed() -> bool {
        GLOBAL.get().is_some()
    }

    /// The process-wide personalisation, installing the default phrase if
    /// none was set.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| Self::from_phrase(DEFAULT_SEED_PHRASE))
    }

    /// Material mixed into every MAC computation.
    pub fn material(&self) -> &[u8] {
        &self.material[..]
    }
}

impl std::fmt::Debug for Personalisation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Personalisation").finish_non_exhaustive()
    }
}
