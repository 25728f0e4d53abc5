//! # Information Security for Status Lists
//!
//! Signing keys and encodings used to publish status and identifier lists:
//!
//! - [`KeyStore`] resolves the signing key and certificate for an issuing
//!   country.
//! - [`jose`] produces (and verifies) compact JWS tokens.
//! - [`cose`] produces (and verifies) tagged `COSE_Sign1` structures.
//!
//! This crate is used by the `statuslist` crate and is not intended to be
//! used directly.

pub mod cose;
pub mod jose;
mod keystore;

use serde::{Deserialize, Serialize};

pub use crate::jose::jws::Jwt;
pub use crate::keystore::{
    certificate_key, CountryKeys, FileKeyStore, KeyError, KeyStore, Keyring,
};

#[cfg(test)]
pub(crate) mod testing {
    use p256::ecdsa::SigningKey;
    use pkcs8::DecodePrivateKey;
    use rcgen::generate_simple_self_signed;

    use crate::Keyring;

    pub fn keyring() -> Keyring {
        let certified = generate_simple_self_signed(vec!["status.example.com".to_string()])
            .expect("should generate certificate");
        let signing_key = SigningKey::from_pkcs8_der(&certified.key_pair.serialize_der())
            .expect("should decode key");
        Keyring::new("PT", signing_key, certified.cert.der().to_vec()).expect("should create")
    }
}

/// Signer is used to sign published artifacts.
pub trait Signer: Send + Sync {
    /// `TrySign` signs the message, returning the raw signature bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying key is unable to sign.
    fn try_sign(&self, msg: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Algorithm returns the algorithm used by the signer.
    fn algorithm(&self) -> Algorithm;

    /// DER-encoded certificate for the signing key. Published alongside the
    /// signature so verifiers can check it.
    fn certificate(&self) -> &[u8];
}

/// Digital signature algorithms supported for publication.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Algorithm {
    /// ECDSA using P-256 and SHA-256.
    #[default]
    ES256,
}

impl Algorithm {
    /// The COSE algorithm ([RFC9053]).
    ///
    /// [RFC9053]: https://www.rfc-editor.org/rfc/rfc9053
    #[must_use]
    pub const fn cose(self) -> coset::iana::Algorithm {
        match self {
            Self::ES256 => coset::iana::Algorithm::ES256,
        }
    }
}
