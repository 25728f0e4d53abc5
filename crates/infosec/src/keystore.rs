//! # Key Store
//!
//! Per-country signing keys. Each issuing country publishes its lists under
//! its own P-256 key, certified by a DER-encoded X.509 certificate that is
//! embedded in every artifact.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use p256::ecdsa::signature::Signer as _;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::SecretKey;
use pkcs8::DecodePrivateKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x509_cert::der::{Decode, DecodePem, Encode};
use x509_cert::Certificate;

use crate::{Algorithm, Signer};

/// Errors raised when resolving a country's signing material.
#[derive(Error, Debug)]
pub enum KeyError {
    /// No key material is configured for the country.
    #[error("no signing key configured for country {0}")]
    NotFound(String),

    /// A key or certificate file could not be read.
    #[error("unable to read {}: {source}", path.display())]
    Read {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The private key could not be decoded (including a wrong password).
    #[error("invalid private key for country {country}: {reason}")]
    InvalidKey {
        /// Country the key belongs to.
        country: String,
        /// Decoder error.
        reason: String,
    },

    /// The certificate could not be decoded or does not certify the key.
    #[error("invalid certificate for country {country}: {reason}")]
    InvalidCertificate {
        /// Country the certificate belongs to.
        country: String,
        /// Decoder error.
        reason: String,
    },
}

/// `KeyStore` is a read-only provider of signing material, keyed by issuing
/// country.
pub trait KeyStore: Send + Sync {
    /// Returns the signing key and certificate for `country`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotFound`] for unknown countries, or a load error
    /// when the configured material cannot be read or decoded.
    fn lookup(&self, country: &str) -> Result<Keyring, KeyError>;
}

/// A country's signing key and the DER certificate for it.
#[derive(Clone, Debug)]
pub struct Keyring {
    signing_key: SigningKey,
    certificate: Vec<u8>,
}

impl Keyring {
    /// Create a keyring, checking that `certificate` is a DER-encoded X.509
    /// certificate for `signing_key`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidCertificate`] if the certificate does not
    /// decode or certifies a different key.
    pub fn new(
        country: &str, signing_key: SigningKey, certificate: Vec<u8>,
    ) -> Result<Self, KeyError> {
        let invalid = |reason: String| KeyError::InvalidCertificate {
            country: country.to_string(),
            reason,
        };

        let certified = certificate_key(&certificate).map_err(|e| invalid(e.to_string()))?;
        if certified.to_encoded_point(false) != signing_key.verifying_key().to_encoded_point(false)
        {
            return Err(invalid("certificate does not match the signing key".into()));
        }

        Ok(Self {
            signing_key,
            certificate,
        })
    }

    /// The public half of the signing key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key().clone()
    }
}

impl Signer for Keyring {
    fn try_sign(&self, msg: &[u8]) -> anyhow::Result<Vec<u8>> {
        let signature: Signature = self.signing_key.try_sign(msg)?;
        Ok(signature.to_bytes().to_vec())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::ES256
    }

    fn certificate(&self) -> &[u8] {
        &self.certificate
    }
}

/// Extract the P-256 public key certified by a DER-encoded certificate.
///
/// # Errors
///
/// Returns an error if the certificate does not decode or does not hold a
/// P-256 public key.
pub fn certificate_key(der: &[u8]) -> anyhow::Result<VerifyingKey> {
    let cert = Certificate::from_der(der).map_err(|e| anyhow!("issue decoding certificate: {e}"))?;
    let spki = &cert.tbs_certificate.subject_public_key_info;
    VerifyingKey::from_sec1_bytes(spki.subject_public_key.raw_bytes())
        .map_err(|e| anyhow!("certificate key is not a P-256 key: {e}"))
}

/// Location of a country's key material on disk.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CountryKeys {
    /// PEM-encoded private key (PKCS#8, encrypted PKCS#8 or SEC1).
    pub private_key: PathBuf,

    /// X.509 certificate for the key, DER or PEM encoded.
    pub certificate: PathBuf,

    /// Password for an encrypted PKCS#8 private key.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

/// A [`KeyStore`] reading key material from files.
///
/// Files are read on every lookup so that a replaced key or certificate is
/// picked up without a restart.
#[derive(Clone, Debug, Default)]
pub struct FileKeyStore {
    countries: HashMap<String, CountryKeys>,
}

impl FileKeyStore {
    /// Create a key store from per-country file locations.
    #[must_use]
    pub const fn new(countries: HashMap<String, CountryKeys>) -> Self {
        Self { countries }
    }
}

impl KeyStore for FileKeyStore {
    fn lookup(&self, country: &str) -> Result<Keyring, KeyError> {
        let Some(keys) = self.countries.get(country) else {
            return Err(KeyError::NotFound(country.to_string()));
        };

        let pem = fs::read_to_string(&keys.private_key).map_err(|source| KeyError::Read {
            path: keys.private_key.clone(),
            source,
        })?;
        let signing_key = decode_private_key(country, &pem, keys.password.as_deref())?;
        let certificate = read_certificate(country, &keys.certificate)?;

        tracing::debug!(country, "loaded signing key");
        Keyring::new(country, signing_key, certificate)
    }
}

fn decode_private_key(
    country: &str, pem: &str, password: Option<&str>,
) -> Result<SigningKey, KeyError> {
    let secret = match password {
        Some(password) => {
            SecretKey::from_pkcs8_encrypted_pem(pem, password).map_err(|e| e.to_string())
        }
        None if pem.contains("BEGIN EC PRIVATE KEY") => {
            SecretKey::from_sec1_pem(pem).map_err(|e| e.to_string())
        }
        None => SecretKey::from_pkcs8_pem(pem).map_err(|e| e.to_string()),
    };

    secret.map(SigningKey::from).map_err(|reason| KeyError::InvalidKey {
        country: country.to_string(),
        reason,
    })
}

// Returns the certificate re-encoded as DER.
fn read_certificate(country: &str, path: &Path) -> Result<Vec<u8>, KeyError> {
    let bytes = fs::read(path).map_err(|source| KeyError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let decoded = if bytes.starts_with(b"-----BEGIN") {
        Certificate::from_pem(&bytes)
    } else {
        Certificate::from_der(&bytes)
    };

    decoded.and_then(|cert| cert.to_der()).map_err(|e| KeyError::InvalidCertificate {
        country: country.to_string(),
        reason: e.to_string(),
    })
}
