//! Generated per-country P-256 keys with self-signed certificates.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use p256::ecdsa::SigningKey;
use parking_lot::Mutex;
use pkcs8::pkcs5::pbes2;
use pkcs8::{DecodePrivateKey, LineEnding, PrivateKeyInfo};
use rcgen::{generate_simple_self_signed, CertifiedKey};
use statuslist_infosec::{CountryKeys, KeyError, KeyStore, Keyring};

/// A [`KeyStore`] that generates a key and certificate the first time each
/// country is looked up. Clones share keys.
#[derive(Clone, Debug, Default)]
pub struct TestKeyStore {
    allowed: Option<Vec<String>>,
    keys: Arc<Mutex<HashMap<String, Keyring>>>,
}

impl TestKeyStore {
    /// Serve keys for any country.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve keys for the listed countries only.
    #[must_use]
    pub fn countries(countries: &[&str]) -> Self {
        Self {
            allowed: Some(countries.iter().map(ToString::to_string).collect()),
            keys: Arc::default(),
        }
    }
}

impl KeyStore for TestKeyStore {
    fn lookup(&self, country: &str) -> Result<Keyring, KeyError> {
        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|c| c == country) {
                return Err(KeyError::NotFound(country.to_string()));
            }
        }

        let mut keys = self.keys.lock();
        if let Some(keyring) = keys.get(country) {
            return Ok(keyring.clone());
        }

        let CertifiedKey { cert, key_pair } = generate(country);
        let signing_key = SigningKey::from_pkcs8_der(&key_pair.serialize_der())
            .map_err(|e| KeyError::InvalidKey {
                country: country.to_string(),
                reason: e.to_string(),
            })?;
        let keyring = Keyring::new(country, signing_key, cert.der().to_vec())?;
        keys.insert(country.to_string(), keyring.clone());
        Ok(keyring)
    }
}

/// Write a generated PEM key and DER certificate for `country` into `dir`.
///
/// # Panics
///
/// Panics if the files cannot be written.
#[must_use]
pub fn write_country_keys(dir: &Path, country: &str) -> CountryKeys {
    let CertifiedKey { cert, key_pair } = generate(country);

    let private_key = dir.join(format!("{country}.pem"));
    fs::write(&private_key, key_pair.serialize_pem()).expect("should write key");
    let certificate = dir.join(format!("{country}.der"));
    fs::write(&certificate, cert.der()).expect("should write certificate");

    CountryKeys {
        private_key,
        certificate,
        password: None,
    }
}

/// Write a generated key, encrypted as PKCS#8 under `password`, and its DER
/// certificate for `country` into `dir`. The returned locations carry the
/// password.
///
/// # Panics
///
/// Panics if the key cannot be encrypted or the files cannot be written.
#[must_use]
pub fn write_encrypted_country_keys(dir: &Path, country: &str, password: &str) -> CountryKeys {
    let CertifiedKey { cert, key_pair } = generate(country);

    let der = key_pair.serialize_der();
    let info = PrivateKeyInfo::try_from(der.as_slice()).expect("should parse key");
    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(2048, b"status-list-salt", &[7; 16])
        .expect("should create parameters");
    let encrypted = info.encrypt_with_params(params, password).expect("should encrypt key");
    let pem = encrypted.to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF).expect("should encode");

    let private_key = dir.join(format!("{country}.enc.pem"));
    fs::write(&private_key, pem.as_bytes()).expect("should write key");
    let certificate = dir.join(format!("{country}.der"));
    fs::write(&certificate, cert.der()).expect("should write certificate");

    CountryKeys {
        private_key,
        certificate,
        password: Some(password.to_string()),
    }
}

fn generate(country: &str) -> CertifiedKey {
    let name = format!("{}.status.example.com", country.to_lowercase());
    generate_simple_self_signed(vec![name]).expect("should generate certificate")
}
