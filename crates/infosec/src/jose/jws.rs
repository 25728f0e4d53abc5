//! # JSON Web Signature (JWS)
//!
//! JWS ([RFC7515]) represents content secured with digital signatures using JSON-based data
//! structures. Cryptographic algorithms and identifiers for use with this
//! specification are described in the JWA ([RFC7518]) specification.
//!
//! Only the compact serialization is supported. The signing certificate is
//! always carried in the `x5c` header.
//!
//! [RFC7515]: https://www.rfc-editor.org/rfc/rfc7515
//! [RFC7518]: https://www.rfc-editor.org/rfc/rfc7518

use anyhow::{anyhow, bail};
use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Algorithm, Signer};

/// Represents a decoded JWT.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Jwt<T> {
    /// The JWT header.
    pub header: Header,

    /// The JWT claims.
    pub claims: T,
}

/// Represents the JWT header.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Header {
    /// Digital signature algorithm identifier as per IANA "JSON Web Signature
    /// and Encryption Algorithms" registry.
    pub alg: Algorithm,

    /// Media type of the JWS, e.g. `statuslist+jwt`.
    pub typ: String,

    /// Certificate chain for the signing key. Each entry is a standard
    /// base64 (not base64url) DER certificate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub x5c: Vec<String>,
}

/// Encode the provided claims and sign, returning a JWT in compact JWS form.
///
/// # Errors
///
/// Returns an error if the claims cannot be serialized or signing fails.
pub fn encode<T>(typ: &str, claims: &T, signer: &impl Signer) -> anyhow::Result<String>
where
    T: Serialize,
{
    tracing::debug!(typ, "encode");

    let header = Header {
        alg: signer.algorithm(),
        typ: typ.to_string(),
        x5c: vec![Base64::encode_string(signer.certificate())],
    };

    let header = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&header)?);
    let claims = Base64UrlUnpadded::encode_string(&serde_json::to_vec(claims)?);
    let payload = format!("{header}.{claims}");

    let sig = signer.try_sign(payload.as_bytes())?;
    let sig_enc = Base64UrlUnpadded::encode_string(&sig);

    Ok(format!("{payload}.{sig_enc}"))
}

/// Decode the JWT token, verify its signature with `verifying_key`, and
/// return the header and claims.
///
/// # Errors
///
/// Returns an error if the token is malformed, uses an unsupported
/// algorithm, or the signature does not verify.
pub fn decode<T>(token: &str, verifying_key: &VerifyingKey) -> anyhow::Result<Jwt<T>>
where
    T: DeserializeOwned,
{
    let parts = token.split('.').collect::<Vec<&str>>();
    if parts.len() != 3 {
        bail!("invalid Compact JWS format");
    }

    let decoded = Base64UrlUnpadded::decode_vec(parts[0])
        .map_err(|e| anyhow!("issue decoding header: {e}"))?;
    let header: Header =
        serde_json::from_slice(&decoded).map_err(|e| anyhow!("issue deserializing header: {e}"))?;
    let decoded = Base64UrlUnpadded::decode_vec(parts[1])
        .map_err(|e| anyhow!("issue decoding claims: {e}"))?;
    let claims =
        serde_json::from_slice(&decoded).map_err(|e| anyhow!("issue deserializing claims: {e}"))?;
    let sig = Base64UrlUnpadded::decode_vec(parts[2])
        .map_err(|e| anyhow!("issue decoding signature: {e}"))?;

    if header.alg != Algorithm::ES256 {
        bail!("'alg' is not recognised");
    }

    let signature = Signature::from_slice(&sig).map_err(|e| anyhow!("invalid signature: {e}"))?;
    verifying_key
        .verify(format!("{}.{}", parts[0], parts[1]).as_bytes(), &signature)
        .map_err(|e| anyhow!("unable to verify signature: {e}"))?;

    Ok(Jwt { header, claims })
}
