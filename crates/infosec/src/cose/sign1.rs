//! # COSE Sign1
//!
//! Single-signer COSE structures wrapped in CBOR tag 18.
//!
//! The protected header carries the algorithm, the media type of the
//! artifact and the DER signing certificate. The signature is a raw
//! (`r||s`) ECDSA signature over the encoded protected header followed by
//! the encoded payload.

use anyhow::anyhow;
use ciborium::Value;
use coset::{
    iana, CborSerializable, CoseSign1, CoseSign1Builder, HeaderBuilder, Label,
    RegisteredLabelWithPrivate, TaggedCborSerializable,
};
use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature, VerifyingKey};

use crate::cose::cbor;
use crate::Signer;

/// Header label for the media type of the complete artifact.
pub const TYP: i64 = 16;

/// Header label for the certificate chain.
pub const X5CHAIN: i64 = 33;

/// Key identifier published in the unprotected header.
pub const KEY_ID: &[u8] = b"1";

/// A decoded and verified `COSE_Sign1` structure.
#[derive(Clone, Debug, PartialEq)]
pub struct Sign1 {
    /// The parsed structure, including the original protected header bytes.
    pub cose: CoseSign1,

    /// Decoded payload.
    pub payload: Value,
}

impl Sign1 {
    /// Look up a non-core header by integer label, protected first.
    #[must_use]
    pub fn header(&self, label: i64) -> Option<&Value> {
        rest_get(&self.cose.protected.header.rest, label)
            .or_else(|| rest_get(&self.cose.unprotected.rest, label))
    }

    /// The media type from the protected header.
    #[must_use]
    pub fn typ(&self) -> Option<&str> {
        rest_get(&self.cose.protected.header.rest, TYP).and_then(Value::as_text)
    }

    /// The DER signing certificate from the protected header.
    #[must_use]
    pub fn certificate(&self) -> Option<&[u8]> {
        rest_get(&self.cose.protected.header.rest, X5CHAIN)
            .and_then(Value::as_bytes)
            .map(Vec::as_slice)
    }

    /// Whether the protected header names `alg`.
    #[must_use]
    pub fn is_algorithm(&self, alg: iana::Algorithm) -> bool {
        self.cose.protected.header.alg == Some(RegisteredLabelWithPrivate::Assigned(alg))
    }
}

/// Sign `payload` and return the CBOR encoding of the tagged `COSE_Sign1`.
///
/// # Errors
///
/// Returns an error if the payload cannot be encoded or signing fails.
pub fn sign(typ: &str, payload: &Value, signer: &impl Signer) -> anyhow::Result<Vec<u8>> {
    tracing::debug!(typ, "sign1");

    let protected = HeaderBuilder::new()
        .algorithm(signer.algorithm().cose())
        .value(TYP, Value::Text(typ.to_string()))
        .value(X5CHAIN, Value::Bytes(signer.certificate().to_vec()))
        .build();
    let unprotected = HeaderBuilder::new().key_id(KEY_ID.to_vec()).build();

    let protected_bytes =
        protected.clone().to_vec().map_err(|e| anyhow!("issue encoding header: {e}"))?;
    let payload = cbor::to_vec(payload)?;
    let signature = signer.try_sign(&[protected_bytes.as_slice(), payload.as_slice()].concat())?;

    CoseSign1Builder::new()
        .protected(protected)
        .unprotected(unprotected)
        .payload(payload)
        .signature(signature)
        .build()
        .to_tagged_vec()
        .map_err(|e| anyhow!("issue encoding COSE_Sign1: {e}"))
}

/// Decode a tagged `COSE_Sign1` and check its signature against
/// `verifying_key`.
///
/// # Errors
///
/// Returns an error if the bytes are not a tagged `COSE_Sign1` with an
/// attached payload, or the signature does not verify.
pub fn verify_sign1(bytes: &[u8], verifying_key: &VerifyingKey) -> anyhow::Result<Sign1> {
    let cose = CoseSign1::from_tagged_slice(bytes)
        .map_err(|e| anyhow!("not a tagged COSE_Sign1: {e}"))?;

    let protected = cose.protected.original_data.as_deref().unwrap_or_default();
    let Some(payload) = cose.payload.as_deref() else {
        return Err(anyhow!("COSE_Sign1 has no attached payload"));
    };

    let sig =
        Signature::from_slice(&cose.signature).map_err(|e| anyhow!("invalid signature: {e}"))?;
    verifying_key
        .verify(&[protected, payload].concat(), &sig)
        .map_err(|e| anyhow!("unable to verify signature: {e}"))?;

    let payload = cbor::from_slice(payload)?;
    Ok(Sign1 { cose, payload })
}

fn rest_get(rest: &[(Label, Value)], label: i64) -> Option<&Value> {
    rest.iter().find_map(|(l, v)| (*l == Label::Int(label)).then_some(v))
}
