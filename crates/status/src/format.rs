//! # Signing Formatter
//!
//! Builds the signed JWT and CWT artifacts published for each list kind.

use ciborium::Value;
use serde::{Deserialize, Serialize};
use statuslist_infosec::jose::jws;
use statuslist_infosec::{cose, Signer};

use crate::model::IdentifierList;

/// JWT `typ` of a token status list.
pub const STATUS_LIST_JWT: &str = "statuslist+jwt";

/// COSE `typ` of a token status list.
pub const STATUS_LIST_CWT: &str = "application/statuslist+cwt";

/// JWT `typ` of an identifier list.
pub const IDENTIFIER_LIST_JWT: &str = "application/identifierlist+jwt";

/// COSE `typ` of an identifier list.
pub const IDENTIFIER_LIST_CWT: &str = "application/identifierlist+cwt";

/// CWT claim keys.
pub mod claim {
    /// Issuer.
    pub const ISS: i64 = 1;
    /// Subject (the list URI).
    pub const SUB: i64 = 2;
    /// Issued at.
    pub const IAT: i64 = 6;
    /// List payload.
    pub const LIST: i64 = 65533;
    /// Time to live, in seconds.
    pub const TTL: i64 = 65534;
}

/// Claims of a token status list JWT.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct StatusListClaims {
    /// Issuer.
    pub iss: String,

    /// List URI.
    pub sub: String,

    /// Issued at, seconds since the epoch.
    pub iat: i64,

    /// The encoded list.
    pub status_list: EncodedList,
}

/// A compressed status list.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct EncodedList {
    /// Bits per status.
    pub bits: u8,

    /// Base64url (unpadded) ZLIB-compressed bitstring.
    pub lst: String,
}

/// Claims of an identifier list JWT.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct IdentifierListClaims {
    /// Issuer.
    pub iss: String,

    /// List URI.
    pub sub: String,

    /// Issued at, seconds since the epoch.
    pub iat: i64,

    /// Index to status mapping.
    pub identifier_list: IdentifierList,
}

/// Produces signed list artifacts.
#[derive(Clone, Debug)]
pub struct Formatter {
    issuer: String,
    ttl: u64,
}

impl Formatter {
    /// Create a formatter issuing as `issuer`. `ttl` is published in status
    /// list CWTs.
    #[must_use]
    pub fn new(issuer: impl Into<String>, ttl: u64) -> Self {
        Self {
            issuer: issuer.into(),
            ttl,
        }
    }

    /// Token status list as a compact JWS.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn status_list_jwt(
        &self, compressed: &[u8], uri: &str, iat: i64, signer: &impl Signer,
    ) -> anyhow::Result<String> {
        use base64ct::{Base64UrlUnpadded, Encoding};

        let claims = StatusListClaims {
            iss: self.issuer.clone(),
            sub: uri.to_string(),
            iat,
            status_list: EncodedList {
                bits: 1,
                lst: Base64UrlUnpadded::encode_string(compressed),
            },
        };
        jws::encode(STATUS_LIST_JWT, &claims, signer)
    }

    /// Token status list as a tagged `COSE_Sign1`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or signing fails.
    pub fn status_list_cwt(
        &self, compressed: &[u8], uri: &str, iat: i64, signer: &impl Signer,
    ) -> anyhow::Result<Vec<u8>> {
        let list = Value::Map(vec![
            (Value::Text("bits".into()), Value::Integer(1.into())),
            (Value::Text("lst".into()), Value::Bytes(compressed.to_vec())),
        ]);
        let mut claims = self.cwt_claims(uri, iat);
        claims.push((Value::Integer(claim::TTL.into()), Value::Integer(self.ttl.into())));
        claims.push((Value::Integer(claim::LIST.into()), list));

        cose::sign(STATUS_LIST_CWT, &Value::Map(claims), signer)
    }

    /// Identifier list as a compact JWS.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn identifier_list_jwt(
        &self, list: &IdentifierList, uri: &str, iat: i64, signer: &impl Signer,
    ) -> anyhow::Result<String> {
        let claims = IdentifierListClaims {
            iss: self.issuer.clone(),
            sub: uri.to_string(),
            iat,
            identifier_list: list.clone(),
        };
        jws::encode(IDENTIFIER_LIST_JWT, &claims, signer)
    }

    /// Identifier list as a tagged `COSE_Sign1`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or signing fails.
    pub fn identifier_list_cwt(
        &self, list: &IdentifierList, uri: &str, iat: i64, signer: &impl Signer,
    ) -> anyhow::Result<Vec<u8>> {
        let entries = list
            .iter()
            .map(|(id, status)| (Value::Text(id.clone()), Value::Integer((*status).into())))
            .collect();
        let mut claims = self.cwt_claims(uri, iat);
        claims.push((Value::Integer(claim::LIST.into()), Value::Map(entries)));

        cose::sign(IDENTIFIER_LIST_CWT, &Value::Map(claims), signer)
    }

    fn cwt_claims(&self, uri: &str, iat: i64) -> Vec<(Value, Value)> {
        vec![
            (Value::Integer(claim::ISS.into()), Value::Text(self.issuer.clone())),
            (Value::Integer(claim::SUB.into()), Value::Text(uri.to_string())),
            (Value::Integer(claim::IAT.into()), Value::Integer(iat.into())),
        ]
    }
}
