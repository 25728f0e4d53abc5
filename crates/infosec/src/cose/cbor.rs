//! # CBOR
//!
//! This module provides CBOR helper functions.

use std::io::Cursor;

use anyhow::anyhow;
use coset::CoseError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize a value to a CBOR byte vector.
///
/// # Errors
///
/// Returns an error if the value cannot be represented in CBOR.
pub fn to_vec<T>(value: &T) -> anyhow::Result<Vec<u8>>
where
    T: Serialize,
{
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Deserialize a value from a CBOR byte slice.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR for `T`.
pub fn from_slice<T>(slice: &[u8]) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    ciborium::from_reader(Cursor::new(&slice)).map_err(|e| {
        anyhow!(CoseError::DecodeFailed(ciborium::de::Error::Semantic(None, e.to_string())))
    })
}
