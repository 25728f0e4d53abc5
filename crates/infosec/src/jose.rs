//! # JSON Object Signing and Encryption (JOSE)
//!
//! Compact JWS support for publishing signed lists as JWTs.

pub mod jws;
