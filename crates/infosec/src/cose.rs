//! # COSE
//!
//! This module provides CBOR helpers and the `COSE_Sign1` structure used to
//! publish signed lists as CWTs.

pub mod cbor;
pub mod sign1;

pub use sign1::{sign, verify_sign1, Sign1};
