//! # Errors
//!
//! Errors raised while issuing, revoking and publishing status lists.

use std::path::PathBuf;

use statuslist_infosec::KeyError;
use thiserror::Error;

use crate::model::Scope;

/// Result type for status list operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Status list errors.
#[derive(Error, Debug)]
pub enum Error {
    /// A country or doctype cannot be used as a path segment.
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// A revocation named a generation that is not the scope's current one.
    #[error("generation {generation_id} is not current for {scope}")]
    StaleGeneration {
        /// Scope of the revocation.
        scope: Scope,
        /// Generation named by the caller.
        generation_id: String,
    },

    /// The index was never issued by the current generation.
    #[error("index {0} has not been issued")]
    UnknownIndex(usize),

    /// The configured list capacity cannot hold a single index.
    #[error("status list capacity is zero")]
    NoCapacity,

    /// Signing material for the scope's country is unavailable.
    #[error(transparent)]
    KeyStore(#[from] KeyError),

    /// A URI does not name a generation directory.
    #[error("invalid status list uri: {0}")]
    InvalidUri(String),

    /// A filesystem operation failed.
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A snapshot file could not be parsed.
    #[error("malformed snapshot {}: {source}", path.display())]
    Snapshot {
        /// Snapshot path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Allocation engine or artifact encoding failure.
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
