//! # Data Model
//!
//! Generations, scopes and the records persisted for them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::allocator::Allocator;
use crate::config::ListConfig;
use crate::error::{Error, Result};

/// Status recorded for a valid credential.
pub const VALID: u8 = 0;

/// Status recorded for a revoked credential.
pub const REVOKED: u8 = 1;

/// Identifier list content: decimal index to status code.
pub type IdentifierList = BTreeMap<String, u8>;

/// A (country, doctype) pair owning at most one active generation.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub struct Scope {
    country: String,
    doctype: String,
}

impl Scope {
    /// Create a scope. Both parts are used as path segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidScope`] if either part is empty, `.` or `..`,
    /// or contains a path separator.
    pub fn new(country: impl Into<String>, doctype: impl Into<String>) -> Result<Self> {
        let country = country.into();
        let doctype = doctype.into();
        check_segment("country", &country)?;
        check_segment("doctype", &doctype)?;
        Ok(Self { country, doctype })
    }

    /// Issuing country.
    #[must_use]
    pub fn country(&self) -> &str {
        &self.country
    }

    /// Credential type.
    #[must_use]
    pub fn doctype(&self) -> &str {
        &self.doctype
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.country, self.doctype)
    }
}

fn check_segment(name: &str, value: &str) -> Result<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(Error::InvalidScope(format!("{name} {value:?} is not a valid path segment")));
    }
    Ok(())
}

/// The two published list kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// Bit-indexed token status list.
    TokenStatusList,

    /// String-keyed identifier list.
    IdentifierList,
}

impl ListKind {
    /// Both kinds, in publication order.
    pub const ALL: [Self; 2] = [Self::TokenStatusList, Self::IdentifierList];

    /// Directory (and URI path segment) the kind is published under.
    #[must_use]
    pub const fn dir(self) -> &'static str {
        match self {
            Self::TokenStatusList => "token_status_list",
            Self::IdentifierList => "identifier_list",
        }
    }

    /// File name of the JWT artifact.
    #[must_use]
    pub const fn jwt_file(self) -> &'static str {
        match self {
            Self::TokenStatusList => "token_status_list.jwt",
            Self::IdentifierList => "identifier_list.jwt",
        }
    }

    /// File name of the CWT artifact.
    #[must_use]
    pub const fn cwt_file(self) -> &'static str {
        match self {
            Self::TokenStatusList => "token_status_list.cwt",
            Self::IdentifierList => "identifier_list.cwt",
        }
    }

    /// Parse a directory name.
    #[must_use]
    pub fn from_dir(dir: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.dir() == dir)
    }
}

/// One version of a scope's status and identifier lists.
#[derive(Clone, Debug)]
pub struct Generation<A> {
    /// Allocation engine holding the status bits.
    pub status_list: A,

    /// Status of every issued index.
    pub identifier_list: IdentifierList,

    /// Latest expiry date of any credential issued from this generation.
    pub expires: Option<NaiveDate>,

    /// Random identifier, used as the generation's directory name.
    pub generation_id: String,

    /// Published token status list URI. Set once the generation is saved.
    pub status_list_uri: Option<String>,

    /// Published identifier list URI. Set once the generation is saved.
    pub identifier_list_uri: Option<String>,

    // revoked since the artifacts were last signed
    pub(crate) dirty: bool,
}

impl<A: Allocator> Generation<A> {
    /// Create an empty generation with a fresh random identifier.
    #[must_use]
    pub fn new(config: &ListConfig) -> Self {
        Self {
            status_list: A::new(config),
            identifier_list: IdentifierList::new(),
            expires: None,
            generation_id: uuid::Uuid::new_v4().to_string(),
            status_list_uri: None,
            identifier_list_uri: None,
            dirty: false,
        }
    }

    /// Extend `expires` to `date` if it is later.
    pub fn extend_expiry(&mut self, date: NaiveDate) {
        self.expires = Some(self.expires.map_or(date, |current| current.max(date)));
    }

    /// Whether revocations have been made since the artifacts were signed.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The persisted form of this generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine state cannot be dumped.
    pub fn snapshot(&self, scope: &Scope) -> Result<Snapshot> {
        Ok(Snapshot {
            status_list: self.status_list.dump()?,
            identifier_list: self.identifier_list.clone(),
            expires: self.expires,
            generation_id: self.generation_id.clone(),
            country: scope.country().to_string(),
            doctype: scope.doctype().to_string(),
            status_list_uri: self.status_list_uri.clone(),
            identifier_list_uri: self.identifier_list_uri.clone(),
        })
    }

    /// Rehydrate a generation from its snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot's scope is invalid or its engine
    /// state cannot be loaded.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<(Scope, Self)> {
        let scope = Scope::new(snapshot.country, snapshot.doctype)?;
        let generation = Self {
            status_list: A::load(&snapshot.status_list)?,
            identifier_list: snapshot.identifier_list,
            expires: snapshot.expires,
            generation_id: snapshot.generation_id,
            status_list_uri: snapshot.status_list_uri,
            identifier_list_uri: snapshot.identifier_list_uri,
            dirty: false,
        };
        Ok((scope, generation))
    }
}

/// The `full_list.json` record written for every generation.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Engine dump.
    #[serde(alias = "token_status_list")]
    pub status_list: Value,

    /// Identifier list.
    #[serde(default, alias = "identifier_list")]
    pub identifier_list: IdentifierList,

    /// Latest expiry, `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<NaiveDate>,

    /// Generation identifier.
    #[serde(alias = "rand")]
    pub generation_id: String,

    /// Issuing country.
    pub country: String,

    /// Credential type.
    pub doctype: String,

    /// Published token status list URI.
    #[serde(default, alias = "status_list_uri", skip_serializing_if = "Option::is_none")]
    pub status_list_uri: Option<String>,

    /// Published identifier list URI.
    #[serde(default, alias = "identifier_list_uri", skip_serializing_if = "Option::is_none")]
    pub identifier_list_uri: Option<String>,
}

impl Snapshot {
    /// Published URI for the given list kind.
    #[must_use]
    pub fn uri(&self, kind: ListKind) -> Option<&str> {
        match kind {
            ListKind::TokenStatusList => self.status_list_uri.as_deref(),
            ListKind::IdentifierList => self.identifier_list_uri.as_deref(),
        }
    }
}

/// Where to find the status of a newly issued credential.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct StatusListInfo {
    /// Token status list reference.
    pub status_list: StatusListRef,

    /// Identifier list reference.
    pub identifier_list: IdentifierListRef,
}

/// A token status list entry.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct StatusListRef {
    /// List URI.
    pub uri: String,

    /// Index into the list.
    pub idx: usize,
}

/// An identifier list entry.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct IdentifierListRef {
    /// List URI.
    pub uri: String,

    /// Identifier within the list.
    pub id: String,
}
