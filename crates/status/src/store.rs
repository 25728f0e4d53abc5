//! # Persistence
//!
//! Reads and writes the on-disk generation tree:
//!
//! ```text
//! <root>/token_status_list/<country>/<doctype>/<generationId>/
//!     full_list.json
//!     token_status_list.jwt
//!     token_status_list.cwt
//! <root>/identifier_list/<country>/<doctype>/<generationId>/
//!     full_list.json
//!     identifier_list.jwt
//!     identifier_list.cwt
//! ```
//!
//! Every file is written to a temporary file in its destination directory
//! and renamed into place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use percent_encoding::percent_decode_str;
use statuslist_infosec::{KeyStore, Keyring};
use tempfile::NamedTempFile;
use url::Url;

use crate::allocator::Allocator;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::format::Formatter;
use crate::model::{Generation, ListKind, Scope, Snapshot};

/// Snapshot file name.
pub const SNAPSHOT_FILE: &str = "full_list.json";

/// Persists generations and their signed artifacts.
#[derive(Clone, Debug)]
pub struct Store<K> {
    root: PathBuf,
    service_url: Url,
    formatter: Formatter,
    keys: K,
}

impl<K: KeyStore> Store<K> {
    /// Create a store publishing under `config.status_list_dir`.
    pub fn new(config: &Config, keys: K) -> Self {
        let mut service_url = config.service_url.clone();
        if !service_url.path().ends_with('/') {
            let path = format!("{}/", service_url.path());
            service_url.set_path(&path);
        }
        Self {
            root: config.status_list_dir.clone(),
            service_url,
            formatter: Formatter::new(config.issuer(), config.ttl),
            keys,
        }
    }

    /// Root of the generation tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URI of a generation's list. Segments are percent-encoded
    /// under the service URL's path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUri`] if the service URL cannot carry a path.
    pub fn uri(&self, kind: ListKind, scope: &Scope, generation_id: &str) -> Result<String> {
        let mut url = self.service_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUri(format!("{} cannot be a base url", self.service_url)))?
            .pop_if_empty()
            .extend([kind.dir(), scope.country(), scope.doctype(), generation_id]);
        Ok(url.into())
    }

    /// Directory holding a generation's files for one list kind.
    #[must_use]
    pub fn generation_dir(&self, kind: ListKind, scope: &Scope, generation_id: &str) -> PathBuf {
        self.root.join(kind.dir()).join(scope.country()).join(scope.doctype()).join(generation_id)
    }

    /// Publish a generation: record its URIs, write both snapshots and sign
    /// fresh artifacts for both list kinds.
    ///
    /// # Errors
    ///
    /// Returns an error if the country has no usable key, or a file cannot
    /// be written.
    pub fn save<A: Allocator>(&self, generation: &mut Generation<A>, scope: &Scope) -> Result<()> {
        let id = generation.generation_id.clone();
        generation.status_list_uri = Some(self.uri(ListKind::TokenStatusList, scope, &id)?);
        generation.identifier_list_uri = Some(self.uri(ListKind::IdentifierList, scope, &id)?);

        let keyring = self.keys.lookup(scope.country())?;
        self.save_snapshot(generation, scope)?;
        for kind in ListKind::ALL {
            let dir = self.generation_dir(kind, scope, &id);
            self.sign_with(kind, generation, &dir, &keyring)?;
        }
        generation.dirty = false;

        tracing::debug!(
            country = scope.country(),
            doctype = scope.doctype(),
            generation = %id,
            "saved generation"
        );
        Ok(())
    }

    /// Write the generation's snapshot into both list directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be encoded or written.
    pub fn save_snapshot<A: Allocator>(
        &self, generation: &Generation<A>, scope: &Scope,
    ) -> Result<()> {
        let snapshot = generation.snapshot(scope)?;
        let json = serde_json::to_vec(&snapshot).map_err(anyhow::Error::from)?;

        for kind in ListKind::ALL {
            let dir = self.generation_dir(kind, scope, &generation.generation_id);
            write_atomic(&dir.join(SNAPSHOT_FILE), &json)?;
        }
        Ok(())
    }

    /// Sign and write the JWT and CWT artifacts of one list kind into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the generation has no published URI, the country
    /// has no usable key, or a file cannot be written.
    pub fn sign<A: Allocator>(
        &self, kind: ListKind, scope: &Scope, generation: &Generation<A>, dir: &Path,
    ) -> Result<()> {
        let keyring = self.keys.lookup(scope.country())?;
        self.sign_with(kind, generation, dir, &keyring)
    }

    fn sign_with<A: Allocator>(
        &self, kind: ListKind, generation: &Generation<A>, dir: &Path, keyring: &Keyring,
    ) -> Result<()> {
        let iat = Utc::now().timestamp();

        let (jwt, cwt) = match kind {
            ListKind::TokenStatusList => {
                let Some(uri) = &generation.status_list_uri else {
                    return Err(Error::InvalidUri(format!("{} has no uri", dir.display())));
                };
                let compressed = generation.status_list.compressed()?;
                (
                    self.formatter.status_list_jwt(&compressed, uri, iat, keyring)?,
                    self.formatter.status_list_cwt(&compressed, uri, iat, keyring)?,
                )
            }
            ListKind::IdentifierList => {
                let Some(uri) = &generation.identifier_list_uri else {
                    return Err(Error::InvalidUri(format!("{} has no uri", dir.display())));
                };
                let list = &generation.identifier_list;
                (
                    self.formatter.identifier_list_jwt(list, uri, iat, keyring)?,
                    self.formatter.identifier_list_cwt(list, uri, iat, keyring)?,
                )
            }
        };

        write_atomic(&dir.join(kind.jwt_file()), jwt.as_bytes())?;
        write_atomic(&dir.join(kind.cwt_file()), &cwt)
    }

    /// Load the generation published at `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUri`] if the URI path does not name a
    /// generation directory under the service URL, or an error if the
    /// snapshot cannot be read.
    pub fn load<A: Allocator>(&self, uri: &str) -> Result<(Scope, Generation<A>)> {
        let (kind, scope, generation_id) = self.parse_uri(uri)?;
        let dir = self.generation_dir(kind, &scope, &generation_id);
        let snapshot = read_snapshot(&dir.join(SNAPSHOT_FILE))?;
        Generation::from_snapshot(snapshot)
    }

    // Split a list URI into its kind, scope and generation id. Only the path
    // below the service URL's path is used; scheme, authority, query and
    // fragment are ignored.
    fn parse_uri(&self, uri: &str) -> Result<(ListKind, Scope, String)> {
        let invalid = || Error::InvalidUri(uri.to_string());

        let url = Url::parse(uri).map_err(|_| invalid())?;
        let segments = decoded_segments(&url).ok_or_else(invalid)?;
        let prefix = decoded_segments(&self.service_url).unwrap_or_default();

        let Some([kind, country, doctype, id]) = segments.strip_prefix(prefix.as_slice()) else {
            return Err(invalid());
        };
        let kind = ListKind::from_dir(kind).ok_or_else(invalid)?;
        let scope = Scope::new(country.as_str(), doctype.as_str()).map_err(|_| invalid())?;
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(invalid());
        }

        Ok((kind, scope, id.clone()))
    }
}

// Non-empty path segments, percent-decoded.
fn decoded_segments(url: &Url) -> Option<Vec<String>> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .map(|s| percent_decode_str(s).decode_utf8().ok().map(String::from))
        .collect()
}

/// Read and parse a `full_list.json` file.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read, or [`Error::Snapshot`]
/// if it is malformed.
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let bytes = fs::read(path).map_err(Error::io(path))?;
    serde_json::from_slice(&bytes).map_err(|source| Error::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `contents` to `path` through a temporary file in the same
/// directory, creating the directory if needed.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| Error::InvalidUri(path.display().to_string()))?;
    fs::create_dir_all(dir).map_err(Error::io(dir))?;

    let mut file = NamedTempFile::new_in(dir).map_err(Error::io(dir))?;
    file.write_all(contents).map_err(Error::io(dir))?;
    file.persist(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
