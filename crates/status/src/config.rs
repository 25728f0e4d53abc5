//! # Configuration
//!
//! Service configuration, loaded from a JSON file by the server binary or
//! built directly in code.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use statuslist_infosec::CountryKeys;
use url::Url;

use crate::error::{Error, Result};

/// Default number of slots in a new status list.
pub const DEFAULT_CAPACITY: usize = 131_072;

/// Default time-to-live, in seconds, published in status list tokens.
pub const DEFAULT_TTL: u64 = 3600;

/// Service configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Base URL lists are published under. Its path always ends with `/`
    /// once validated.
    pub service_url: Url,

    /// Root of the published generation tree.
    pub status_list_dir: PathBuf,

    /// Root that renewal passes copy artifacts into before re-signing.
    pub backup_dir: PathBuf,

    /// Issuer (`iss`) claim. Defaults to the service URL without its
    /// trailing slash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Shape of new status lists.
    #[serde(default)]
    pub list: ListConfig,

    /// Time-to-live, in seconds, for published status list tokens.
    #[serde(default = "default_ttl")]
    pub ttl: u64,

    /// Renewal schedule.
    #[serde(default)]
    pub renewal: RenewalConfig,

    /// Signing key files, by country code.
    #[serde(default)]
    pub countries: HashMap<String, CountryKeys>,
}

const fn default_ttl() -> u64 {
    DEFAULT_TTL
}

impl Config {
    /// Create a configuration with default list, ttl and renewal settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `service_url` is not an absolute URL
    /// that can carry a path.
    pub fn new(
        service_url: &str, status_list_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let service_url = Url::parse(service_url)
            .map_err(|e| Error::Config(format!("issue parsing service_url: {e}")))?;
        let mut config = Self {
            service_url,
            status_list_dir: status_list_dir.into(),
            backup_dir: backup_dir.into(),
            issuer: None,
            list: ListConfig::default(),
            ttl: DEFAULT_TTL,
            renewal: RenewalConfig::default(),
            countries: HashMap::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(Error::io(path))?;
        let mut config: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check required values and normalise the service URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the service URL cannot carry a path
    /// or the renewal schedule has no times.
    pub fn validate(&mut self) -> Result<()> {
        if self.service_url.cannot_be_a_base() {
            return Err(Error::Config(format!("{} cannot be a base url", self.service_url)));
        }
        if !self.service_url.path().ends_with('/') {
            let path = format!("{}/", self.service_url.path());
            self.service_url.set_path(&path);
        }
        if self.renewal.at.is_empty() {
            return Err(Error::Config("renewal.at must list at least one time".into()));
        }
        Ok(())
    }

    /// The issuer claim for published artifacts.
    #[must_use]
    pub fn issuer(&self) -> String {
        self.issuer
            .clone()
            .unwrap_or_else(|| self.service_url.as_str().trim_end_matches('/').to_string())
    }
}

/// Configuration for new status lists.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListConfig {
    /// Number of slots in each list.
    pub capacity: usize,

    /// How free slots are chosen.
    pub allocation: Allocation,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            allocation: Allocation::default(),
        }
    }
}

/// Slot selection strategy.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Allocation {
    /// Pseudo-random slots, so neighbouring credentials do not share
    /// neighbouring indices.
    #[default]
    Random,

    /// Slots in order, starting at 0.
    Sequential,
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => write!(f, "random"),
            Self::Sequential => write!(f, "sequential"),
        }
    }
}

/// Renewal schedule.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RenewalConfig {
    /// Local wall-clock times at which a pass runs.
    pub at: Vec<NaiveTime>,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            at: vec![NaiveTime::MIN],
        }
    }
}
