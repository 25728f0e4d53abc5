//! # Test Utilities for Status Lists
//!
//! Generated signing keys, temporary storage roots and tracing setup for
//! tests.
//!
//! This crate provides common utilities for the status list crates and is
//! not intended to be used directly.

pub mod keystore;

use std::path::{Path, PathBuf};
use std::sync::Once;

use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

// initalise tracing once for all tests
static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// # Panics
///
/// Panics if the tracing subscriber cannot be set.
pub fn init_tracer() {
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::ERROR).finish();
        tracing::subscriber::set_global_default(subscriber).expect("subscriber set");
    });
}

/// Temporary list and backup roots, removed on drop.
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    /// Create an empty temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("should create temp dir"),
        }
    }

    /// Root of the published list tree.
    #[must_use]
    pub fn lists(&self) -> PathBuf {
        self.dir.path().join("lists")
    }

    /// Root of renewal backups.
    #[must_use]
    pub fn backups(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    /// The temporary directory itself.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
