//! # Status Lists
//!
//! Issues and maintains revocation status for credentials, per issuing
//! country and credential type (doctype). Each [`Scope`] owns a token status
//! list and a parallel identifier list, published as signed JWT and CWT
//! artifacts.
//!
//! - [`Registry`] allocates indices, rotating to a fresh [`Generation`] when
//!   a list is exhausted, and records revocations.
//! - [`Store`] persists generations and signs their artifacts.
//! - [`Renewal`] periodically retires expired generations and re-signs the
//!   rest.
//!
//! ```rust,ignore
//! let registry = Arc::new(Registry::<BitstringList, _>::new(&config, keys));
//! let scope = Scope::new("PT", "org.iso.18013.5.1.mDL")?;
//! let info = registry.describe(&scope, expires)?;
//! ```

pub mod allocator;
pub mod bitstring;
pub mod config;
mod error;
pub mod format;
pub mod model;
pub mod registry;
pub mod renewal;
pub mod store;

pub use statuslist_infosec as infosec;

pub use crate::allocator::{Allocator, Take};
pub use crate::bitstring::BitstringList;
pub use crate::config::{Allocation, Config, ListConfig, RenewalConfig};
pub use crate::error::{Error, Result};
pub use crate::format::Formatter;
pub use crate::model::{Generation, IdentifierList, ListKind, Scope, Snapshot, StatusListInfo};
pub use crate::registry::Registry;
pub use crate::renewal::{next_run, PassReport, Renewal};
pub use crate::store::Store;
