//! # Allocator
//!
//! The allocation engine behind a status list: a fixed-capacity pool of
//! status bits, each handed out at most once.

use serde_json::Value;

use crate::config::ListConfig;

/// Result of asking an [`Allocator`] for a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Take {
    /// A slot that has not been issued before.
    Index(usize),

    /// Every slot has been issued.
    Exhausted,
}

/// A fixed-capacity pool of status bits.
///
/// Implementations must never return the same index twice from [`take`]
/// over the life of a pool, including across [`dump`] and [`load`].
///
/// [`take`]: Allocator::take
/// [`dump`]: Allocator::dump
/// [`load`]: Allocator::load
pub trait Allocator: Send + Sized {
    /// Create an empty pool.
    fn new(config: &ListConfig) -> Self;

    /// Issue the next free slot.
    fn take(&mut self) -> Take;

    /// Set the status bit at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range.
    fn set(&mut self, index: usize, value: bool) -> anyhow::Result<()>;

    /// Read the status bit at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range.
    fn get(&self, index: usize) -> anyhow::Result<bool>;

    /// Number of slots in the pool.
    fn capacity(&self) -> usize;

    /// The status bits, least significant bit first, ZLIB compressed.
    ///
    /// # Errors
    ///
    /// Returns an error if compression fails.
    fn compressed(&self) -> anyhow::Result<Vec<u8>>;

    /// Serialize the complete pool state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be encoded.
    fn dump(&self) -> anyhow::Result<Value>;

    /// Restore a pool from [`Allocator::dump`] output.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not a valid dump.
    fn load(value: &Value) -> anyhow::Result<Self>;
}
