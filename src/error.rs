//! Error types for cache operations.

use std::fmt;

/// Errors that can occur during cache operations.
///
/// Out-of-memory is an expected operating condition: it is surfaced only
/// after every reclamation tier (expired scan, LRU eviction, tail repair)
/// has been exhausted. Invariant violations such as duplicate-key insertion
/// or a free of a still-linked record are caller bugs and are expressed as
/// assertions, not error values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// No chunk could be obtained for the item.
    /// Every reclamation tier was attempted and failed.
    OutOfMemory,

    /// The total record size exceeds the largest slab class.
    /// Rejected before any allocation attempt.
    ItemTooLarge,

    /// The key is too long (max 250 bytes).
    KeyTooLong,

    /// Key not found (for REPLACE semantics).
    KeyNotFound,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::ItemTooLarge => write!(f, "item too large for any slab class"),
            Self::KeyTooLong => write!(f, "key too long (max 250 bytes)"),
            Self::KeyNotFound => write!(f, "key not found"),
        }
    }
}

impl std::error::Error for CacheError {}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
