//! Memcached-style slab-allocated key-value cache engine.
//!
//! Values live in fixed-size chunks carved out of slab pages, a chained
//! hash table maps keys to records, and per-class LRU lists decide what to
//! reclaim under memory pressure. The table resizes incrementally, so no
//! single operation pays for a full rehash.
//!
//! # Architecture
//!
//! ```text
//! +---------------------------------------------+
//! |               CacheEngine                   |
//! |  validates, stamps time/CAS, copies out     |
//! |                                             |
//! |  +---------------------------------------+  |
//! |  | AssociationIndex                      |  |
//! |  | - key -> record handle                |  |
//! |  | - incremental doubling                |  |
//! |  +---------------------------------------+  |
//! |       |                                     |
//! |       v                                     |
//! |  +---------------------------------------+  |
//! |  | SlabClassAllocator                    |  |
//! |  | +-----------------------------------+ |  |
//! |  | | class 1 (90B chunks)  free list   | |  |
//! |  | | class 2 (112B chunks) free list   | |  |
//! |  | | ...                               | |  |
//! |  | | class N (1MB chunks)              | |  |
//! |  | +-----------------------------------+ |  |
//! |  +---------------------------------------+  |
//! |       |                                     |
//! |       v                                     |
//! |  +---------------------------------------+  |
//! |  | EvictionLru (one list per class)      |  |
//! |  | expired scan / evict / tail repair    |  |
//! |  +---------------------------------------+  |
//! +---------------------------------------------+
//! ```
//!
//! # Example
//!
//! ```
//! use slabkv::{CacheEngine, EngineConfig};
//!
//! let cache = CacheEngine::new(EngineConfig::default());
//!
//! cache.insert(b"key", b"value", 0, 3600).unwrap();
//!
//! if let Some(view) = cache.get(b"key") {
//!     assert_eq!(view.value, b"value");
//! }
//! ```

#![warn(clippy::all)]

mod arena;
mod assoc;
mod clock;
mod config;
mod engine;
mod error;
mod hash;
mod item;
mod lru;
mod slab;
mod stats;

pub use config::EngineConfig;
pub use engine::{CacheEngine, ItemPin, ItemView, MAX_KEY_LEN};
pub use error::{CacheError, CacheResult};
pub use hash::hash;
pub use slab::SlabClassInfo;
pub use stats::{ClassStats, EngineStats};
