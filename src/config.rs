//! Engine configuration.

/// Default memory budget (64 MiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Default largest item (and slab page) size: 1 MiB.
pub const DEFAULT_MAX_ITEM_SIZE: usize = 1024 * 1024;

/// Default chunk-size growth factor between adjacent slab classes.
pub const DEFAULT_GROWTH_FACTOR: f64 = 1.25;

/// Default smallest chunk payload (key + suffix + value) in bytes.
pub const DEFAULT_MIN_CHUNK_PAYLOAD: usize = 48;

/// Default hash table power (2^16 = 64K buckets).
pub const DEFAULT_HASH_POWER: u8 = 16;

/// Default number of buckets migrated per maintenance step.
pub const DEFAULT_HASH_BULK_MOVE: usize = 1;

/// Engine tunables.
///
/// `Default` gives the stock production configuration; tests shrink
/// `memory_limit` and `hash_power` to force eviction and rehashing early.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Total memory budget for item storage, in bytes. 0 = unbounded.
    pub memory_limit: usize,

    /// Obtain the full budget up front and carve slabs out of it.
    pub prealloc: bool,

    /// Growth factor between adjacent slab-class chunk sizes.
    pub growth_factor: f64,

    /// Smallest chunk payload in bytes; sets the first class size.
    pub min_chunk_payload: usize,

    /// Largest storable record; also the slab page size.
    pub max_item_size: usize,

    /// Reserve a CAS token in every record.
    pub use_cas: bool,

    /// Initial hash table size as a power of two.
    pub hash_power: u8,

    /// Buckets migrated per maintenance step while rehashing.
    pub hash_bulk_move: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            prealloc: false,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            min_chunk_payload: DEFAULT_MIN_CHUNK_PAYLOAD,
            max_item_size: DEFAULT_MAX_ITEM_SIZE,
            use_cas: true,
            hash_power: DEFAULT_HASH_POWER,
            hash_bulk_move: DEFAULT_HASH_BULK_MOVE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.memory_limit, 64 * 1024 * 1024);
        assert_eq!(config.max_item_size, 1024 * 1024);
        assert!(config.use_cas);
        assert_eq!(config.hash_power, 16);
    }
}
