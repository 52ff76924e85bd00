//! Operation and reclamation counters.
//!
//! Plain integers mutated under the engine lock; `stats()` hands out a
//! clone. Per-class counters record where reclamation pressure lands.

/// Reclamation counters for one slab class.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClassStats {
    /// Unexpired records evicted from the cold end.
    pub evictions: u64,
    /// Expired or flush-nuked records reclaimed during allocation.
    pub reclaimed: u64,
    /// Leaked references forcibly reclaimed.
    pub tail_repairs: u64,
    /// Allocations that failed after every reclamation tier.
    pub alloc_failures: u64,
}

/// Engine-wide counters.
#[derive(Debug, Default, Clone)]
pub struct EngineStats {
    pub get_hits: u64,
    pub get_misses: u64,
    pub stores: u64,
    pub deletes: u64,
    pub touches: u64,
    pub flushes: u64,
    /// Records dropped lazily on access because they had expired.
    pub expired_nuked: u64,
    /// Records dropped lazily on access because of a flush.
    pub flush_nuked: u64,
    pub classes: Vec<ClassStats>,
}

impl EngineStats {
    pub fn new(class_count: usize) -> Self {
        Self {
            classes: vec![ClassStats::default(); class_count],
            ..Default::default()
        }
    }

    /// Counters for one class, 1-based id.
    #[inline]
    pub fn class_mut(&mut self, class_id: u8) -> &mut ClassStats {
        &mut self.classes[class_id as usize - 1]
    }

    #[inline]
    pub fn class(&self, class_id: u8) -> &ClassStats {
        &self.classes[class_id as usize - 1]
    }
}
