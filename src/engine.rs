//! Cache engine: orchestration of slabs, index, and LRU.
//!
//! `EngineCore` owns every storage structure and runs single-writer under
//! the facade's lock; its methods take the current time explicitly so tests
//! can drive the clock. `CacheEngine` is the public face: it validates
//! arguments, stamps times and CAS tokens, and copies results out while the
//! lock is held.
//!
//! Allocation walks the reclamation tiers in order: reuse an expired record
//! from the cold end, carve or recycle a chunk, evict the coldest
//! unreferenced record, and as a last resort repair a leaked reference.
//! Only when all four fail does the store report out-of-memory.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::arena::{Handle, MemoryArena};
use crate::assoc::AssociationIndex;
use crate::clock::EngineClock;
use crate::config::EngineConfig;
use crate::error::{CacheError, CacheResult};
use crate::item::{parse_suffix_flags, render_suffix, Item};
use crate::lru::EvictionLru;
use crate::slab::{SlabClassAllocator, SlabClassInfo, CLASS_MIN};
use crate::stats::EngineStats;

/// Longest accepted key.
pub const MAX_KEY_LEN: usize = 250;

/// A copied-out view of one cached entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Opaque client flags stored with the entry.
    pub flags: u32,
    /// CAS token, 0 when CAS is disabled.
    pub cas: u64,
    /// Absolute expiry in engine seconds, 0 = never.
    pub expire_time: u32,
}

impl ItemView {
    fn copy_from(arena: &MemoryArena, item: Item) -> Self {
        Self {
            key: item.key(arena).to_vec(),
            value: item.value(arena).to_vec(),
            flags: parse_suffix_flags(item.suffix(arena)),
            cas: item.cas(arena),
            expire_time: item.expire_time(arena),
        }
    }
}

/// A pinned entry. The pin holds the record's chunk alive across lock
/// drops; it must be given back via [`CacheEngine::release`].
#[derive(Debug)]
#[must_use = "a pinned entry must be released"]
pub struct ItemPin(Handle);

struct EngineCore {
    arena: MemoryArena,
    slabs: SlabClassAllocator,
    assoc: AssociationIndex,
    lru: EvictionLru,
    stats: EngineStats,
    /// Flush point: records last accessed at or before this are dead.
    oldest_live: u32,
    use_cas: bool,
}

impl EngineCore {
    fn new(config: &EngineConfig) -> Self {
        let mut arena = MemoryArena::new(config.memory_limit, config.prealloc);
        let slabs = SlabClassAllocator::new(config);
        let assoc = AssociationIndex::new(config.hash_power, config.hash_bulk_move);
        let lru = EvictionLru::new(&mut arena, slabs.class_count());
        let stats = EngineStats::new(slabs.class_count());
        Self {
            arena,
            slabs,
            assoc,
            lru,
            stats,
            oldest_live: 0,
            use_cas: config.use_cas,
        }
    }

    /// Unlink a record from the index and its LRU list. The chunk is not
    /// freed; the caller decides between free and reuse.
    fn unlink(&mut self, handle: Handle) {
        let item = Item::at(handle);
        debug_assert!(item.is_linked(&self.arena));

        let key = item.key_copy(&self.arena);
        let hv = self.assoc.hash_key(&key);
        let removed = self.assoc.delete(&mut self.arena, &key, hv);
        debug_assert_eq!(removed, handle);

        self.lru.remove(&mut self.arena, handle);
        item.set_linked(&mut self.arena, false);
    }

    /// Unlink and, if nothing pins it, free the chunk. A pinned record's
    /// chunk is freed by the final `release_ref`.
    fn nuke(&mut self, handle: Handle) {
        self.unlink(handle);
        let item = Item::at(handle);
        if item.ref_count(&self.arena) == 0 {
            let class_id = item.class_id(&self.arena);
            self.slabs.free(&mut self.arena, class_id, handle);
        }
    }

    /// Unlink a record and reset it for in-place reuse as a fresh chunk.
    fn steal(&mut self, handle: Handle) {
        self.unlink(handle);
        let item = Item::at(handle);
        item.set_class_id(&mut self.arena, 0);
        item.set_ref_count(&mut self.arena, 0);
    }

    fn release_ref(&mut self, handle: Handle) {
        let item = Item::at(handle);
        let count = item.ref_count(&self.arena);
        debug_assert!(count > 0, "release without a reference");
        item.set_ref_count(&mut self.arena, count - 1);
        if count == 1 && !item.is_linked(&self.arena) {
            let class_id = item.class_id(&self.arena);
            self.slabs.free(&mut self.arena, class_id, handle);
        }
    }

    /// Obtain a chunk and initialize it as a new record. The caller holds
    /// the creator's reference.
    fn allocate_item(
        &mut self,
        key: &[u8],
        user_flags: u32,
        expire_time: u32,
        value_len: usize,
        now: u32,
    ) -> CacheResult<Handle> {
        let suffix = render_suffix(user_flags, value_len);
        let total = Item::total_size_for(key.len(), suffix.len(), value_len, self.use_cas);
        let class_id = self
            .slabs
            .select_class(total)
            .ok_or(CacheError::ItemTooLarge)?;

        let chunk = if let Some(h) =
            self.lru
                .find_expired(&self.arena, class_id, now, self.oldest_live)
        {
            self.steal(h);
            self.stats.class_mut(class_id).reclaimed += 1;
            h
        } else if let Some(h) = self.slabs.allocate(&mut self.arena, class_id) {
            h
        } else if let Some(h) = self.lru.find_evictable(&self.arena, class_id) {
            self.steal(h);
            self.stats.class_mut(class_id).evictions += 1;
            h
        } else if let Some(h) = self.lru.find_leaked(&self.arena, class_id, now) {
            log::warn!("tail repair in class {class_id}: leaked reference reclaimed");
            Item::at(h).set_ref_count(&mut self.arena, 0);
            self.steal(h);
            self.stats.class_mut(class_id).tail_repairs += 1;
            h
        } else {
            self.stats.class_mut(class_id).alloc_failures += 1;
            return Err(CacheError::OutOfMemory);
        };

        let item = Item::at(chunk);
        item.init(
            &mut self.arena,
            class_id,
            key,
            &suffix,
            expire_time,
            value_len,
            self.use_cas,
        );
        Ok(chunk)
    }

    /// Link a freshly initialized record into the index and LRU.
    fn link(&mut self, handle: Handle, now: u32, cas: u64) {
        let item = Item::at(handle);
        let key = item.key_copy(&self.arena);
        let hv = self.assoc.hash_key(&key);

        item.set_linked(&mut self.arena, true);
        item.set_cas(&mut self.arena, cas);
        self.assoc.insert(&mut self.arena, handle, hv);
        let class_id = item.class_id(&self.arena);
        self.lru.insert_head(&mut self.arena, class_id, handle, now);
    }

    /// Find a key, lazily dropping it if a flush or its expiry has passed.
    fn lookup_live(&mut self, key: &[u8], now: u32) -> Handle {
        let hv = self.assoc.hash_key(key);
        let found = self.assoc.find(&self.arena, key, hv);
        if found.is_none() {
            return Handle::NONE;
        }

        let item = Item::at(found);
        if self.oldest_live != 0
            && self.oldest_live <= now
            && item.last_access(&self.arena) <= self.oldest_live
        {
            self.nuke(found);
            self.stats.flush_nuked += 1;
            return Handle::NONE;
        }
        let expire = item.expire_time(&self.arena);
        if expire != 0 && expire <= now {
            self.nuke(found);
            self.stats.expired_nuked += 1;
            return Handle::NONE;
        }
        found
    }

    /// Mark everything stored at or before the flush point dead, and
    /// proactively drop anything newer than it.
    fn flush(&mut self, when: u32, now: u32) {
        self.oldest_live = if when == 0 { now - 1 } else { when };
        self.stats.flushes += 1;
        if self.oldest_live > now {
            // delayed flush: everything stays until the point passes
            return;
        }
        for class_id in CLASS_MIN..=self.slabs.class_max() {
            for handle in self.lru.collect_flushed(&self.arena, class_id, self.oldest_live) {
                self.nuke(handle);
            }
        }
    }

    /// One maintenance step: advance incremental rehashing.
    fn maintain(&mut self) {
        self.assoc.maintain(&mut self.arena);
    }
}

/// Thread-safe cache engine.
///
/// All storage state sits behind one lock; reads copy out while holding it.
/// The clock and CAS counter live outside so time and token generation do
/// not contend with storage.
pub struct CacheEngine {
    core: Mutex<EngineCore>,
    clock: EngineClock,
    next_cas: AtomicU64,
}

impl CacheEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            core: Mutex::new(EngineCore::new(&config)),
            clock: EngineClock::new(),
            next_cas: AtomicU64::new(0),
        }
    }

    /// The engine clock. Tests advance it to cross expiry boundaries.
    pub fn clock(&self) -> &EngineClock {
        &self.clock
    }

    fn check_key(key: &[u8]) -> CacheResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(CacheError::KeyTooLong);
        }
        Ok(())
    }

    #[inline]
    fn expire_at(&self, now: u32, ttl: u32) -> u32 {
        if ttl == 0 {
            0
        } else {
            now.saturating_add(ttl)
        }
    }

    /// Store a value, replacing any existing entry for the key.
    ///
    /// `ttl` is in seconds, 0 = never expires.
    pub fn insert(&self, key: &[u8], value: &[u8], flags: u32, ttl: u32) -> CacheResult<()> {
        Self::check_key(key)?;
        let now = self.clock.now();
        let cas = self.next_cas.fetch_add(1, Ordering::Relaxed) + 1;

        let core = &mut *self.core.lock();
        core.maintain();

        let handle = core.allocate_item(key, flags, self.expire_at(now, ttl), value.len(), now)?;
        Item::at(handle).write_value(&mut core.arena, value);

        // a store displaces the previous entry for the key
        let old = core.lookup_live(key, now);
        if old.is_some() {
            core.nuke(old);
        }

        core.link(handle, now, cas);
        core.stats.stores += 1;
        core.release_ref(handle);
        Ok(())
    }

    /// Store a value only if the key already exists.
    pub fn replace(&self, key: &[u8], value: &[u8], flags: u32, ttl: u32) -> CacheResult<()> {
        Self::check_key(key)?;
        let now = self.clock.now();
        let cas = self.next_cas.fetch_add(1, Ordering::Relaxed) + 1;

        let core = &mut *self.core.lock();
        core.maintain();

        let old = core.lookup_live(key, now);
        if old.is_none() {
            return Err(CacheError::KeyNotFound);
        }
        // pin the old record so allocation cannot steal it out from under us
        Item::at(old).acquire(&mut core.arena);

        let handle =
            match core.allocate_item(key, flags, self.expire_at(now, ttl), value.len(), now) {
                Ok(h) => h,
                Err(e) => {
                    core.release_ref(old);
                    return Err(e);
                }
            };
        Item::at(handle).write_value(&mut core.arena, value);

        core.unlink(old);
        core.release_ref(old);
        core.link(handle, now, cas);
        core.stats.stores += 1;
        core.release_ref(handle);
        Ok(())
    }

    /// Fetch a value. Bumps the entry toward the hot end of its LRU.
    pub fn get(&self, key: &[u8]) -> Option<ItemView> {
        let now = self.clock.now();
        let core = &mut *self.core.lock();

        let found = core.lookup_live(key, now);
        if found.is_none() {
            core.stats.get_misses += 1;
            return None;
        }
        let item = Item::at(found);
        let class_id = item.class_id(&core.arena);
        core.lru.touch(&mut core.arena, class_id, found, now);
        core.stats.get_hits += 1;
        Some(ItemView::copy_from(&core.arena, item))
    }

    /// Pin an entry without touching its LRU position or applying expiry
    /// checks: peek can still see entries `get` would lazily drop. The pin
    /// keeps the chunk from being evicted or recycled until released.
    pub fn peek(&self, key: &[u8]) -> Option<ItemPin> {
        let core = &mut *self.core.lock();

        let hv = core.assoc.hash_key(key);
        let found = core.assoc.find(&core.arena, key, hv);
        if found.is_none() {
            return None;
        }
        Item::at(found).acquire(&mut core.arena);
        Some(ItemPin(found))
    }

    /// Copy out a pinned entry.
    pub fn view(&self, pin: &ItemPin) -> ItemView {
        let core = self.core.lock();
        ItemView::copy_from(&core.arena, Item::at(pin.0))
    }

    /// Give a pin back. The chunk is recycled here if the entry was removed
    /// while pinned.
    pub fn release(&self, pin: ItemPin) {
        let core = &mut *self.core.lock();
        core.release_ref(pin.0);
    }

    /// Remove a key. Returns whether it was present.
    pub fn remove(&self, key: &[u8]) -> bool {
        let now = self.clock.now();
        let core = &mut *self.core.lock();
        core.maintain();

        let found = core.lookup_live(key, now);
        if found.is_none() {
            return false;
        }
        core.nuke(found);
        core.stats.deletes += 1;
        true
    }

    /// Reset a key's expiry without rewriting its value. Returns whether it
    /// was present.
    pub fn touch(&self, key: &[u8], ttl: u32) -> bool {
        let now = self.clock.now();
        let core = &mut *self.core.lock();
        core.maintain();

        let found = core.lookup_live(key, now);
        if found.is_none() {
            return false;
        }
        let item = Item::at(found);
        item.set_expire_time(&mut core.arena, self.expire_at(now, ttl));
        let class_id = item.class_id(&core.arena);
        core.lru.touch(&mut core.arena, class_id, found, now);
        core.stats.touches += 1;
        true
    }

    /// Invalidate every entry, immediately or `delay` seconds from now.
    /// Entries predating the flush point die lazily on their next access.
    pub fn flush_all(&self, delay: u32) {
        let now = self.clock.now();
        let when = if delay == 0 {
            0
        } else {
            now.saturating_add(delay)
        };
        let core = &mut *self.core.lock();
        core.maintain();
        core.flush(when, now);
    }

    /// Live entries in the index.
    pub fn item_count(&self) -> usize {
        self.core.lock().assoc.item_count()
    }

    /// Bytes of storage obtained from the allocator so far.
    pub fn memory_used(&self) -> usize {
        self.core.lock().arena.used()
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> EngineStats {
        self.core.lock().stats.clone()
    }

    /// Snapshot of every slab class.
    pub fn slab_info(&self) -> Vec<SlabClassInfo> {
        self.core.lock().slabs.class_info()
    }

    /// Current hash table power, for observing rehash progress.
    pub fn hash_power(&self) -> u8 {
        self.core.lock().assoc.hash_power()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_engine() -> CacheEngine {
        CacheEngine::new(EngineConfig {
            memory_limit: 2 * 1024 * 1024,
            hash_power: 4,
            ..Default::default()
        })
    }

    #[test]
    fn test_insert_get_roundtrip() {
        let engine = small_engine();
        engine.insert(b"hello", b"world", 7, 0).unwrap();

        let view = engine.get(b"hello").unwrap();
        assert_eq!(view.key, b"hello");
        assert_eq!(view.value, b"world");
        assert_eq!(view.flags, 7);
        assert!(view.cas > 0);
        assert_eq!(view.expire_time, 0);
    }

    #[test]
    fn test_get_missing() {
        let engine = small_engine();
        assert!(engine.get(b"nope").is_none());
        assert_eq!(engine.stats().get_misses, 1);
    }

    #[test]
    fn test_insert_overwrites() {
        let engine = small_engine();
        engine.insert(b"k", b"one", 0, 0).unwrap();
        engine.insert(b"k", b"two", 0, 0).unwrap();
        assert_eq!(engine.get(b"k").unwrap().value, b"two");
        assert_eq!(engine.item_count(), 1);
    }

    #[test]
    fn test_cas_monotonic() {
        let engine = small_engine();
        engine.insert(b"a", b"1", 0, 0).unwrap();
        engine.insert(b"b", b"2", 0, 0).unwrap();
        let a = engine.get(b"a").unwrap().cas;
        let b = engine.get(b"b").unwrap().cas;
        assert!(a > 0);
        assert!(b > a);
    }

    #[test]
    fn test_cas_disabled() {
        let engine = CacheEngine::new(EngineConfig {
            memory_limit: 2 * 1024 * 1024,
            use_cas: false,
            ..Default::default()
        });
        engine.insert(b"k", b"v", 0, 0).unwrap();
        assert_eq!(engine.get(b"k").unwrap().cas, 0);
    }

    #[test]
    fn test_key_validation() {
        let engine = small_engine();
        assert_eq!(engine.insert(b"", b"v", 0, 0), Err(CacheError::KeyTooLong));
        let long = vec![b'x'; MAX_KEY_LEN + 1];
        assert_eq!(engine.insert(&long, b"v", 0, 0), Err(CacheError::KeyTooLong));
        let max = vec![b'x'; MAX_KEY_LEN];
        assert!(engine.insert(&max, b"v", 0, 0).is_ok());
    }

    #[test]
    fn test_item_too_large() {
        let engine = small_engine();
        let value = vec![0u8; 1024 * 1024];
        assert_eq!(
            engine.insert(b"big", &value, 0, 0),
            Err(CacheError::ItemTooLarge)
        );
    }

    #[test]
    fn test_largest_storable_value() {
        let engine = small_engine();
        // just under a page, minus record overhead
        let value = vec![0u8; 1024 * 1024 - 128];
        engine.insert(b"big", &value, 0, 0).unwrap();
        assert_eq!(engine.get(b"big").unwrap().value.len(), value.len());
    }

    #[test]
    fn test_expiry() {
        let engine = small_engine();
        engine.insert(b"short", b"v", 0, 10).unwrap();
        engine.insert(b"forever", b"v", 0, 0).unwrap();

        assert!(engine.get(b"short").is_some());
        engine.clock().advance(11);
        assert!(engine.get(b"short").is_none());
        assert!(engine.get(b"forever").is_some());
        assert_eq!(engine.stats().expired_nuked, 1);
    }

    #[test]
    fn test_peek_ignores_expiry() {
        let engine = small_engine();
        engine.insert(b"k", b"v", 0, 10).unwrap();
        engine.clock().advance(11);

        // get drops the expired entry; a fresh insert then re-peek confirms
        // peek sees entries regardless of TTL
        let pin = engine.peek(b"k").expect("peek should ignore expiry");
        assert_eq!(engine.view(&pin).value, b"v");
        engine.release(pin);

        assert!(engine.get(b"k").is_none());
        assert!(engine.peek(b"k").is_none(), "get already nuked it");
    }

    #[test]
    fn test_touch_extends_expiry() {
        let engine = small_engine();
        engine.insert(b"k", b"v", 0, 10).unwrap();
        assert!(engine.touch(b"k", 1000));
        engine.clock().advance(500);
        assert!(engine.get(b"k").is_some());

        assert!(!engine.touch(b"missing", 10));
    }

    #[test]
    fn test_remove() {
        let engine = small_engine();
        engine.insert(b"k", b"v", 0, 0).unwrap();
        assert!(engine.remove(b"k"));
        assert!(engine.get(b"k").is_none());
        assert!(!engine.remove(b"k"));
        assert_eq!(engine.stats().deletes, 1);
    }

    #[test]
    fn test_replace_semantics() {
        let engine = small_engine();
        assert_eq!(
            engine.replace(b"k", b"v", 0, 0),
            Err(CacheError::KeyNotFound)
        );
        engine.insert(b"k", b"one", 0, 0).unwrap();
        engine.replace(b"k", b"two", 0, 0).unwrap();
        assert_eq!(engine.get(b"k").unwrap().value, b"two");
        assert_eq!(engine.item_count(), 1);
    }

    #[test]
    fn test_flush_all() {
        let engine = small_engine();
        engine.insert(b"a", b"1", 0, 0).unwrap();
        engine.insert(b"b", b"2", 0, 0).unwrap();
        engine.flush_all(0);

        assert!(engine.get(b"a").is_none());
        assert!(engine.get(b"b").is_none());

        // the cache stays usable after a flush
        engine.clock().advance(2);
        engine.insert(b"c", b"3", 0, 0).unwrap();
        assert!(engine.get(b"c").is_some());
    }

    #[test]
    fn test_flush_all_delayed() {
        let engine = small_engine();
        engine.insert(b"a", b"1", 0, 0).unwrap();
        engine.flush_all(100);

        assert!(engine.get(b"a").is_some());
        engine.clock().advance(101);
        assert!(engine.get(b"a").is_none());
    }

    #[test]
    fn test_pin_protects_from_remove() {
        let engine = small_engine();
        engine.insert(b"k", b"v", 0, 0).unwrap();

        let pin = engine.peek(b"k").unwrap();
        assert!(engine.remove(b"k"));
        // the entry is gone from the index but the pinned bytes survive
        assert!(engine.get(b"k").is_none());
        let view = engine.view(&pin);
        assert_eq!(view.value, b"v");
        engine.release(pin);
    }

    #[test]
    fn test_release_recycles_removed_chunk() {
        let engine = small_engine();
        engine.insert(b"k", b"v", 0, 0).unwrap();
        let class_id = engine.slab_info()[0].class_id;

        let pin = engine.peek(b"k").unwrap();
        engine.remove(b"k");
        let before = engine.slab_info()[(class_id - 1) as usize].free_chunks;
        engine.release(pin);
        let after = engine.slab_info()[(class_id - 1) as usize].free_chunks;
        assert_eq!(after, before + 1);
    }
}
