//! Per-class LRU lists.
//!
//! One doubly linked list per slab class, ordered most to least recently
//! used. Each list is anchored by a pair of sentinel records carved from the
//! arena, so splicing never branches on list ends.
//!
//! The lists only order records; deciding what to do with a candidate
//! (unlink it, free its chunk, reuse it) belongs to the engine. The search
//! methods here walk from the cold end and return a handle, or `None` after
//! a bounded number of tries.

use crate::arena::{Handle, MemoryArena};
use crate::item::Item;
use crate::slab::CLASS_MIN;

/// Touches within this many seconds of the last one do not re-splice.
pub const UPDATE_INTERVAL: u32 = 60;

/// A record unreferenced for this long with a nonzero ref count is
/// considered leaked and eligible for tail repair.
pub const TAIL_REPAIR_TIME: u32 = 3 * 3600;

/// Candidates examined per search before giving up.
pub const RECLAIM_TRIES: usize = 50;

struct LruList {
    /// Sentinel before the most recently used record.
    head: Handle,
    /// Sentinel after the least recently used record.
    tail: Handle,
}

/// The LRU lists for every slab class.
pub struct EvictionLru {
    lists: Vec<LruList>,
}

impl EvictionLru {
    /// Build one empty list per class. Sentinel records are carved from the
    /// arena outside the memory budget.
    pub fn new(arena: &mut MemoryArena, class_count: usize) -> Self {
        let mut lists = Vec::with_capacity(class_count);
        for _ in 0..class_count {
            let head = arena
                .allocate(Item::FIXED_SIZE as usize, true)
                .expect("forced allocation");
            let tail = arena
                .allocate(Item::FIXED_SIZE as usize, true)
                .expect("forced allocation");
            Item::at(head).set_lru_next(arena, tail);
            Item::at(head).set_lru_prev(arena, Handle::NONE);
            Item::at(tail).set_lru_prev(arena, head);
            Item::at(tail).set_lru_next(arena, Handle::NONE);
            lists.push(LruList { head, tail });
        }
        Self { lists }
    }

    #[inline]
    fn list(&self, class_id: u8) -> &LruList {
        &self.lists[(class_id - CLASS_MIN) as usize]
    }

    /// Splice a record in at the hot end and stamp its access time.
    pub fn insert_head(&self, arena: &mut MemoryArena, class_id: u8, handle: Handle, now: u32) {
        let item = Item::at(handle);
        debug_assert!(item.lru_next(arena).is_none(), "record already in a list");

        let head = Item::at(self.list(class_id).head);
        let first = head.lru_next(arena);

        item.set_lru_prev(arena, head.handle());
        item.set_lru_next(arena, first);
        head.set_lru_next(arena, handle);
        Item::at(first).set_lru_prev(arena, handle);
        item.set_last_access(arena, now);
    }

    /// Splice a record out of its list.
    pub fn remove(&self, arena: &mut MemoryArena, handle: Handle) {
        let item = Item::at(handle);
        let next = item.lru_next(arena);
        let prev = item.lru_prev(arena);
        debug_assert!(next.is_some() && prev.is_some(), "record not in a list");

        Item::at(prev).set_lru_next(arena, next);
        Item::at(next).set_lru_prev(arena, prev);
        item.set_lru_next(arena, Handle::NONE);
        item.set_lru_prev(arena, Handle::NONE);
    }

    /// Bump a record to the hot end on access.
    ///
    /// Re-splicing is skipped when the last bump was within the update
    /// interval; the access time is only advanced when the splice happens,
    /// so a hammered key costs two pointer updates a minute.
    pub fn touch(&self, arena: &mut MemoryArena, class_id: u8, handle: Handle, now: u32) {
        let item = Item::at(handle);
        if now.saturating_sub(item.last_access(arena)) < UPDATE_INTERVAL {
            return;
        }
        if item.is_linked(arena) {
            self.remove(arena, handle);
            self.insert_head(arena, class_id, handle, now);
        }
    }

    /// Whether a class list holds no records.
    pub fn is_empty(&self, arena: &MemoryArena, class_id: u8) -> bool {
        let list = self.list(class_id);
        Item::at(list.head).lru_next(arena) == list.tail
    }

    /// The least recently used record, if any.
    pub fn tail(&self, arena: &MemoryArena, class_id: u8) -> Handle {
        let list = self.list(class_id);
        let last = Item::at(list.tail).lru_prev(arena);
        if last == list.head {
            Handle::NONE
        } else {
            last
        }
    }

    /// Walk from the cold end looking for an unreferenced record that is
    /// expired or was nuked by a flush.
    pub fn find_expired(
        &self,
        arena: &MemoryArena,
        class_id: u8,
        now: u32,
        oldest_live: u32,
    ) -> Option<Handle> {
        self.search(arena, class_id, |item| {
            if item.ref_count(arena) != 0 {
                return false;
            }
            let flushed = oldest_live != 0
                && oldest_live <= now
                && item.last_access(arena) <= oldest_live;
            let expired = {
                let exp = item.expire_time(arena);
                exp != 0 && exp < now
            };
            flushed || expired
        })
    }

    /// Walk from the cold end looking for any unreferenced record to evict.
    pub fn find_evictable(&self, arena: &MemoryArena, class_id: u8) -> Option<Handle> {
        self.search(arena, class_id, |item| item.ref_count(arena) == 0)
    }

    /// Walk from the cold end looking for a record whose reference was
    /// leaked: still pinned, but untouched for the repair window.
    pub fn find_leaked(&self, arena: &MemoryArena, class_id: u8, now: u32) -> Option<Handle> {
        self.search(arena, class_id, |item| {
            if item.ref_count(arena) == 0 {
                return false;
            }
            let last = item.last_access(arena);
            last != 0 && last.wrapping_add(TAIL_REPAIR_TIME) < now
        })
    }

    /// Records made stale by a flush: everything at the hot end whose access
    /// time is at or past the flush point. The list is access-ordered, so
    /// the walk stops at the first older record.
    pub fn collect_flushed(
        &self,
        arena: &MemoryArena,
        class_id: u8,
        oldest_live: u32,
    ) -> Vec<Handle> {
        let list = self.list(class_id);
        let mut flushed = Vec::new();
        let mut cursor = Item::at(list.head).lru_next(arena);
        while cursor != list.tail {
            let item = Item::at(cursor);
            if item.last_access(arena) < oldest_live {
                break;
            }
            flushed.push(cursor);
            cursor = item.lru_next(arena);
        }
        flushed
    }

    fn search<F>(&self, arena: &MemoryArena, class_id: u8, accept: F) -> Option<Handle>
    where
        F: Fn(Item) -> bool,
    {
        let list = self.list(class_id);
        let mut cursor = Item::at(list.tail).lru_prev(arena);
        let mut tries = RECLAIM_TRIES;
        while cursor != list.head && tries > 0 {
            let item = Item::at(cursor);
            if accept(item) {
                return Some(cursor);
            }
            cursor = item.lru_prev(arena);
            tries -= 1;
        }
        None
    }
}
