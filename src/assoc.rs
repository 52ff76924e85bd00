//! Association index: hash table from key to item record.
//!
//! Chained buckets over power-of-two tables. When the load factor passes
//! 3/2 the table doubles, but the move is incremental: the old table stays
//! live and buckets migrate a few at a time from `maintain` calls, so no
//! single operation pays for the whole rehash. While both tables exist a
//! bucket is routed by comparing its old-table index against the migration
//! watermark.

use crate::arena::{Handle, MemoryArena};
use crate::hash::hash;
use crate::item::Item;

/// Hash table from key bytes to record handles.
pub struct AssociationIndex {
    /// Current table, size `2^hash_power`.
    primary: Vec<Handle>,
    /// Previous table during expansion, size `2^(hash_power - 1)`.
    old: Option<Vec<Handle>>,
    /// log2 of the primary table size.
    hash_power: u8,
    /// Old-table buckets below this index have been migrated.
    expand_bucket: usize,
    /// Buckets migrated per `maintain` call.
    bulk_move: usize,
    /// Live records in the index.
    item_count: usize,
    /// Seed fed to the hash function.
    seed: u32,
}

#[inline]
fn mask(power: u8) -> u32 {
    (1u32 << power) - 1
}

impl AssociationIndex {
    pub fn new(hash_power: u8, bulk_move: usize) -> Self {
        Self {
            primary: vec![Handle::NONE; 1 << hash_power],
            old: None,
            hash_power,
            expand_bucket: 0,
            bulk_move: bulk_move.max(1),
            item_count: 0,
            seed: 0,
        }
    }

    /// Hash a key with the index seed.
    #[inline]
    pub fn hash_key(&self, key: &[u8]) -> u32 {
        hash(key, self.seed)
    }

    #[inline]
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    #[inline]
    pub fn hash_power(&self) -> u8 {
        self.hash_power
    }

    #[inline]
    pub fn is_expanding(&self) -> bool {
        self.old.is_some()
    }

    /// The bucket slot a hash routes to right now.
    ///
    /// During expansion, an old-table bucket at or past the migration
    /// watermark has not moved yet and is still authoritative.
    #[inline]
    fn bucket_mut(&mut self, hv: u32) -> &mut Handle {
        if let Some(old) = self.old.as_mut() {
            let old_index = (hv & mask(self.hash_power - 1)) as usize;
            if old_index >= self.expand_bucket {
                return &mut old[old_index];
            }
        }
        let index = (hv & mask(self.hash_power)) as usize;
        &mut self.primary[index]
    }

    #[inline]
    fn bucket(&self, hv: u32) -> Handle {
        if let Some(old) = self.old.as_ref() {
            let old_index = (hv & mask(self.hash_power - 1)) as usize;
            if old_index >= self.expand_bucket {
                return old[old_index];
            }
        }
        self.primary[(hv & mask(self.hash_power)) as usize]
    }

    /// Look a key up. Returns `Handle::NONE` when absent.
    pub fn find(&self, arena: &MemoryArena, key: &[u8], hv: u32) -> Handle {
        let mut cursor = self.bucket(hv);
        while cursor.is_some() {
            let item = Item::at(cursor);
            if item.key_equals(arena, key) {
                return cursor;
            }
            cursor = item.hash_next(arena);
        }
        Handle::NONE
    }

    /// Link a record into its chain. The key must not already be present.
    pub fn insert(&mut self, arena: &mut MemoryArena, handle: Handle, hv: u32) {
        debug_assert!(
            self.find(arena, Item::at(handle).key(arena), hv).is_none(),
            "duplicate key insertion"
        );

        let bucket = self.bucket_mut(hv);
        let head = *bucket;
        *bucket = handle;
        Item::at(handle).set_hash_next(arena, head);
        self.item_count += 1;

        if self.old.is_none() && self.item_count > (3usize << self.hash_power) / 2 {
            self.begin_expand();
        }
    }

    /// Unlink a key from its chain. Returns the unlinked handle, or
    /// `Handle::NONE` when the key is absent.
    pub fn delete(&mut self, arena: &mut MemoryArena, key: &[u8], hv: u32) -> Handle {
        let head = self.bucket(hv);
        if head.is_none() {
            return Handle::NONE;
        }

        let head_item = Item::at(head);
        if head_item.key_equals(arena, key) {
            let next = head_item.hash_next(arena);
            *self.bucket_mut(hv) = next;
            head_item.set_hash_next(arena, Handle::NONE);
            self.item_count -= 1;
            return head;
        }

        let mut prev = head_item;
        let mut cursor = head_item.hash_next(arena);
        while cursor.is_some() {
            let item = Item::at(cursor);
            let next = item.hash_next(arena);
            if item.key_equals(arena, key) {
                prev.set_hash_next(arena, next);
                item.set_hash_next(arena, Handle::NONE);
                self.item_count -= 1;
                return cursor;
            }
            prev = item;
            cursor = next;
        }
        Handle::NONE
    }

    /// Start doubling the table. The old table stays authoritative for
    /// unmigrated buckets.
    fn begin_expand(&mut self) {
        debug_assert!(self.old.is_none());
        self.hash_power += 1;
        let fresh = vec![Handle::NONE; 1 << self.hash_power];
        self.old = Some(std::mem::replace(&mut self.primary, fresh));
        self.expand_bucket = 0;
        log::debug!(
            "hash table expansion started, new power {}",
            self.hash_power
        );
    }

    /// Migrate a batch of buckets from the old table. No-op when not
    /// expanding. Call once per mutating engine operation.
    pub fn maintain(&mut self, arena: &mut MemoryArena) {
        if self.old.is_none() {
            return;
        }

        for _ in 0..self.bulk_move {
            let done = {
                let old = self.old.as_mut().unwrap();
                let mut cursor = std::mem::replace(&mut old[self.expand_bucket], Handle::NONE);
                self.expand_bucket += 1;
                let finished = self.expand_bucket >= old.len();

                while cursor.is_some() {
                    let item = Item::at(cursor);
                    let next = item.hash_next(arena);
                    let hv = hash(item.key(arena), self.seed);
                    let index = (hv & mask(self.hash_power)) as usize;
                    item.set_hash_next(arena, self.primary[index]);
                    self.primary[index] = cursor;
                    cursor = next;
                }
                finished
            };

            if done {
                self.old = None;
                log::debug!("hash table expansion complete, power {}", self.hash_power);
                break;
            }
        }
    }
}
